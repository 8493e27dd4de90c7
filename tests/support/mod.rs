//! Shared fixtures: a scripted in-memory provider and throwaway warehouses.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use stockpulse_core::{
    DailyBar, DailyBarsRequest, DailyPriceRecord, LoaderConfig, PriceSource, SourceError, Symbol,
    TickerProfile, TickerSeed, Warehouse, WarehouseConfig,
};
use tempfile::TempDir;
use time::Date;

/// Provider answering from canned bars, with per-symbol failures queued ahead.
#[derive(Default)]
pub struct ScriptedSource {
    bars: Mutex<HashMap<String, Vec<DailyBar>>>,
    failures: Mutex<HashMap<String, VecDeque<SourceError>>>,
    profiles: Mutex<HashMap<String, TickerProfile>>,
    calls: Mutex<HashMap<String, u32>>,
}

impl ScriptedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_bar(&self, bar: DailyBar) -> &Self {
        self.bars
            .lock()
            .expect("bars")
            .entry(bar.symbol.as_str().to_string())
            .or_default()
            .push(bar);
        self
    }

    pub fn with_close(&self, ticker: &str, date: Date, close: f64) -> &Self {
        self.with_bar(bar(ticker, date, close))
    }

    /// The next `times` calls for `ticker` fail with `error`.
    pub fn failing(&self, ticker: &str, error: SourceError, times: usize) -> &Self {
        let mut failures = self.failures.lock().expect("failures");
        let queue = failures.entry(ticker.to_string()).or_default();
        queue.extend(std::iter::repeat(error).take(times));
        self
    }

    pub fn with_profile(&self, profile: TickerProfile) -> &Self {
        self.profiles
            .lock()
            .expect("profiles")
            .insert(profile.symbol.as_str().to_string(), profile);
        self
    }

    pub fn calls(&self, ticker: &str) -> u32 {
        self.calls
            .lock()
            .expect("calls")
            .get(ticker)
            .copied()
            .unwrap_or(0)
    }
}

impl PriceSource for ScriptedSource {
    fn id(&self) -> &'static str {
        "scripted"
    }

    fn daily_bars<'a>(
        &'a self,
        req: DailyBarsRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DailyBar>, SourceError>> + Send + 'a>> {
        let ticker = req.symbol.as_str().to_string();
        *self
            .calls
            .lock()
            .expect("calls")
            .entry(ticker.clone())
            .or_default() += 1;

        let failure = self
            .failures
            .lock()
            .expect("failures")
            .get_mut(&ticker)
            .and_then(VecDeque::pop_front);
        let reply = match failure {
            Some(error) => Err(error),
            None => {
                let mut bars: Vec<DailyBar> = self
                    .bars
                    .lock()
                    .expect("bars")
                    .get(&ticker)
                    .map(|bars| {
                        bars.iter()
                            .filter(|bar| bar.date >= req.start && bar.date <= req.end)
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                bars.sort_by_key(|bar| bar.date);
                Ok(bars)
            }
        };
        Box::pin(async move { reply })
    }

    fn profile<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> Pin<Box<dyn Future<Output = Result<Option<TickerProfile>, SourceError>> + Send + 'a>> {
        let profile = self
            .profiles
            .lock()
            .expect("profiles")
            .get(symbol.as_str())
            .cloned();
        Box::pin(async move { Ok(profile) })
    }
}

pub fn symbol(ticker: &str) -> Symbol {
    Symbol::parse(ticker).expect("valid symbol")
}

/// Flat bar: open, high, low and close all equal `close`.
pub fn bar(ticker: &str, date: Date, close: f64) -> DailyBar {
    DailyBar::new(symbol(ticker), date, close, close, close, close, 1_000_000, None)
        .expect("valid bar")
}

pub fn open_warehouse() -> (TempDir, Warehouse) {
    let temp = tempfile::tempdir().expect("tempdir");
    let warehouse = Warehouse::open(WarehouseConfig::at(temp.path().join("stockpulse.duckdb")))
        .expect("warehouse open");
    (temp, warehouse)
}

pub fn register(warehouse: &Warehouse, tickers: &[(&str, &str)]) {
    let seeds: Vec<TickerSeed> = tickers
        .iter()
        .map(|(ticker, name)| TickerSeed {
            ticker: ticker.to_string(),
            name: Some(name.to_string()),
            sector: Some(String::from("Technology")),
        })
        .collect();
    warehouse.upsert_tickers(&seeds).expect("register tickers");
}

pub fn store_close(warehouse: &Warehouse, ticker: &str, date: &str, close: f64) {
    warehouse
        .upsert_daily_price(
            &DailyPriceRecord {
                ticker: ticker.to_string(),
                date: date.to_string(),
                open_price: close,
                high_price: close,
                low_price: close,
                close_price: close,
                volume: 1_000_000,
                market_cap: None,
            },
            "fixture",
        )
        .expect("store close");
}

/// Batch config with every wait disabled.
pub fn fast_config() -> LoaderConfig {
    LoaderConfig {
        batch_delay: Duration::ZERO,
        checkpoint_pause: Duration::ZERO,
        fetch_market_cap: false,
        ..LoaderConfig::default()
    }
}
