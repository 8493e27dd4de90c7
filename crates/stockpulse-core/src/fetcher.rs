//! Per-ticker price retrieval on top of a [`PriceSource`].

use std::sync::Arc;

use time::Date;
use tracing::{debug, warn};

use crate::domain::format_date;
use crate::pacing::Pacer;
use crate::retry::RetryPolicy;
use crate::source::{DailyBarsRequest, PriceSource, SourceError};
use crate::{days_before, DailyBar, Symbol, TickerProfile};

/// Result of asking the provider for one ticker's bar.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Fetched(DailyBar),
    /// The provider answered but had nothing on or before the target date.
    NoData,
    /// Every attempt failed; carries the last error.
    Failed(SourceError),
}

/// Wraps a provider with pacing, retries and optional market-cap enrichment.
#[derive(Clone)]
pub struct Fetcher {
    source: Arc<dyn PriceSource>,
    retry: RetryPolicy,
    pacer: Pacer,
    lookback_days: u32,
    fetch_market_cap: bool,
}

impl Fetcher {
    pub fn new(source: Arc<dyn PriceSource>) -> Self {
        Self {
            source,
            retry: RetryPolicy::default(),
            pacer: Pacer::disabled(),
            lookback_days: 5,
            fetch_market_cap: false,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_pacer(mut self, pacer: Pacer) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn with_lookback_days(mut self, lookback_days: u32) -> Self {
        self.lookback_days = lookback_days.max(1);
        self
    }

    pub fn with_market_cap(mut self, fetch_market_cap: bool) -> Self {
        self.fetch_market_cap = fetch_market_cap;
        self
    }

    pub fn source_id(&self) -> &'static str {
        self.source.id()
    }

    /// Most recent bar dated on or before `target`.
    pub async fn latest_bar(&self, symbol: &Symbol, target: Date) -> FetchOutcome {
        let mut outcome = self.latest_in_window(symbol, target, self.lookback_days).await;
        if let FetchOutcome::Fetched(bar) = &mut outcome {
            if self.fetch_market_cap && bar.market_cap.is_none() {
                bar.market_cap = self.market_cap(symbol).await;
            }
        }
        outcome
    }

    /// Date of the last completed session, read off a reference symbol.
    ///
    /// Looks back a week from yesterday; falls back to yesterday when the
    /// reference cannot be fetched.
    pub async fn last_market_day(&self, reference: &Symbol, today: Date) -> Date {
        let target = days_before(today, 1);
        match self.latest_in_window(reference, target, 7).await {
            FetchOutcome::Fetched(bar) => bar.date,
            FetchOutcome::NoData => {
                warn!(reference = %reference, "reference symbol returned no data; using yesterday");
                target
            }
            FetchOutcome::Failed(error) => {
                warn!(reference = %reference, %error, "reference symbol fetch failed; using yesterday");
                target
            }
        }
    }

    async fn latest_in_window(&self, symbol: &Symbol, target: Date, days: u32) -> FetchOutcome {
        let request = DailyBarsRequest::trailing(symbol.clone(), target, days);
        let bars = match self.bars_with_retry(request).await {
            Ok(bars) => bars,
            Err(error) => return FetchOutcome::Failed(error),
        };

        match bars
            .into_iter()
            .filter(|bar| bar.date <= target)
            .max_by_key(|bar| bar.date)
        {
            Some(bar) => FetchOutcome::Fetched(bar),
            None => {
                debug!(ticker = %symbol, target = %format_date(target), "no bar in lookback window");
                FetchOutcome::NoData
            }
        }
    }

    async fn bars_with_retry(&self, request: DailyBarsRequest) -> Result<Vec<DailyBar>, SourceError> {
        let mut attempt = 0;
        loop {
            self.pacer.ready().await;
            match self.source.daily_bars(request.clone()).await {
                Ok(bars) => return Ok(bars),
                Err(error) if self.retry.should_retry(attempt, &error) => {
                    warn!(
                        ticker = %request.symbol,
                        attempt = attempt + 1,
                        max_retries = self.retry.max_retries,
                        %error,
                        "fetch failed; retrying"
                    );
                    let delay = self.retry.delay;
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Paced profile lookup, used for market cap and registry enrichment.
    pub async fn profile(&self, symbol: &Symbol) -> Result<Option<TickerProfile>, SourceError> {
        self.pacer.ready().await;
        self.source.profile(symbol).await
    }

    async fn market_cap(&self, symbol: &Symbol) -> Option<f64> {
        match self.profile(symbol).await {
            Ok(profile) => profile.and_then(|profile| profile.market_cap),
            Err(error) => {
                debug!(ticker = %symbol, %error, "market cap lookup failed");
                None
            }
        }
    }
}
