//! The daily batch: registry → fetch → load → detect.

use std::sync::Arc;

use serde::Serialize;
use stockpulse_warehouse::Warehouse;
use time::{Date, OffsetDateTime};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::LoaderConfig;
use crate::detector::{DetectionReport, Detector};
use crate::domain::{date::iso_date, format_date};
use crate::fetcher::{FetchOutcome, Fetcher};
use crate::loader::{status, LoadOutcome, Loader};
use crate::movers::validate_threshold;
use crate::pacing::Pacer;
use crate::registry::Registry;
use crate::retry::RetryPolicy;
use crate::source::PriceSource;
use crate::{PipelineError, Symbol};

/// Per-run tallies. Every active ticker lands in exactly one bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: String,
    #[serde(with = "iso_date")]
    pub target_date: Date,
    pub tickers: usize,
    pub succeeded: usize,
    pub no_data: usize,
    pub failed: usize,
    pub rejected: usize,
    pub failed_tickers: Vec<String>,
    pub detections: Vec<DetectionReport>,
}

impl RunReport {
    fn new(run_id: String, target_date: Date, tickers: usize) -> Self {
        Self {
            run_id,
            target_date,
            tickers,
            succeeded: 0,
            no_data: 0,
            failed: 0,
            rejected: 0,
            failed_tickers: Vec::new(),
            detections: Vec::new(),
        }
    }
}

/// Sequential daily batch over the active registry.
///
/// Provider failures and rejected bars are counted and logged per ticker;
/// only store, config and seed-list errors end the run early.
pub struct DailyJob {
    config: LoaderConfig,
    registry: Registry,
    fetcher: Fetcher,
    loader: Loader,
    detector: Detector,
}

impl DailyJob {
    pub fn new(warehouse: Warehouse, source: Arc<dyn PriceSource>, config: LoaderConfig) -> Self {
        let fetcher = Fetcher::new(source)
            .with_retry(RetryPolicy::immediate(config.max_retries))
            .with_pacer(Pacer::new(config.batch_delay))
            .with_lookback_days(config.lookback_days)
            .with_market_cap(config.fetch_market_cap);
        let loader = Loader::new(warehouse.clone(), fetcher.source_id());

        Self {
            config,
            registry: Registry::new(warehouse.clone()),
            fetcher,
            loader,
            detector: Detector::new(warehouse),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Runs one batch for `target`, or for the last completed session when
    /// no date is given.
    pub async fn run(&self, target: Option<Date>) -> Result<RunReport, PipelineError> {
        let threshold = validate_threshold(self.config.threshold)?;
        if let Some(path) = &self.config.tickers_csv {
            self.registry.seed_from_csv(path)?;
        }

        let target = match target {
            Some(target) => target,
            None => {
                let reference = Symbol::parse(&self.config.reference_symbol)?;
                let today = OffsetDateTime::now_utc().date();
                self.fetcher.last_market_day(&reference, today).await
            }
        };

        let symbols = self.registry.active_symbols()?;
        let run_id = Uuid::new_v4().to_string();
        let mut report = RunReport::new(run_id, target, symbols.len());
        let mut latest_loaded: Option<Date> = None;
        info!(
            run_id = %report.run_id,
            target = %format_date(target),
            tickers = symbols.len(),
            source = self.fetcher.source_id(),
            "daily batch started"
        );

        for (index, symbol) in symbols.iter().enumerate() {
            let ticker = symbol.as_str();
            match self.fetcher.latest_bar(symbol, target).await {
                FetchOutcome::Fetched(bar) => match self.loader.load(&bar)? {
                    LoadOutcome::Stored => {
                        report.succeeded += 1;
                        latest_loaded = latest_loaded.max(Some(bar.date));
                        let detail = format_date(bar.date);
                        self.loader
                            .record(&report.run_id, ticker, status::STORED, Some(&detail))?;
                    }
                    LoadOutcome::Rejected(reason) => {
                        report.rejected += 1;
                        let detail = reason.to_string();
                        self.loader
                            .record(&report.run_id, ticker, status::REJECTED, Some(&detail))?;
                    }
                },
                FetchOutcome::NoData => {
                    report.no_data += 1;
                    self.loader
                        .record(&report.run_id, ticker, status::NO_DATA, None)?;
                }
                FetchOutcome::Failed(source_error) => {
                    warn!(ticker, error = %source_error, "skipping ticker after failed fetch");
                    report.failed += 1;
                    report.failed_tickers.push(ticker.to_string());
                    let detail = source_error.to_string();
                    self.loader
                        .record(&report.run_id, ticker, status::FAILED, Some(&detail))?;
                }
            }

            self.checkpoint(index + 1, symbols.len(), &report).await;
        }

        if report.tickers > 0 && report.succeeded == 0 {
            error!(run_id = %report.run_id, failed = report.failed, "no ticker loaded successfully");
        }

        match latest_loaded {
            Some(as_of) if self.config.detect => {
                report.detections = self.detector.run_all(as_of, threshold)?;
            }
            _ => {}
        }

        info!(
            run_id = %report.run_id,
            succeeded = report.succeeded,
            no_data = report.no_data,
            failed = report.failed,
            rejected = report.rejected,
            "daily batch finished"
        );
        Ok(report)
    }

    async fn checkpoint(&self, processed: usize, total: usize, report: &RunReport) {
        let every = self.config.checkpoint_every;
        if every == 0 || processed % every != 0 || processed == total {
            return;
        }

        info!(
            processed,
            total,
            succeeded = report.succeeded,
            failed = report.failed,
            "checkpoint"
        );
        if !self.config.checkpoint_pause.is_zero() {
            tokio::time::sleep(self.config.checkpoint_pause).await;
        }
    }
}
