use std::collections::HashMap;

use serde::Serialize;
use stockpulse_warehouse::Warehouse;
use time::Date;
use tracing::{debug, info, warn};

use crate::domain::{date::iso_date, format_date, parse_date};
use crate::movers::{validate_threshold, DailyMover, MoverCandidate, WeeklyMover, Window};
use crate::{days_before, PipelineError, ValidationError};

/// What one detection pass over one window and date did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionReport {
    pub window: Window,
    #[serde(with = "iso_date")]
    pub as_of: Date,
    pub threshold: f64,
    /// Tickers with a close on both ends of the window.
    pub evaluated: usize,
    pub skipped_missing_prior: usize,
    pub rejected: usize,
    pub movers: usize,
}

/// Derives daily and weekly movers from stored closes.
///
/// A pass replaces the movers of its date and window as a whole, in one
/// transaction, so re-running with the same history and threshold leaves
/// identical rows and a failed pass leaves the previous ones.
#[derive(Clone)]
pub struct Detector {
    warehouse: Warehouse,
}

impl Detector {
    pub fn new(warehouse: Warehouse) -> Self {
        Self { warehouse }
    }

    /// Latest date with any stored close.
    pub fn latest_date(&self) -> Result<Option<Date>, PipelineError> {
        match self.warehouse.latest_price_date()? {
            Some(raw) => Ok(Some(parse_date(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn run(
        &self,
        window: Window,
        as_of: Date,
        threshold: f64,
    ) -> Result<DetectionReport, PipelineError> {
        let threshold = validate_threshold(threshold)?;
        let prior_date = days_before(as_of, window.days());
        let as_of_key = format_date(as_of);

        let prior_closes: HashMap<String, f64> = self
            .warehouse
            .closes_on(&format_date(prior_date))?
            .into_iter()
            .map(|row| (row.ticker, row.close_price))
            .collect();
        let latest = self.warehouse.closes_on(&as_of_key)?;

        let mut report = DetectionReport {
            window,
            as_of,
            threshold,
            evaluated: 0,
            skipped_missing_prior: 0,
            rejected: 0,
            movers: 0,
        };

        let mut daily = Vec::new();
        let mut weekly = Vec::new();
        for row in latest {
            let Some(&prior_close) = prior_closes.get(&row.ticker) else {
                report.skipped_missing_prior += 1;
                continue;
            };
            let candidate = MoverCandidate {
                ticker: row.ticker,
                prior_close,
                latest_close: row.close_price,
                volume: row.volume,
            };
            report.evaluated += 1;

            let percent_change = match candidate.evaluate(threshold) {
                Ok(Some(percent_change)) => percent_change,
                Ok(None) => continue,
                Err(error) => {
                    warn!(ticker = %candidate.ticker, %window, as_of = %as_of_key, %error, "skipping ticker");
                    report.rejected += 1;
                    continue;
                }
            };

            match window {
                Window::Daily => {
                    let mover = DailyMover {
                        ticker: candidate.ticker,
                        date: as_of,
                        previous_close: candidate.prior_close,
                        current_close: candidate.latest_close,
                        percent_change,
                        volume: candidate.volume,
                    };
                    debug!(ticker = %mover.ticker, percent_change, "daily mover");
                    daily.push(mover.to_record(threshold));
                }
                Window::Weekly => {
                    let mover = WeeklyMover {
                        ticker: candidate.ticker,
                        week_start_date: prior_date,
                        week_end_date: as_of,
                        week_start_close: candidate.prior_close,
                        week_end_close: candidate.latest_close,
                        percent_change,
                    };
                    debug!(ticker = %mover.ticker, percent_change, "weekly mover");
                    weekly.push(mover.to_record(threshold));
                }
            }
            report.movers += 1;
        }

        let cleared = match window {
            Window::Daily => self.warehouse.replace_daily_movers(&as_of_key, &daily)?,
            Window::Weekly => self.warehouse.replace_weekly_movers(&as_of_key, &weekly)?,
        };
        if cleared > 0 {
            debug!(%window, as_of = %as_of_key, cleared, "dropped movers below the threshold");
        }

        info!(
            %window,
            as_of = %as_of_key,
            threshold,
            evaluated = report.evaluated,
            skipped_missing_prior = report.skipped_missing_prior,
            rejected = report.rejected,
            movers = report.movers,
            "mover detection finished"
        );
        Ok(report)
    }

    /// Daily then weekly window for `as_of`.
    pub fn run_all(&self, as_of: Date, threshold: f64) -> Result<Vec<DetectionReport>, PipelineError> {
        Window::ALL
            .into_iter()
            .map(|window| self.run(window, as_of, threshold))
            .collect()
    }

    /// Both windows on the latest stored date; empty when nothing is stored.
    pub fn run_latest(&self, threshold: f64) -> Result<Vec<DetectionReport>, PipelineError> {
        match self.latest_date()? {
            Some(as_of) => self.run_all(as_of, threshold),
            None => {
                info!("no stored prices; nothing to detect");
                Ok(Vec::new())
            }
        }
    }

    /// Backfill over every calendar date in `[start, end]`.
    pub fn run_range(
        &self,
        start: Date,
        end: Date,
        threshold: f64,
    ) -> Result<Vec<DetectionReport>, PipelineError> {
        if start > end {
            return Err(ValidationError::InvertedDateRange {
                start: format_date(start),
                end: format_date(end),
            }
            .into());
        }

        let mut reports = Vec::new();
        let mut day = Some(start);
        while let Some(as_of) = day.filter(|day| *day <= end) {
            reports.extend(self.run_all(as_of, threshold)?);
            day = as_of.next_day();
        }
        Ok(reports)
    }
}
