//! Percent-change arithmetic behind mover detection.
//!
//! Nothing in here touches storage; the detector feeds closes in and writes
//! whatever comes back out.

use std::fmt::{Display, Formatter};

use serde::Serialize;
use stockpulse_warehouse::{DailyMoverRecord, WeeklyMoverRecord};
use time::Date;

use crate::domain::format_date;
use crate::{MoverError, ValidationError};

/// Default absolute percent change for a ticker to count as a mover.
pub const DEFAULT_THRESHOLD: f64 = 15.0;

/// Comparison window, in calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    Daily,
    Weekly,
}

impl Window {
    pub const ALL: [Self; 2] = [Self::Daily, Self::Weekly];

    /// Calendar days between the prior close and the latest one.
    pub const fn days(self) -> i64 {
        match self {
            Self::Daily => 1,
            Self::Weekly => 7,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
        }
    }
}

impl Display for Window {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rounds half away from zero to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `(latest - prior) / prior * 100`, rounded to two decimals.
pub fn percent_change(prior: f64, latest: f64) -> Result<f64, MoverError> {
    if !prior.is_finite() || !latest.is_finite() {
        return Err(MoverError::NonFiniteClose { prior, latest });
    }
    if prior <= 0.0 {
        return Err(MoverError::NonPositivePrior(prior));
    }
    Ok(round2((latest - prior) / prior * 100.0))
}

/// The rounded change when its magnitude reaches `threshold`, else `None`.
pub fn evaluate(prior: f64, latest: f64, threshold: f64) -> Result<Option<f64>, MoverError> {
    let change = percent_change(prior, latest)?;
    Ok((change.abs() >= threshold).then_some(change))
}

pub fn validate_threshold(threshold: f64) -> Result<f64, ValidationError> {
    if threshold.is_finite() && threshold >= 0.0 {
        Ok(threshold)
    } else {
        Err(ValidationError::InvalidThreshold { value: threshold })
    }
}

/// A ticker with closes on both ends of a window.
#[derive(Debug, Clone, PartialEq)]
pub struct MoverCandidate {
    pub ticker: String,
    pub prior_close: f64,
    pub latest_close: f64,
    pub volume: i64,
}

impl MoverCandidate {
    pub fn evaluate(&self, threshold: f64) -> Result<Option<f64>, MoverError> {
        evaluate(self.prior_close, self.latest_close, threshold)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyMover {
    pub ticker: String,
    pub date: Date,
    pub previous_close: f64,
    pub current_close: f64,
    pub percent_change: f64,
    pub volume: i64,
}

impl DailyMover {
    pub fn to_record(&self, threshold: f64) -> DailyMoverRecord {
        DailyMoverRecord {
            ticker: self.ticker.clone(),
            date: format_date(self.date),
            previous_close: self.previous_close,
            current_close: self.current_close,
            percent_change: self.percent_change,
            volume: self.volume,
            threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyMover {
    pub ticker: String,
    pub week_start_date: Date,
    pub week_end_date: Date,
    pub week_start_close: f64,
    pub week_end_close: f64,
    pub percent_change: f64,
}

impl WeeklyMover {
    pub fn to_record(&self, threshold: f64) -> WeeklyMoverRecord {
        WeeklyMoverRecord {
            ticker: self.ticker.clone(),
            week_start_date: format_date(self.week_start_date),
            week_end_date: format_date(self.week_end_date),
            week_start_close: self.week_start_close,
            week_end_close: self.week_end_close,
            percent_change: self.percent_change,
            threshold,
        }
    }
}
