use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::movers::{validate_threshold, DEFAULT_THRESHOLD};
use crate::ConfigError;

pub const ENV_THRESHOLD: &str = "STOCKPULSE_THRESHOLD";
pub const ENV_BATCH_DELAY_MS: &str = "STOCKPULSE_BATCH_DELAY_MS";
pub const ENV_MAX_RETRIES: &str = "STOCKPULSE_MAX_RETRIES";
pub const ENV_TICKERS_CSV: &str = "STOCKPULSE_TICKERS_CSV";
pub const ENV_YAHOO_COOKIE: &str = "YAHOO_COOKIE";

/// Knobs of the daily batch.
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderConfig {
    /// Absolute percent change for a mover.
    pub threshold: f64,
    /// Minimum spacing between provider calls.
    pub batch_delay: Duration,
    pub max_retries: u32,
    /// Log a progress checkpoint every this many tickers (0 disables).
    pub checkpoint_every: usize,
    pub checkpoint_pause: Duration,
    /// Calendar days fetched per ticker so a holiday target still finds the
    /// previous session.
    pub lookback_days: u32,
    /// Symbol whose latest bar decides the target date.
    pub reference_symbol: String,
    pub tickers_csv: Option<PathBuf>,
    pub fetch_market_cap: bool,
    pub detect: bool,
    /// Session cookie for the quote-summary endpoint, when supplied by hand.
    pub yahoo_cookie: Option<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            batch_delay: Duration::from_millis(500),
            max_retries: 2,
            checkpoint_every: 100,
            checkpoint_pause: Duration::from_secs(5),
            lookback_days: 5,
            reference_symbol: String::from("SPY"),
            tickers_csv: None,
            fetch_market_cap: true,
            detect: true,
            yahoo_cookie: None,
        }
    }
}

impl LoaderConfig {
    /// Defaults overridden by `STOCKPULSE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`LoaderConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(raw) = lookup(ENV_THRESHOLD) {
            let threshold: f64 = parse_value(ENV_THRESHOLD, &raw)?;
            config.threshold = validate_threshold(threshold).map_err(|error| {
                ConfigError::InvalidValue {
                    key: ENV_THRESHOLD,
                    value: raw.clone(),
                    reason: error.to_string(),
                }
            })?;
        }
        if let Some(raw) = lookup(ENV_BATCH_DELAY_MS) {
            config.batch_delay = Duration::from_millis(parse_value(ENV_BATCH_DELAY_MS, &raw)?);
        }
        if let Some(raw) = lookup(ENV_MAX_RETRIES) {
            config.max_retries = parse_value(ENV_MAX_RETRIES, &raw)?;
        }
        if let Some(raw) = lookup(ENV_TICKERS_CSV) {
            config.tickers_csv = Some(PathBuf::from(raw.trim()));
        }
        config.yahoo_cookie = lookup(ENV_YAHOO_COOKIE);

        Ok(config)
    }
}

fn parse_value<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|error: T::Err| ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
            reason: error.to_string(),
        })
}
