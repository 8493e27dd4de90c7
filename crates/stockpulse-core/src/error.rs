use stockpulse_warehouse::WarehouseError;
use thiserror::Error;

/// Validation errors for symbols, dates, prices and thresholds.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter or '^': '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("date must be YYYY-MM-DD: '{value}'")]
    InvalidDate { value: String },
    #[error("date range start {start} is after end {end}")]
    InvertedDateRange { start: String, end: String },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be greater than zero, got {value}")]
    NonPositivePrice { field: &'static str, value: f64 },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },

    #[error("bar high must be >= low")]
    InvalidBarRange,
    #[error("bar open/close must be within high/low range")]
    InvalidBarBounds,

    #[error("threshold must be a finite percentage >= 0, got {value}")]
    InvalidThreshold { value: f64 },
}

/// Reasons a percent change cannot be computed.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum MoverError {
    #[error("prior close {0} is zero or negative")]
    NonPositivePrior(f64),
    #[error("close prices must be finite (prior {prior}, latest {latest})")]
    NonFiniteClose { prior: f64, latest: f64 },
}

/// Bad configuration values supplied through the environment or flags.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{key}='{value}' is invalid: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Problems reading the CSV seed list.
#[derive(Debug, Error)]
pub enum SeedListError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("seed list is not valid CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("seed list has no columns")]
    NoColumns,
}

/// Errors that abort a batch run or a query.
///
/// Provider failures and rejected rows are not in here: they are logged per
/// ticker and counted in the run report.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    SeedList(#[from] SeedListError),
}
