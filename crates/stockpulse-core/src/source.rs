//! Contract between the fetcher and an external market-data provider.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use time::Date;

use crate::domain::format_date;
use crate::{DailyBar, Symbol, TickerProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    /// Network failure, timeout or 5xx.
    Unavailable,
    /// The provider asked us to slow down.
    RateLimited,
    InvalidRequest,
    /// The provider answered with something we cannot interpret.
    Internal,
}

/// Structured provider failure. `retryable` marks the transient cases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
}

impl SourceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Unavailable,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Internal,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::Internal => "source.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

/// Daily bars for one symbol over an inclusive date range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyBarsRequest {
    pub symbol: Symbol,
    pub start: Date,
    pub end: Date,
}

impl DailyBarsRequest {
    pub fn new(symbol: Symbol, start: Date, end: Date) -> Result<Self, SourceError> {
        if start > end {
            return Err(SourceError::invalid_request(format!(
                "bars request start {} is after end {}",
                format_date(start),
                format_date(end)
            )));
        }
        Ok(Self { symbol, start, end })
    }

    /// The `days` calendar days up to and including `end`.
    pub fn trailing(symbol: Symbol, end: Date, days: u32) -> Self {
        let span = i64::from(days.max(1)) - 1;
        Self {
            symbol,
            start: crate::days_before(end, span),
            end,
        }
    }
}

/// A provider of daily prices and ticker descriptions.
///
/// An empty bar list means "no data" (holiday, weekend, delisted symbol) and
/// is not an error.
pub trait PriceSource: Send + Sync {
    fn id(&self) -> &'static str;

    fn daily_bars<'a>(
        &'a self,
        req: DailyBarsRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DailyBar>, SourceError>> + Send + 'a>>;

    fn profile<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> Pin<Box<dyn Future<Output = Result<Option<TickerProfile>, SourceError>> + Send + 'a>>;
}
