use serde::{Deserialize, Serialize};
use stockpulse_warehouse::DailyPriceRecord;
use time::Date;

use super::date::{format_date, iso_date};
use crate::{Symbol, ValidationError};

/// One trading day of OHLCV data for a ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub symbol: Symbol,
    #[serde(with = "iso_date")]
    pub date: Date,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub market_cap: Option<f64>,
}

impl DailyBar {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: Symbol,
        date: Date,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: u64,
        market_cap: Option<f64>,
    ) -> Result<Self, ValidationError> {
        let bar = Self {
            symbol,
            date,
            open,
            high,
            low,
            close,
            volume,
            market_cap,
        };
        bar.validate()?;
        Ok(bar)
    }

    /// Checks every invariant a stored price row must satisfy.
    ///
    /// Fields are public, so the loader calls this again right before writing.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_price("open", self.open)?;
        validate_price("high", self.high)?;
        validate_price("low", self.low)?;
        validate_price("close", self.close)?;

        if let Some(market_cap) = self.market_cap {
            if !market_cap.is_finite() {
                return Err(ValidationError::NonFiniteValue {
                    field: "market_cap",
                });
            }
            if market_cap < 0.0 {
                return Err(ValidationError::NegativeValue {
                    field: "market_cap",
                });
            }
        }

        if self.high < self.low {
            return Err(ValidationError::InvalidBarRange);
        }
        if self.open < self.low || self.open > self.high || self.close < self.low || self.close > self.high {
            return Err(ValidationError::InvalidBarBounds);
        }

        Ok(())
    }

    pub fn to_record(&self) -> DailyPriceRecord {
        DailyPriceRecord {
            ticker: self.symbol.as_str().to_string(),
            date: format_date(self.date),
            open_price: self.open,
            high_price: self.high,
            low_price: self.low,
            close_price: self.close,
            volume: i64::try_from(self.volume).unwrap_or(i64::MAX),
            market_cap: self.market_cap,
        }
    }
}

fn validate_price(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value <= 0.0 {
        return Err(ValidationError::NonPositivePrice { field, value });
    }
    Ok(())
}

/// Descriptive data the provider knows about a ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerProfile {
    pub symbol: Symbol,
    pub name: Option<String>,
    pub sector: Option<String>,
    pub market_cap: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn aapl() -> Symbol {
        Symbol::parse("AAPL").expect("symbol")
    }

    #[test]
    fn rejects_non_positive_prices() {
        let error = DailyBar::new(aapl(), date!(2024 - 03 - 15), 0.0, 1.0, 0.0, 1.0, 10, None)
            .expect_err("zero open");
        assert!(matches!(
            error,
            ValidationError::NonPositivePrice { field: "open", .. }
        ));
    }

    #[test]
    fn rejects_inverted_range_and_out_of_bounds_close() {
        let inverted = DailyBar::new(aapl(), date!(2024 - 03 - 15), 10.0, 9.0, 11.0, 10.0, 1, None);
        assert_eq!(inverted, Err(ValidationError::InvalidBarRange));

        let outside = DailyBar::new(aapl(), date!(2024 - 03 - 15), 10.0, 11.0, 9.0, 12.0, 1, None);
        assert_eq!(outside, Err(ValidationError::InvalidBarBounds));
    }

    #[test]
    fn record_uses_store_date_format() {
        let bar = DailyBar::new(
            aapl(),
            date!(2024 - 03 - 05),
            170.0,
            172.0,
            169.0,
            171.5,
            1_000,
            Some(2.6e12),
        )
        .expect("valid bar");
        let record = bar.to_record();
        assert_eq!(record.ticker, "AAPL");
        assert_eq!(record.date, "2024-03-05");
        assert_eq!(record.volume, 1_000);
    }
}
