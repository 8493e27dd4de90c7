//! Typed read access over the canned warehouse queries.

use stockpulse_warehouse::{
    DailyMoverRecord, DailyPriceRecord, MovementRow, TickerRecord, VolatilityRow, Warehouse,
    WeeklyMoverRecord,
};
use time::Date;

use crate::domain::{format_date, parse_date};
use crate::movers::validate_threshold;
use crate::{days_before, PipelineError, Symbol, ValidationError};

pub const DEFAULT_LIMIT: usize = 10;

/// Read-only query surface. Dates default to the latest stored session.
#[derive(Clone)]
pub struct QueryTool {
    warehouse: Warehouse,
}

impl QueryTool {
    pub fn new(warehouse: Warehouse) -> Self {
        Self { warehouse }
    }

    pub fn latest_date(&self) -> Result<Option<Date>, PipelineError> {
        match self.warehouse.latest_price_date()? {
            Some(raw) => Ok(Some(parse_date(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn top_gainers(
        &self,
        date: Option<Date>,
        limit: usize,
    ) -> Result<Vec<DailyMoverRecord>, PipelineError> {
        let Some(date) = self.resolve(date)? else {
            return Ok(Vec::new());
        };
        Ok(self.warehouse.top_gainers(&format_date(date), limit)?)
    }

    /// Most negative first.
    pub fn top_losers(
        &self,
        date: Option<Date>,
        limit: usize,
    ) -> Result<Vec<DailyMoverRecord>, PipelineError> {
        let Some(date) = self.resolve(date)? else {
            return Ok(Vec::new());
        };
        Ok(self.warehouse.top_losers(&format_date(date), limit)?)
    }

    pub fn daily_movers(
        &self,
        min_percent: f64,
        start: Option<Date>,
        end: Option<Date>,
    ) -> Result<Vec<DailyMoverRecord>, PipelineError> {
        let min_percent = validate_threshold(min_percent)?;
        let (start, end) = bounds(start, end)?;
        Ok(self
            .warehouse
            .daily_movers_between(min_percent, start.as_deref(), end.as_deref())?)
    }

    pub fn weekly_movers(
        &self,
        min_percent: f64,
        start: Option<Date>,
        end: Option<Date>,
    ) -> Result<Vec<WeeklyMoverRecord>, PipelineError> {
        let min_percent = validate_threshold(min_percent)?;
        let (start, end) = bounds(start, end)?;
        Ok(self
            .warehouse
            .weekly_movers_between(min_percent, start.as_deref(), end.as_deref())?)
    }

    /// Oldest session first.
    pub fn price_history(
        &self,
        symbol: &Symbol,
        start: Option<Date>,
        end: Option<Date>,
    ) -> Result<Vec<DailyPriceRecord>, PipelineError> {
        let (start, end) = bounds(start, end)?;
        Ok(self
            .warehouse
            .price_history(symbol.as_str(), start.as_deref(), end.as_deref())?)
    }

    /// Two-date movement computed by the store's `get_stocks_by_movement`.
    pub fn stocks_by_movement(
        &self,
        start: Date,
        end: Date,
        min_percent: f64,
    ) -> Result<Vec<MovementRow>, PipelineError> {
        let min_percent = validate_threshold(min_percent)?;
        bounds(Some(start), Some(end))?;
        Ok(self
            .warehouse
            .stocks_by_movement(&format_date(start), &format_date(end), min_percent)?)
    }

    /// Tickers that were daily movers most often over the last `days`
    /// calendar days up to the latest stored session.
    pub fn most_volatile(&self, days: u32, limit: usize) -> Result<Vec<VolatilityRow>, PipelineError> {
        let Some(latest) = self.latest_date()? else {
            return Ok(Vec::new());
        };
        let since = days_before(latest, i64::from(days));
        Ok(self.warehouse.most_volatile(&format_date(since), limit)?)
    }

    pub fn search(
        &self,
        ticker_fragment: Option<&str>,
        name_fragment: Option<&str>,
    ) -> Result<Vec<TickerRecord>, PipelineError> {
        let ticker_fragment = ticker_fragment.map(str::trim).filter(|value| !value.is_empty());
        let name_fragment = name_fragment.map(str::trim).filter(|value| !value.is_empty());
        Ok(self.warehouse.search_tickers(ticker_fragment, name_fragment)?)
    }

    fn resolve(&self, date: Option<Date>) -> Result<Option<Date>, PipelineError> {
        match date {
            Some(date) => Ok(Some(date)),
            None => self.latest_date(),
        }
    }
}

fn bounds(
    start: Option<Date>,
    end: Option<Date>,
) -> Result<(Option<String>, Option<String>), ValidationError> {
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(ValidationError::InvertedDateRange {
                start: format_date(start),
                end: format_date(end),
            });
        }
    }
    Ok((start.map(format_date), end.map(format_date)))
}
