//! Row types moved in and out of the store.
//!
//! Dates travel as ISO `YYYY-MM-DD` strings; the store casts them on the way
//! in and renders them back with `CAST(.. AS VARCHAR)`.

use serde::Serialize;

/// Sector stored for tickers whose seed did not name one.
pub const UNKNOWN_SECTOR: &str = "Unknown";

/// Registry input: missing fields keep what is already stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerSeed {
    pub ticker: String,
    pub name: Option<String>,
    pub sector: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickerRecord {
    pub ticker: String,
    pub name: String,
    pub sector: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyPriceRecord {
    pub ticker: String,
    pub date: String,
    pub open_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub close_price: f64,
    pub volume: i64,
    pub market_cap: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyMoverRecord {
    pub ticker: String,
    pub date: String,
    pub previous_close: f64,
    pub current_close: f64,
    pub percent_change: f64,
    pub volume: i64,
    /// Threshold in force when the row was computed.
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyMoverRecord {
    pub ticker: String,
    pub week_start_date: String,
    pub week_end_date: String,
    pub week_start_close: f64,
    pub week_end_close: f64,
    pub percent_change: f64,
    pub threshold: f64,
}

/// A single close used by mover detection.
#[derive(Debug, Clone, PartialEq)]
pub struct CloseRow {
    pub ticker: String,
    pub close_price: f64,
    pub volume: i64,
}

/// One row of `get_stocks_by_movement`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovementRow {
    pub ticker: String,
    pub name: String,
    pub start_price: f64,
    pub end_price: f64,
    pub percent_change: f64,
    pub days_elapsed: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolatilityRow {
    pub ticker: String,
    pub name: String,
    pub mover_days: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadLogEntry {
    pub run_id: String,
    pub ticker: String,
    pub status: String,
    pub detail: Option<String>,
}

/// Rows removed by [`crate::Warehouse::delete_ticker`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeleteSummary {
    pub prices: usize,
    pub daily_movers: usize,
    pub weekly_movers: usize,
}
