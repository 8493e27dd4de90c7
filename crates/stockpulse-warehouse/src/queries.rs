//! Read side: lookups for the detector and the canned report queries.
//!
//! Everything here runs on read-only pooled connections and returns rows in a
//! fixed order.

use ::duckdb::{Row, ToSql};

use crate::{
    AccessMode, CloseRow, DailyMoverRecord, DailyPriceRecord, LoadLogEntry, MovementRow,
    TickerRecord, VolatilityRow, Warehouse, WarehouseError, WeeklyMoverRecord,
};

const TICKER_COLUMNS: &str = "ticker, name, sector, active";

const PRICE_COLUMNS: &str = "ticker, CAST(date AS VARCHAR), open_price, high_price, low_price, \
     close_price, volume, market_cap";

const DAILY_MOVER_COLUMNS: &str = "ticker, CAST(date AS VARCHAR), previous_close, current_close, \
     percent_change, volume, threshold";

const WEEKLY_MOVER_COLUMNS: &str = "ticker, CAST(week_start_date AS VARCHAR), \
     CAST(week_end_date AS VARCHAR), week_start_close, week_end_close, percent_change, threshold";

impl Warehouse {
    /// Active tickers in symbol order; the fetch batch walks this list.
    pub fn active_tickers(&self) -> Result<Vec<TickerRecord>, WarehouseError> {
        self.query_rows(
            &format!("SELECT {TICKER_COLUMNS} FROM tickers WHERE active ORDER BY ticker"),
            &[],
            ticker_from_row,
        )
    }

    pub fn list_tickers(&self, include_inactive: bool) -> Result<Vec<TickerRecord>, WarehouseError> {
        if !include_inactive {
            return self.active_tickers();
        }
        self.query_rows(
            &format!("SELECT {TICKER_COLUMNS} FROM tickers ORDER BY ticker"),
            &[],
            ticker_from_row,
        )
    }

    /// Case-insensitive substring search over symbol and company name.
    /// Both filters apply when both are given.
    pub fn search_tickers(
        &self,
        ticker_fragment: Option<&str>,
        name_fragment: Option<&str>,
    ) -> Result<Vec<TickerRecord>, WarehouseError> {
        let ticker_pattern = ticker_fragment.map(|fragment| format!("%{fragment}%"));
        let name_pattern = name_fragment.map(|fragment| format!("%{fragment}%"));

        let mut sql = format!("SELECT {TICKER_COLUMNS} FROM tickers WHERE TRUE");
        let mut params: Vec<&dyn ToSql> = Vec::new();
        if let Some(pattern) = &ticker_pattern {
            sql.push_str(" AND ticker ILIKE ?");
            params.push(pattern);
        }
        if let Some(pattern) = &name_pattern {
            sql.push_str(" AND name ILIKE ?");
            params.push(pattern);
        }
        sql.push_str(" ORDER BY ticker");

        self.query_rows(&sql, &params, ticker_from_row)
    }

    /// Most recent date present in the price history.
    pub fn latest_price_date(&self) -> Result<Option<String>, WarehouseError> {
        let connection = self.pool.acquire(AccessMode::ReadOnly)?;
        let latest: Option<String> = connection.query_row(
            "SELECT CAST(MAX(date) AS VARCHAR) FROM stocks_daily",
            [],
            |row| row.get(0),
        )?;
        Ok(latest)
    }

    /// Every stored close for one calendar date, in symbol order.
    pub fn closes_on(&self, date: &str) -> Result<Vec<CloseRow>, WarehouseError> {
        self.query_rows(
            "SELECT ticker, close_price, volume FROM stocks_daily \
             WHERE date = CAST(? AS DATE) ORDER BY ticker",
            &[&date],
            |row| {
                Ok(CloseRow {
                    ticker: row.get(0)?,
                    close_price: row.get(1)?,
                    volume: row.get(2)?,
                })
            },
        )
    }

    /// Price history for one ticker, oldest first.
    pub fn price_history(
        &self,
        ticker: &str,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Vec<DailyPriceRecord>, WarehouseError> {
        let mut sql = format!("SELECT {PRICE_COLUMNS} FROM stocks_daily WHERE ticker = ?");
        let mut params: Vec<&dyn ToSql> = vec![&ticker];
        push_date_bounds(&mut sql, &mut params, "date", &start, &end);
        sql.push_str(" ORDER BY date ASC");

        self.query_rows(&sql, &params, |row| {
            Ok(DailyPriceRecord {
                ticker: row.get(0)?,
                date: row.get(1)?,
                open_price: row.get(2)?,
                high_price: row.get(3)?,
                low_price: row.get(4)?,
                close_price: row.get(5)?,
                volume: row.get(6)?,
                market_cap: row.get(7)?,
            })
        })
    }

    /// Best daily movers on `date`, largest gain first.
    pub fn top_gainers(&self, date: &str, limit: usize) -> Result<Vec<DailyMoverRecord>, WarehouseError> {
        self.query_rows(
            &format!(
                "SELECT {DAILY_MOVER_COLUMNS} FROM daily_movers \
                 WHERE date = CAST(? AS DATE) AND percent_change >= 0 \
                 ORDER BY percent_change DESC, ticker LIMIT {limit}"
            ),
            &[&date],
            daily_mover_from_row,
        )
    }

    /// Worst daily movers on `date`, largest loss first.
    pub fn top_losers(&self, date: &str, limit: usize) -> Result<Vec<DailyMoverRecord>, WarehouseError> {
        self.query_rows(
            &format!(
                "SELECT {DAILY_MOVER_COLUMNS} FROM daily_movers \
                 WHERE date = CAST(? AS DATE) AND percent_change <= 0 \
                 ORDER BY percent_change ASC, ticker LIMIT {limit}"
            ),
            &[&date],
            daily_mover_from_row,
        )
    }

    /// Daily movers with `|percent_change| >= min_percent`, newest date first.
    pub fn daily_movers_between(
        &self,
        min_percent: f64,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Vec<DailyMoverRecord>, WarehouseError> {
        let min_percent = ensure_percent(min_percent)?;
        let mut sql = format!(
            "SELECT {DAILY_MOVER_COLUMNS} FROM daily_movers WHERE ABS(percent_change) >= ?"
        );
        let mut params: Vec<&dyn ToSql> = vec![&min_percent];
        push_date_bounds(&mut sql, &mut params, "date", &start, &end);
        sql.push_str(" ORDER BY date DESC, percent_change DESC, ticker");

        self.query_rows(&sql, &params, daily_mover_from_row)
    }

    /// Weekly movers ending on or after `start`, newest window first.
    pub fn weekly_movers_between(
        &self,
        min_percent: f64,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Vec<WeeklyMoverRecord>, WarehouseError> {
        let min_percent = ensure_percent(min_percent)?;
        let mut sql = format!(
            "SELECT {WEEKLY_MOVER_COLUMNS} FROM weekly_movers WHERE ABS(percent_change) >= ?"
        );
        let mut params: Vec<&dyn ToSql> = vec![&min_percent];
        push_date_bounds(&mut sql, &mut params, "week_end_date", &start, &end);
        sql.push_str(" ORDER BY week_end_date DESC, percent_change DESC, ticker");

        self.query_rows(&sql, &params, |row| {
            Ok(WeeklyMoverRecord {
                ticker: row.get(0)?,
                week_start_date: row.get(1)?,
                week_end_date: row.get(2)?,
                week_start_close: row.get(3)?,
                week_end_close: row.get(4)?,
                percent_change: row.get(5)?,
                threshold: row.get(6)?,
            })
        })
    }

    /// Two-date movement across all tickers via `get_stocks_by_movement`.
    ///
    /// Table-macro arguments are inlined as literals; both dates are checked
    /// to be plain `YYYY-MM-DD` and the threshold to be finite first.
    pub fn stocks_by_movement(
        &self,
        start: &str,
        end: &str,
        min_percent: f64,
    ) -> Result<Vec<MovementRow>, WarehouseError> {
        ensure_iso_date(start)?;
        ensure_iso_date(end)?;
        let min_percent = ensure_percent(min_percent)?;
        if start > end {
            return Err(WarehouseError::QueryRejected(format!(
                "start date {start} is after end date {end}"
            )));
        }

        let sql = format!(
            "SELECT ticker, name, start_price, end_price, percent_change, days_elapsed \
             FROM get_stocks_by_movement(DATE '{start}', DATE '{end}', {min_percent:?})"
        );
        self.query_rows(&sql, &[], |row| {
            Ok(MovementRow {
                ticker: row.get(0)?,
                name: row.get(1)?,
                start_price: row.get(2)?,
                end_price: row.get(3)?,
                percent_change: row.get(4)?,
                days_elapsed: row.get(5)?,
            })
        })
    }

    /// Tickers with the most daily-mover rows on or after `since`.
    pub fn most_volatile(&self, since: &str, limit: usize) -> Result<Vec<VolatilityRow>, WarehouseError> {
        self.query_rows(
            &format!(
                "SELECT m.ticker, t.name, COUNT(*) AS mover_days \
                 FROM daily_movers m JOIN tickers t ON t.ticker = m.ticker \
                 WHERE m.date >= CAST(? AS DATE) \
                 GROUP BY m.ticker, t.name \
                 ORDER BY mover_days DESC, m.ticker LIMIT {limit}"
            ),
            &[&since],
            |row| {
                Ok(VolatilityRow {
                    ticker: row.get(0)?,
                    name: row.get(1)?,
                    mover_days: row.get(2)?,
                })
            },
        )
    }

    pub fn load_log(&self, run_id: &str) -> Result<Vec<LoadLogEntry>, WarehouseError> {
        self.query_rows(
            "SELECT run_id, ticker, status, detail FROM load_log \
             WHERE run_id = ? ORDER BY timestamp, rowid",
            &[&run_id],
            |row| {
                Ok(LoadLogEntry {
                    run_id: row.get(0)?,
                    ticker: row.get(1)?,
                    status: row.get(2)?,
                    detail: row.get(3)?,
                })
            },
        )
    }

    fn query_rows<T, F>(
        &self,
        sql: &str,
        params: &[&dyn ToSql],
        map: F,
    ) -> Result<Vec<T>, WarehouseError>
    where
        F: FnMut(&Row<'_>) -> Result<T, ::duckdb::Error>,
    {
        let connection = self.pool.acquire(AccessMode::ReadOnly)?;
        let mut statement = connection.prepare(sql)?;
        let rows = statement
            .query_map(params, map)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn ticker_from_row(row: &Row<'_>) -> Result<TickerRecord, ::duckdb::Error> {
    Ok(TickerRecord {
        ticker: row.get(0)?,
        name: row.get(1)?,
        sector: row.get(2)?,
        active: row.get(3)?,
    })
}

fn daily_mover_from_row(row: &Row<'_>) -> Result<DailyMoverRecord, ::duckdb::Error> {
    Ok(DailyMoverRecord {
        ticker: row.get(0)?,
        date: row.get(1)?,
        previous_close: row.get(2)?,
        current_close: row.get(3)?,
        percent_change: row.get(4)?,
        volume: row.get(5)?,
        threshold: row.get(6)?,
    })
}

fn push_date_bounds<'a>(
    sql: &mut String,
    params: &mut Vec<&'a dyn ToSql>,
    column: &str,
    start: &'a Option<&str>,
    end: &'a Option<&str>,
) {
    if let Some(start) = start {
        sql.push_str(&format!(" AND {column} >= CAST(? AS DATE)"));
        params.push(start);
    }
    if let Some(end) = end {
        sql.push_str(&format!(" AND {column} <= CAST(? AS DATE)"));
        params.push(end);
    }
}

fn ensure_percent(value: f64) -> Result<f64, WarehouseError> {
    if !value.is_finite() || value < 0.0 {
        return Err(WarehouseError::QueryRejected(format!(
            "minimum percent must be a finite non-negative number, got {value}"
        )));
    }
    Ok(value)
}

fn ensure_iso_date(value: &str) -> Result<(), WarehouseError> {
    let bytes = value.as_bytes();
    let well_formed = bytes.len() == 10
        && bytes.iter().enumerate().all(|(index, byte)| match index {
            4 | 7 => *byte == b'-',
            _ => byte.is_ascii_digit(),
        });
    if !well_formed {
        return Err(WarehouseError::QueryRejected(format!(
            "expected a YYYY-MM-DD date, got '{value}'"
        )));
    }
    Ok(())
}
