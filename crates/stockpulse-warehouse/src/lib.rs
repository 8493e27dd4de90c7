//! # stockpulse warehouse
//!
//! DuckDB-backed store for the ticker registry, daily price history and the
//! two derived mover tables. Every write is an upsert keyed on the table's
//! natural key, so reloading a day or re-running detection is idempotent.
//!
//! ```rust,no_run
//! use stockpulse_warehouse::{Warehouse, WarehouseConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let warehouse = Warehouse::open(WarehouseConfig::default())?;
//!     for row in warehouse.top_gainers("2024-03-15", 20)? {
//!         println!("{} {:+.2}%", row.ticker, row.percent_change);
//!     }
//!     Ok(())
//! }
//! ```

pub mod migrations;
pub mod models;
pub mod pool;
mod queries;

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::{params, Connection, ToSql};
use thiserror::Error;
use tracing::{debug, info};

pub use models::{
    CloseRow, DailyMoverRecord, DailyPriceRecord, DeleteSummary, LoadLogEntry, MovementRow,
    TickerRecord, TickerSeed, VolatilityRow, WeeklyMoverRecord, UNKNOWN_SECTOR,
};
pub use pool::{AccessMode, ConnectionPool, PooledConnection};

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error while preparing the database directory.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Arguments the store refuses to run with.
    #[error("query rejected: {0}")]
    QueryRejected(String),

    #[error("ticker '{0}' is not registered")]
    NotFound(String),
}

/// Where the database lives.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Root directory for stockpulse data.
    pub home: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Idle connections kept per access mode.
    pub max_pool_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        let home = resolve_stockpulse_home();
        let db_path = match env::var_os("STOCKPULSE_DB") {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => home.join("stockpulse.duckdb"),
        };
        Self {
            home,
            db_path,
            max_pool_size: 4,
        }
    }
}

impl WarehouseConfig {
    /// Config for an explicit database file, e.g. from `--db`.
    pub fn at(db_path: impl Into<PathBuf>) -> Self {
        let db_path = db_path.into();
        let home = db_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            home,
            db_path,
            max_pool_size: 4,
        }
    }
}

#[derive(Clone)]
pub struct Warehouse {
    pool: ConnectionPool,
}

impl Warehouse {
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let pool = ConnectionPool::open(config.db_path.clone(), config.max_pool_size)?;
        let warehouse = Self { pool };
        warehouse.initialize()?;
        debug!(db_path = %config.db_path.display(), "warehouse opened");
        Ok(warehouse)
    }

    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.pool.acquire(AccessMode::ReadWrite)?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        self.pool.db_path()
    }

    /// Registers new tickers and refreshes name and sector of known ones.
    ///
    /// A seed without a name or sector leaves the stored value alone; a new
    /// ticker falls back to its symbol and [`UNKNOWN_SECTOR`]. The active flag
    /// of an existing ticker is never touched, so re-seeding does not
    /// resurrect deactivated symbols. Returns the number of inserted rows.
    pub fn upsert_tickers(&self, rows: &[TickerSeed]) -> Result<usize, WarehouseError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let connection = self.pool.acquire(AccessMode::ReadWrite)?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<usize, WarehouseError> {
            let mut inserted = 0;
            for row in rows {
                let params: [&dyn ToSql; 3] = [&row.name, &row.sector, &row.ticker];
                let updated = connection.execute(
                    "UPDATE tickers SET \
                         name = COALESCE(CAST(? AS VARCHAR), name), \
                         sector = COALESCE(CAST(? AS VARCHAR), sector), \
                         updated_at = now() \
                     WHERE ticker = ?",
                    params.as_slice(),
                )?;
                if updated == 0 {
                    let name = row.name.as_deref().unwrap_or(&row.ticker);
                    let sector = row.sector.as_deref().unwrap_or(UNKNOWN_SECTOR);
                    let params: [&dyn ToSql; 3] = [&row.ticker, &name, &sector];
                    connection.execute(
                        "INSERT INTO tickers (ticker, name, sector, active) VALUES (?, ?, ?, TRUE)",
                        params.as_slice(),
                    )?;
                    inserted += 1;
                }
            }
            Ok(inserted)
        })();

        finalize_transaction(&connection, result)
    }

    /// Toggles whether a ticker takes part in future fetch batches.
    pub fn set_active(&self, ticker: &str, active: bool) -> Result<(), WarehouseError> {
        let connection = self.pool.acquire(AccessMode::ReadWrite)?;
        let updated = connection.execute(
            "UPDATE tickers SET active = ?, updated_at = now() WHERE ticker = ?",
            params![active, ticker],
        )?;
        if updated == 0 {
            return Err(WarehouseError::NotFound(ticker.to_string()));
        }
        info!(ticker, active, "ticker active flag updated");
        Ok(())
    }

    /// Removes a ticker together with every price and mover row keyed on it.
    ///
    /// `DuckDB` has no `ON DELETE CASCADE`, so dependants are deleted first,
    /// each statement committing on its own. A foreign-key check inside one
    /// transaction would still see the uncommitted child rows.
    pub fn delete_ticker(&self, ticker: &str) -> Result<DeleteSummary, WarehouseError> {
        let connection = self.pool.acquire(AccessMode::ReadWrite)?;
        let known: i64 = connection.query_row(
            "SELECT COUNT(*) FROM tickers WHERE ticker = ?",
            params![ticker],
            |row| row.get(0),
        )?;
        if known == 0 {
            return Err(WarehouseError::NotFound(ticker.to_string()));
        }

        let summary = DeleteSummary {
            weekly_movers: connection
                .execute("DELETE FROM weekly_movers WHERE ticker = ?", params![ticker])?,
            daily_movers: connection
                .execute("DELETE FROM daily_movers WHERE ticker = ?", params![ticker])?,
            prices: connection.execute("DELETE FROM stocks_daily WHERE ticker = ?", params![ticker])?,
        };
        connection.execute("DELETE FROM tickers WHERE ticker = ?", params![ticker])?;
        info!(
            ticker,
            prices = summary.prices,
            daily_movers = summary.daily_movers,
            weekly_movers = summary.weekly_movers,
            "ticker deleted"
        );
        Ok(summary)
    }

    /// Inserts or overwrites the price row for `(ticker, date)`.
    ///
    /// A missing market cap on reload keeps the previously stored one.
    pub fn upsert_daily_price(
        &self,
        row: &DailyPriceRecord,
        source: &str,
    ) -> Result<(), WarehouseError> {
        let connection = self.pool.acquire(AccessMode::ReadWrite)?;
        let params: [&dyn ToSql; 9] = [
            &row.ticker,
            &row.date,
            &row.open_price,
            &row.high_price,
            &row.low_price,
            &row.close_price,
            &row.volume,
            &row.market_cap,
            &source,
        ];
        connection.execute(
            "INSERT INTO stocks_daily \
             (ticker, date, open_price, high_price, low_price, close_price, volume, market_cap, source) \
             VALUES (?, CAST(? AS DATE), ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (ticker, date) DO UPDATE SET \
                 open_price = excluded.open_price, \
                 high_price = excluded.high_price, \
                 low_price = excluded.low_price, \
                 close_price = excluded.close_price, \
                 volume = excluded.volume, \
                 market_cap = COALESCE(excluded.market_cap, stocks_daily.market_cap), \
                 source = excluded.source, \
                 updated_at = now()",
            params.as_slice(),
        )?;
        Ok(())
    }

    /// Makes `rows` the complete set of daily movers for `date`, in one
    /// transaction. Returns how many stale rows were removed.
    ///
    /// On error the previous rows of that date are left as they were.
    pub fn replace_daily_movers(
        &self,
        date: &str,
        rows: &[DailyMoverRecord],
    ) -> Result<usize, WarehouseError> {
        let connection = self.pool.acquire(AccessMode::ReadWrite)?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<usize, WarehouseError> {
            let kept: HashSet<&str> = rows.iter().map(|row| row.ticker.as_str()).collect();
            let cleared = delete_stale(&connection, "daily_movers", "date", date, &kept)?;
            for row in rows {
                if row.date != date {
                    return Err(WarehouseError::QueryRejected(format!(
                        "daily mover for {} is dated {}, expected {date}",
                        row.ticker, row.date
                    )));
                }
                let params: [&dyn ToSql; 7] = [
                    &row.ticker,
                    &row.date,
                    &row.previous_close,
                    &row.current_close,
                    &row.percent_change,
                    &row.volume,
                    &row.threshold,
                ];
                connection.execute(
                    "INSERT INTO daily_movers \
                     (ticker, date, previous_close, current_close, percent_change, volume, threshold) \
                     VALUES (?, CAST(? AS DATE), ?, ?, ?, ?, ?) \
                     ON CONFLICT (ticker, date) DO UPDATE SET \
                         previous_close = excluded.previous_close, \
                         current_close = excluded.current_close, \
                         percent_change = excluded.percent_change, \
                         volume = excluded.volume, \
                         threshold = excluded.threshold",
                    params.as_slice(),
                )?;
            }
            Ok(cleared)
        })();

        let cleared = finalize_transaction(&connection, result)?;
        debug!(date, cleared, written = rows.len(), "daily movers replaced");
        Ok(cleared)
    }

    /// Weekly counterpart of [`Warehouse::replace_daily_movers`], keyed on the
    /// window's end date.
    pub fn replace_weekly_movers(
        &self,
        week_end_date: &str,
        rows: &[WeeklyMoverRecord],
    ) -> Result<usize, WarehouseError> {
        let connection = self.pool.acquire(AccessMode::ReadWrite)?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<usize, WarehouseError> {
            let kept: HashSet<&str> = rows.iter().map(|row| row.ticker.as_str()).collect();
            let cleared =
                delete_stale(&connection, "weekly_movers", "week_end_date", week_end_date, &kept)?;
            for row in rows {
                if row.week_end_date != week_end_date {
                    return Err(WarehouseError::QueryRejected(format!(
                        "weekly mover for {} ends {}, expected {week_end_date}",
                        row.ticker, row.week_end_date
                    )));
                }
                let params: [&dyn ToSql; 7] = [
                    &row.ticker,
                    &row.week_start_date,
                    &row.week_end_date,
                    &row.week_start_close,
                    &row.week_end_close,
                    &row.percent_change,
                    &row.threshold,
                ];
                connection.execute(
                    "INSERT INTO weekly_movers \
                     (ticker, week_start_date, week_end_date, week_start_close, week_end_close, \
                      percent_change, threshold) \
                     VALUES (?, CAST(? AS DATE), CAST(? AS DATE), ?, ?, ?, ?) \
                     ON CONFLICT (ticker, week_end_date) DO UPDATE SET \
                         week_start_date = excluded.week_start_date, \
                         week_start_close = excluded.week_start_close, \
                         week_end_close = excluded.week_end_close, \
                         percent_change = excluded.percent_change, \
                         threshold = excluded.threshold",
                    params.as_slice(),
                )?;
            }
            Ok(cleared)
        })();

        let cleared = finalize_transaction(&connection, result)?;
        debug!(week_end_date, cleared, written = rows.len(), "weekly movers replaced");
        Ok(cleared)
    }

    /// Appends one line to the per-run audit log.
    pub fn record_load(
        &self,
        run_id: &str,
        ticker: &str,
        status: &str,
        detail: Option<&str>,
    ) -> Result<(), WarehouseError> {
        let connection = self.pool.acquire(AccessMode::ReadWrite)?;
        let params: [&dyn ToSql; 4] = [&run_id, &ticker, &status, &detail];
        connection.execute(
            "INSERT INTO load_log (run_id, ticker, status, detail, timestamp) \
             VALUES (?, ?, ?, ?, now())",
            params.as_slice(),
        )?;
        Ok(())
    }
}

fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

/// Deletes the rows of `table` on `date` whose ticker is not in `kept`.
///
/// Rows that will be rewritten are upserted in place rather than deleted and
/// re-inserted under the same key within one transaction.
fn delete_stale(
    connection: &Connection,
    table: &str,
    date_column: &str,
    date: &str,
    kept: &HashSet<&str>,
) -> Result<usize, WarehouseError> {
    let existing: Vec<String> = {
        let mut statement = connection.prepare(&format!(
            "SELECT ticker FROM {table} WHERE {date_column} = CAST(? AS DATE)"
        ))?;
        let rows = statement.query_map(params![date], |row| row.get(0))?;
        rows.collect::<Result<_, _>>()?
    };

    let mut deleted = 0;
    for ticker in existing.iter().filter(|ticker| !kept.contains(ticker.as_str())) {
        deleted += connection.execute(
            &format!("DELETE FROM {table} WHERE ticker = ? AND {date_column} = CAST(? AS DATE)"),
            params![ticker, date],
        )?;
    }
    Ok(deleted)
}

fn resolve_stockpulse_home() -> PathBuf {
    if let Some(path) = env::var_os("STOCKPULSE_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".stockpulse");
    }

    PathBuf::from(".stockpulse")
}


#[cfg(test)]
mod tests {
    use super::test_support::{daily_mover, open_temp, price, ticker};
    use super::*;

    #[test]
    fn reloading_a_day_overwrites_instead_of_duplicating() {
        let (_temp, warehouse) = open_temp();
        warehouse
            .upsert_tickers(&[ticker("AAPL", "Apple Inc.")])
            .expect("seed");

        warehouse
            .upsert_daily_price(&price("AAPL", "2024-03-15", 170.0), "test")
            .expect("first load");
        let mut corrected = price("AAPL", "2024-03-15", 172.5);
        corrected.volume = 5_000;
        warehouse
            .upsert_daily_price(&corrected, "test")
            .expect("second load");

        let history = warehouse
            .price_history("AAPL", None, None)
            .expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].close_price, 172.5);
        assert_eq!(history[0].volume, 5_000);
    }

    #[test]
    fn reload_without_market_cap_keeps_the_stored_value() {
        let (_temp, warehouse) = open_temp();
        warehouse
            .upsert_tickers(&[ticker("MSFT", "Microsoft")])
            .expect("seed");

        let mut first = price("MSFT", "2024-03-15", 400.0);
        first.market_cap = Some(3.0e12);
        warehouse.upsert_daily_price(&first, "test").expect("load");
        warehouse
            .upsert_daily_price(&price("MSFT", "2024-03-15", 401.0), "test")
            .expect("reload");

        let history = warehouse.price_history("MSFT", None, None).expect("history");
        assert_eq!(history[0].market_cap, Some(3.0e12));
        assert_eq!(history[0].close_price, 401.0);
    }

    #[test]
    fn reseeding_keeps_the_active_flag() {
        let (_temp, warehouse) = open_temp();
        let inserted = warehouse
            .upsert_tickers(&[ticker("AAPL", "Apple"), ticker("MSFT", "Microsoft")])
            .expect("seed");
        assert_eq!(inserted, 2);

        warehouse.set_active("AAPL", false).expect("deactivate");
        let inserted = warehouse
            .upsert_tickers(&[ticker("AAPL", "Apple Inc.")])
            .expect("reseed");
        assert_eq!(inserted, 0);

        let all = warehouse.list_tickers(true).expect("list");
        let apple = all.iter().find(|row| row.ticker == "AAPL").expect("apple");
        assert!(!apple.active);
        assert_eq!(apple.name, "Apple Inc.");
    }

    #[test]
    fn set_active_on_unknown_ticker_is_not_found() {
        let (_temp, warehouse) = open_temp();
        let error = warehouse.set_active("NOPE", false).expect_err("unknown");
        assert!(matches!(error, WarehouseError::NotFound(symbol) if symbol == "NOPE"));
    }

    #[test]
    fn price_for_unregistered_ticker_violates_foreign_key() {
        let (_temp, warehouse) = open_temp();
        let error = warehouse
            .upsert_daily_price(&price("GHOST", "2024-03-15", 10.0), "test")
            .expect_err("fk");
        assert!(matches!(error, WarehouseError::DuckDb(_)));
    }

    #[test]
    fn deleting_a_ticker_removes_dependent_rows() {
        let (_temp, warehouse) = open_temp();
        warehouse
            .upsert_tickers(&[ticker("AAPL", "Apple"), ticker("MSFT", "Microsoft")])
            .expect("seed");
        for symbol in ["AAPL", "MSFT"] {
            warehouse
                .upsert_daily_price(&price(symbol, "2024-03-14", 100.0), "test")
                .expect("load");
            warehouse
                .upsert_daily_price(&price(symbol, "2024-03-15", 120.0), "test")
                .expect("load");
        }
        warehouse
            .replace_daily_movers(
                "2024-03-15",
                &[
                    daily_mover("AAPL", "2024-03-15", 20.0),
                    daily_mover("MSFT", "2024-03-15", 20.0),
                ],
            )
            .expect("movers");

        let summary = warehouse.delete_ticker("AAPL").expect("delete");
        assert_eq!(
            summary,
            DeleteSummary {
                prices: 2,
                daily_movers: 1,
                weekly_movers: 0,
            }
        );
        assert!(warehouse.price_history("AAPL", None, None).expect("history").is_empty());
        assert_eq!(warehouse.price_history("MSFT", None, None).expect("history").len(), 2);
        assert_eq!(warehouse.list_tickers(true).expect("list").len(), 1);
    }

    #[test]
    fn load_log_is_kept_per_run() {
        let (_temp, warehouse) = open_temp();
        warehouse
            .record_load("run-1", "AAPL", "stored", None)
            .expect("log");
        warehouse
            .record_load("run-1", "MSFT", "no_data", Some("empty chart"))
            .expect("log");
        warehouse
            .record_load("run-2", "AAPL", "stored", None)
            .expect("log");

        let entries = warehouse.load_log("run-1").expect("entries");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].detail.as_deref(), Some("empty chart"));
    }

    #[test]
    fn replacing_movers_only_touches_the_given_date() {
        let (_temp, warehouse) = open_temp();
        warehouse
            .upsert_tickers(&[ticker("NVDA", "NVIDIA"), ticker("AMD", "AMD")])
            .expect("seed");
        for date in ["2024-03-14", "2024-03-15"] {
            warehouse
                .replace_daily_movers(date, &[daily_mover("NVDA", date, 20.0)])
                .expect("movers");
        }

        let cleared = warehouse
            .replace_daily_movers("2024-03-15", &[daily_mover("AMD", "2024-03-15", -18.0)])
            .expect("replace");

        assert_eq!(cleared, 1);
        let rows = warehouse
            .daily_movers_between(0.0, None, None)
            .expect("movers");
        let keys: Vec<(&str, &str)> = rows
            .iter()
            .map(|row| (row.date.as_str(), row.ticker.as_str()))
            .collect();
        assert_eq!(keys, vec![("2024-03-15", "AMD"), ("2024-03-14", "NVDA")]);
        assert_eq!(warehouse.replace_weekly_movers("2024-03-15", &[]).expect("weekly"), 0);
    }

    #[test]
    fn failed_mover_replacement_keeps_the_previous_rows() {
        let (_temp, warehouse) = open_temp();
        warehouse
            .upsert_tickers(&[ticker("NVDA", "NVIDIA"), ticker("AMD", "AMD")])
            .expect("seed");
        warehouse
            .replace_daily_movers(
                "2024-03-15",
                &[
                    daily_mover("NVDA", "2024-03-15", 20.0),
                    daily_mover("AMD", "2024-03-15", -18.0),
                ],
            )
            .expect("movers");
        let before = warehouse
            .daily_movers_between(0.0, None, None)
            .expect("movers");

        // GHOST is not registered, so its insert fails after the delete ran.
        let error = warehouse
            .replace_daily_movers(
                "2024-03-15",
                &[
                    daily_mover("NVDA", "2024-03-15", 30.0),
                    daily_mover("GHOST", "2024-03-15", 50.0),
                ],
            )
            .expect_err("foreign key");

        assert!(matches!(error, WarehouseError::DuckDb(_)));
        let after = warehouse
            .daily_movers_between(0.0, None, None)
            .expect("movers");
        assert_eq!(after, before);
    }

    #[test]
    fn movers_dated_elsewhere_are_refused() {
        let (_temp, warehouse) = open_temp();
        warehouse.upsert_tickers(&[ticker("NVDA", "NVIDIA")]).expect("seed");

        let error = warehouse
            .replace_daily_movers("2024-03-15", &[daily_mover("NVDA", "2024-03-14", 20.0)])
            .expect_err("wrong date");

        assert!(matches!(error, WarehouseError::QueryRejected(_)));
        assert!(warehouse
            .daily_movers_between(0.0, None, None)
            .expect("movers")
            .is_empty());
    }

    #[test]
    fn reseeding_without_name_or_sector_keeps_the_stored_values() {
        let (_temp, warehouse) = open_temp();
        warehouse
            .upsert_tickers(&[TickerSeed {
                ticker: String::from("AAPL"),
                name: Some(String::from("Apple Inc.")),
                sector: Some(String::from("Information Technology")),
            }])
            .expect("seed");

        let bare = TickerSeed {
            ticker: String::from("AAPL"),
            name: None,
            sector: None,
        };
        let fresh = TickerSeed {
            ticker: String::from("IBM"),
            name: None,
            sector: None,
        };
        let inserted = warehouse.upsert_tickers(&[bare, fresh]).expect("reseed");

        assert_eq!(inserted, 1);
        let rows = warehouse.list_tickers(true).expect("list");
        let summary: Vec<(&str, &str, &str)> = rows
            .iter()
            .map(|row| (row.ticker.as_str(), row.name.as_str(), row.sector.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("AAPL", "Apple Inc.", "Information Technology"),
                ("IBM", "IBM", UNKNOWN_SECTOR),
            ]
        );
    }
}
