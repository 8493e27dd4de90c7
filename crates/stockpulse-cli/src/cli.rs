//! CLI argument definitions for stockpulse.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tickers` | Seed and manage the ticker registry |
//! | `load` | Run the daily batch (fetch, load, detect) |
//! | `detect` | Recompute daily and weekly movers from stored prices |
//! | `query` | Read-only canned queries |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--db` | `$STOCKPULSE_DB` or `~/.stockpulse/stockpulse.duckdb` | Database file |
//! | `--format` | `json` | Output format (json, table) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//!
//! # Examples
//!
//! ```bash
//! stockpulse tickers seed sp500.csv
//! stockpulse load --date 2024-03-15
//! stockpulse query gainers --limit 5 --format table
//! stockpulse query movement 2024-01-01 2024-01-31 --min-percent 15
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use stockpulse_core::parse_date;
use time::Date;

/// Daily equity price collector and mover detector.
#[derive(Debug, Parser)]
#[command(
    name = "stockpulse",
    author,
    version,
    about = "Daily equity price collector and mover detector",
    long_about = "stockpulse loads daily OHLCV bars for a registry of tickers into a local \
DuckDB store, flags day-over-day and week-over-week movers, and answers canned queries \
over the results.\n\
\n\
Logs go to stderr (filter with RUST_LOG); results go to stdout."
)]
pub struct Cli {
    /// Path to the DuckDB database file.
    #[arg(long, global = true, env = "STOCKPULSE_DB")]
    pub db: Option<PathBuf>,

    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Aligned columns for terminal display.
    Table,
    /// Single JSON document.
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage the ticker registry.
    Tickers(TickersArgs),

    /// Run the daily batch: registry, fetch, load, detect.
    ///
    /// Without --date the target is the last completed market session.
    ///
    /// # Examples
    ///
    ///   stockpulse load
    ///   stockpulse load --date 2024-03-15 --threshold 10
    Load(LoadArgs),

    /// Recompute daily and weekly movers from stored closes.
    ///
    /// # Examples
    ///
    ///   stockpulse detect
    ///   stockpulse detect --start 2024-03-01 --end 2024-03-15
    Detect(DetectArgs),

    /// Read-only queries over prices and movers.
    Query(QueryArgs),
}

#[derive(Debug, Args)]
pub struct TickersArgs {
    #[command(subcommand)]
    pub command: TickersCommand,
}

#[derive(Debug, Subcommand)]
pub enum TickersCommand {
    /// Upsert registry rows from a CSV seed list.
    Seed {
        /// CSV with a ticker/symbol column and optional name and sector.
        csv: PathBuf,

        /// Fill missing names and sectors from the provider's profile.
        #[arg(long, default_value_t = false)]
        enrich: bool,
    },

    /// List tracked tickers.
    List {
        /// Include deactivated tickers.
        #[arg(long, default_value_t = false)]
        all: bool,
    },

    /// Include a ticker in future batches.
    Activate { symbol: String },

    /// Exclude a ticker from future batches; its history is kept.
    Deactivate { symbol: String },

    /// Delete a ticker with its prices and movers.
    Remove { symbol: String },
}

#[derive(Debug, Args)]
pub struct LoadArgs {
    /// Target session (YYYY-MM-DD).
    #[arg(long, value_parser = date_arg)]
    pub date: Option<Date>,

    /// Mover threshold in percent; overrides STOCKPULSE_THRESHOLD.
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Minimum delay between provider calls; overrides STOCKPULSE_BATCH_DELAY_MS.
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Load prices only.
    #[arg(long, default_value_t = false)]
    pub skip_detect: bool,
}

#[derive(Debug, Args)]
pub struct DetectArgs {
    /// Single date to evaluate; defaults to the latest stored session.
    #[arg(long, value_parser = date_arg, conflicts_with_all = ["start", "end"])]
    pub date: Option<Date>,

    /// First date of a backfill range.
    #[arg(long, value_parser = date_arg, requires = "end")]
    pub start: Option<Date>,

    /// Last date of a backfill range.
    #[arg(long, value_parser = date_arg, requires = "start")]
    pub end: Option<Date>,

    /// Mover threshold in percent; overrides STOCKPULSE_THRESHOLD.
    #[arg(long)]
    pub threshold: Option<f64>,
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    #[command(subcommand)]
    pub command: QueryCommand,
}

#[derive(Debug, Subcommand)]
pub enum QueryCommand {
    /// Biggest daily gains for a session.
    Gainers(RankingArgs),

    /// Biggest daily losses for a session.
    Losers(RankingArgs),

    /// Stored movers whose absolute change is at least --min-percent.
    Movers {
        #[arg(long, default_value_t = 0.0)]
        min_percent: f64,

        #[arg(long, value_parser = date_arg)]
        start: Option<Date>,

        #[arg(long, value_parser = date_arg)]
        end: Option<Date>,

        /// Read the weekly table instead of the daily one.
        #[arg(long, default_value_t = false)]
        weekly: bool,
    },

    /// Stored price rows for one ticker, oldest first.
    History {
        symbol: String,

        #[arg(long, value_parser = date_arg)]
        start: Option<Date>,

        #[arg(long, value_parser = date_arg)]
        end: Option<Date>,
    },

    /// Change between the first and last stored close inside a range.
    ///
    /// # Examples
    ///
    ///   stockpulse query movement 2024-01-01 2024-01-31 --min-percent 15
    Movement {
        #[arg(value_parser = date_arg)]
        start: Date,

        #[arg(value_parser = date_arg)]
        end: Date,

        #[arg(long, default_value_t = 15.0)]
        min_percent: f64,
    },

    /// Tickers with the most daily mover rows over the last --days days.
    Volatile {
        #[arg(long, default_value_t = 30)]
        days: u32,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Case-insensitive registry search by symbol and/or name fragment.
    Search {
        #[arg(long)]
        ticker: Option<String>,

        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct RankingArgs {
    /// Session to rank; defaults to the latest stored session.
    #[arg(long, value_parser = date_arg)]
    pub date: Option<Date>,

    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

fn date_arg(value: &str) -> Result<Date, String> {
    parse_date(value).map_err(|error| error.to_string())
}
