use ::duckdb::{params, Connection};

struct Migration {
    version: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_registry_and_prices",
        sql: r#"
CREATE TABLE IF NOT EXISTS tickers (
    ticker TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    sector TEXT NOT NULL DEFAULT 'Unknown',
    active BOOLEAN NOT NULL DEFAULT TRUE,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS stocks_daily (
    ticker TEXT NOT NULL REFERENCES tickers(ticker),
    date DATE NOT NULL,
    open_price DOUBLE NOT NULL,
    high_price DOUBLE NOT NULL,
    low_price DOUBLE NOT NULL,
    close_price DOUBLE NOT NULL,
    volume BIGINT NOT NULL,
    market_cap DOUBLE,
    source TEXT,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY(ticker, date)
);
"#,
    },
    Migration {
        version: "0002_movers",
        sql: r#"
CREATE TABLE IF NOT EXISTS daily_movers (
    ticker TEXT NOT NULL REFERENCES tickers(ticker),
    date DATE NOT NULL,
    previous_close DOUBLE NOT NULL,
    current_close DOUBLE NOT NULL,
    percent_change DOUBLE NOT NULL,
    volume BIGINT NOT NULL,
    threshold DOUBLE NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY(ticker, date)
);

CREATE TABLE IF NOT EXISTS weekly_movers (
    ticker TEXT NOT NULL REFERENCES tickers(ticker),
    week_start_date DATE NOT NULL,
    week_end_date DATE NOT NULL,
    week_start_close DOUBLE NOT NULL,
    week_end_close DOUBLE NOT NULL,
    percent_change DOUBLE NOT NULL,
    threshold DOUBLE NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY(ticker, week_end_date)
);
"#,
    },
    Migration {
        version: "0003_load_log",
        sql: r#"
CREATE TABLE IF NOT EXISTS load_log (
    run_id TEXT NOT NULL,
    ticker TEXT NOT NULL,
    status TEXT NOT NULL,
    detail TEXT,
    timestamp TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_stocks_daily_date ON stocks_daily(date);
CREATE INDEX IF NOT EXISTS idx_daily_movers_date ON daily_movers(date);
CREATE INDEX IF NOT EXISTS idx_weekly_movers_end ON weekly_movers(week_end_date);
CREATE INDEX IF NOT EXISTS idx_load_log_run ON load_log(run_id);
"#,
    },
    Migration {
        version: "0004_movement_macro",
        // Window bounds are the first and last stored trading days inside
        // [start_date, end_date]; a single-row window has no movement.
        sql: r#"
CREATE OR REPLACE MACRO get_stocks_by_movement(start_date, end_date, min_percent) AS TABLE
WITH bounds AS (
    SELECT
        ticker,
        arg_min(close_price, date) AS start_price,
        arg_max(close_price, date) AS end_price,
        min(date) AS first_date,
        max(date) AS last_date
    FROM stocks_daily
    WHERE date BETWEEN CAST(start_date AS DATE) AND CAST(end_date AS DATE)
    GROUP BY ticker
),
moves AS (
    SELECT
        b.ticker AS ticker,
        t.name AS name,
        b.start_price AS start_price,
        b.end_price AS end_price,
        ROUND((b.end_price - b.start_price) / b.start_price * 100, 2) AS percent_change,
        date_diff('day', b.first_date, b.last_date) AS days_elapsed
    FROM bounds b
    JOIN tickers t ON t.ticker = b.ticker
    WHERE b.start_price > 0 AND b.first_date < b.last_date
)
SELECT ticker, name, start_price, end_price, percent_change, days_elapsed
FROM moves
WHERE ABS(percent_change) >= CAST(min_percent AS DOUBLE)
ORDER BY ABS(percent_change) DESC, ticker;
"#,
    },
];

pub fn apply_migrations(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    )?;

    for migration in MIGRATIONS {
        let applied_count: i64 = connection.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = ?",
            params![migration.version],
            |row| row.get(0),
        )?;

        if applied_count == 0 {
            tracing::debug!(version = migration.version, "applying migration");
            connection.execute_batch(migration.sql)?;
            connection.execute(
                "INSERT INTO schema_migrations (version) VALUES (?)",
                params![migration.version],
            )?;
        }
    }

    Ok(())
}
