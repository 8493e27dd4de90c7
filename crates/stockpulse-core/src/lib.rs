//! Core of stockpulse.
//!
//! This crate contains:
//! - Validated domain types (symbols, daily bars, ticker profiles)
//! - The provider contract (`PriceSource`) and the Yahoo adapter
//! - Fetching with pacing and bounded retries
//! - The ticker registry, daily loader and mover detector
//! - The daily batch job and the typed query tool

pub mod adapters;
pub mod config;
pub mod detector;
pub mod domain;
pub mod error;
pub mod fetcher;
pub mod http_client;
pub mod loader;
pub mod movers;
pub mod pacing;
pub mod pipeline;
pub mod query;
pub mod registry;
pub mod retry;
pub mod source;

pub use adapters::{YahooAdapter, YahooAuthManager};
pub use config::LoaderConfig;
pub use detector::{DetectionReport, Detector};
pub use domain::{days_before, format_date, parse_date, DailyBar, Symbol, TickerProfile};
pub use error::{ConfigError, MoverError, PipelineError, SeedListError, ValidationError};
pub use fetcher::{FetchOutcome, Fetcher};
pub use http_client::{HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};
pub use loader::{LoadOutcome, Loader};
pub use movers::{
    evaluate, percent_change, round2, validate_threshold, DailyMover, MoverCandidate,
    WeeklyMover, Window, DEFAULT_THRESHOLD,
};
pub use pacing::Pacer;
pub use pipeline::{DailyJob, RunReport};
pub use query::QueryTool;
pub use registry::{parse_seed_list, read_seed_list, Registry, SeedEntry, SeedReport};
pub use retry::RetryPolicy;
pub use source::{DailyBarsRequest, PriceSource, SourceError, SourceErrorKind};
pub use stockpulse_warehouse::{
    DailyMoverRecord, DailyPriceRecord, DeleteSummary, LoadLogEntry, MovementRow, TickerRecord, TickerSeed,
    VolatilityRow, Warehouse, WarehouseConfig, WarehouseError, WeeklyMoverRecord,
};
