mod detect;
mod load;
mod query;
mod tickers;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use stockpulse_core::{
    LoaderConfig, PriceSource, ReqwestHttpClient, Warehouse, WarehouseConfig, YahooAdapter,
    YahooAuthManager,
};

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub struct CommandResult {
    pub data: Value,
    pub warnings: Vec<String>,
    /// Set when a batch ran over this many tickers and stored none of them.
    pub nothing_loaded: Option<usize>,
}

impl CommandResult {
    pub fn ok(data: impl Serialize) -> Result<Self, CliError> {
        Ok(Self {
            data: serde_json::to_value(data)?,
            warnings: Vec::new(),
            nothing_loaded: None,
        })
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

pub async fn run(cli: &Cli) -> Result<CommandResult, CliError> {
    let warehouse = open_warehouse(cli)?;

    match &cli.command {
        Command::Tickers(args) => tickers::run(args, warehouse).await,
        Command::Load(args) => load::run(args, warehouse).await,
        Command::Detect(args) => detect::run(args, warehouse),
        Command::Query(args) => query::run(args, warehouse),
    }
}

fn open_warehouse(cli: &Cli) -> Result<Warehouse, CliError> {
    let config = match &cli.db {
        Some(path) => WarehouseConfig::at(path),
        None => WarehouseConfig::default(),
    };
    Ok(Warehouse::open(config)?)
}

/// Yahoo over reqwest, with the optional hand-supplied session cookie.
fn yahoo_source(config: &LoaderConfig) -> Result<Arc<dyn PriceSource>, CliError> {
    let http_client = Arc::new(ReqwestHttpClient::new()?);
    let auth = YahooAuthManager::with_cookie(config.yahoo_cookie.clone());
    Ok(Arc::new(YahooAdapter::with_auth(http_client, auth)))
}
