use serde_json::json;
use stockpulse_core::{
    read_seed_list, Fetcher, LoaderConfig, PipelineError, Registry, Symbol, Warehouse,
};

use crate::cli::{TickersArgs, TickersCommand};
use crate::error::CliError;

use super::{yahoo_source, CommandResult};

pub async fn run(args: &TickersArgs, warehouse: Warehouse) -> Result<CommandResult, CliError> {
    let registry = Registry::new(warehouse);

    match &args.command {
        TickersCommand::Seed { csv, enrich } => {
            let report = if *enrich {
                let config = LoaderConfig::from_env()?;
                let fetcher = Fetcher::new(yahoo_source(&config)?);
                let entries = read_seed_list(csv).map_err(PipelineError::from)?;
                registry.seed_enriched(entries, &fetcher).await?
            } else {
                registry.seed_from_csv(csv)?
            };
            CommandResult::ok(report)
        }
        TickersCommand::List { all } => CommandResult::ok(registry.list(*all)?),
        TickersCommand::Activate { symbol } => {
            let symbol = Symbol::parse(symbol)?;
            registry.activate(&symbol)?;
            CommandResult::ok(json!({ "ticker": symbol.as_str(), "active": true }))
        }
        TickersCommand::Deactivate { symbol } => {
            let symbol = Symbol::parse(symbol)?;
            registry.deactivate(&symbol)?;
            CommandResult::ok(json!({ "ticker": symbol.as_str(), "active": false }))
        }
        TickersCommand::Remove { symbol } => {
            let symbol = Symbol::parse(symbol)?;
            let summary = registry.remove(&symbol)?;
            CommandResult::ok(json!({ "ticker": symbol.as_str(), "deleted": summary }))
        }
    }
}
