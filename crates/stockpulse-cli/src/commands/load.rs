use std::time::Duration;

use stockpulse_core::{DailyJob, LoaderConfig, Warehouse};

use crate::cli::LoadArgs;
use crate::error::CliError;

use super::{yahoo_source, CommandResult};

pub async fn run(args: &LoadArgs, warehouse: Warehouse) -> Result<CommandResult, CliError> {
    let config = config_for(args)?;
    let job = DailyJob::new(warehouse, yahoo_source(&config)?, config);

    let report = job.run(args.date).await?;

    let mut result = CommandResult::ok(&report)?;
    if !report.failed_tickers.is_empty() {
        result = result.with_warning(format!(
            "{} ticker(s) failed: {}",
            report.failed_tickers.len(),
            report.failed_tickers.join(",")
        ));
    }
    if report.tickers > 0 && report.succeeded == 0 {
        result.nothing_loaded = Some(report.tickers);
    }
    Ok(result)
}

/// Environment defaults with command-line flags on top.
fn config_for(args: &LoadArgs) -> Result<LoaderConfig, CliError> {
    let mut config = LoaderConfig::from_env()?;
    if let Some(threshold) = args.threshold {
        config.threshold = threshold;
    }
    if let Some(delay_ms) = args.delay_ms {
        config.batch_delay = Duration::from_millis(delay_ms);
    }
    if args.skip_detect {
        config.detect = false;
    }
    Ok(config)
}
