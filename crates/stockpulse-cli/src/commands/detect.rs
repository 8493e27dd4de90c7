use stockpulse_core::{validate_threshold, Detector, LoaderConfig, Warehouse};

use crate::cli::DetectArgs;
use crate::error::CliError;

use super::CommandResult;

pub fn run(args: &DetectArgs, warehouse: Warehouse) -> Result<CommandResult, CliError> {
    let threshold = match args.threshold {
        Some(threshold) => validate_threshold(threshold)?,
        None => LoaderConfig::from_env()?.threshold,
    };
    let detector = Detector::new(warehouse);

    let reports = match (args.date, args.start, args.end) {
        (Some(date), _, _) => detector.run_all(date, threshold)?,
        (None, Some(start), Some(end)) => detector.run_range(start, end, threshold)?,
        _ => detector.run_latest(threshold)?,
    };

    let result = CommandResult::ok(&reports)?;
    if reports.is_empty() {
        return Ok(result.with_warning("no stored prices to evaluate"));
    }
    Ok(result)
}
