use stockpulse_warehouse::Warehouse;
use tracing::{debug, warn};

use crate::domain::format_date;
use crate::{DailyBar, PipelineError, ValidationError};

/// `load_log.status` values.
pub mod status {
    pub const STORED: &str = "stored";
    pub const REJECTED: &str = "rejected";
    pub const NO_DATA: &str = "no_data";
    pub const FAILED: &str = "failed";
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Stored,
    /// The bar broke a validation rule; nothing was written.
    Rejected(ValidationError),
}

/// Writes validated bars into `stocks_daily`.
///
/// Only store errors are returned as `Err`; they end the run.
#[derive(Clone)]
pub struct Loader {
    warehouse: Warehouse,
    source: String,
}

impl Loader {
    pub fn new(warehouse: Warehouse, source: impl Into<String>) -> Self {
        Self {
            warehouse,
            source: source.into(),
        }
    }

    pub fn load(&self, bar: &DailyBar) -> Result<LoadOutcome, PipelineError> {
        if let Err(error) = bar.validate() {
            warn!(ticker = %bar.symbol, date = %format_date(bar.date), %error, "rejecting bar");
            return Ok(LoadOutcome::Rejected(error));
        }

        self.warehouse
            .upsert_daily_price(&bar.to_record(), &self.source)?;
        debug!(ticker = %bar.symbol, date = %format_date(bar.date), close = bar.close, "bar stored");
        Ok(LoadOutcome::Stored)
    }

    /// Appends a line for `ticker` to the run's audit log.
    pub fn record(
        &self,
        run_id: &str,
        ticker: &str,
        status: &str,
        detail: Option<&str>,
    ) -> Result<(), PipelineError> {
        self.warehouse.record_load(run_id, ticker, status, detail)?;
        Ok(())
    }
}
