use stockpulse_core::{ConfigError, HttpError, PipelineError, ValidationError, WarehouseError};
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("command error: {0}")]
    Command(String),

    #[error(transparent)]
    Pipeline(PipelineError),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error("http client setup failed: {0}")]
    Http(#[from] HttpError),

    #[error("batch finished without loading any of {tickers} tickers")]
    NothingLoaded { tickers: usize },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<PipelineError> for CliError {
    fn from(error: PipelineError) -> Self {
        match error {
            PipelineError::Validation(error) => Self::Validation(error),
            PipelineError::Config(error) => Self::Config(error),
            PipelineError::Warehouse(error) => Self::Warehouse(error),
            other => Self::Pipeline(other),
        }
    }
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) | Self::Config(_) | Self::Command(_) => 2,
            Self::NothingLoaded { .. } => 3,
            Self::Pipeline(_)
            | Self::Warehouse(_)
            | Self::Http(_)
            | Self::Serialization(_)
            | Self::Io(_) => 10,
        }
    }
}
