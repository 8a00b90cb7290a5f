use thiserror::Error;
use tickerwatch_core::{ConfigError, RegistryError, RunStatus, WarehouseError};

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Usage(String),

    #[error("run finished with {skipped} skipped branches, chunks or records")]
    Partial { skipped: u64 },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("persistence lost: {0}")]
    PersistenceLost(String),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error("run cancelled: {0}")]
    Cancelled(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::Usage(_) => 2,
            Self::Partial { .. } => 3,
            Self::Serialization(_) => 4,
            Self::Registry(_) => 6,
            Self::PersistenceLost(_) => 7,
            Self::Warehouse(error) if error.is_connection() => 7,
            Self::Warehouse(_) => 2,
            Self::Cancelled(_) => 8,
            Self::Io(_) => 10,
        }
    }

    /// Error for a run that returned a report but did not complete cleanly.
    pub fn for_status(status: RunStatus, skipped: u64, cause: Option<&str>) -> Option<Self> {
        match status {
            RunStatus::Completed => None,
            RunStatus::Partial => Some(Self::Partial { skipped }),
            RunStatus::Cancelled | RunStatus::Failed => Some(Self::Cancelled(
                cause.unwrap_or("fatal upstream error").to_string(),
            )),
        }
    }
}
