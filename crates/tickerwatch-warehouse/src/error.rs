use thiserror::Error;

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// The database file could not be opened or a connection could not be handed out.
    #[error("warehouse connection failed: {0}")]
    Connection(String),

    /// A statement failed on an otherwise healthy connection.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A record violated a schema constraint before reaching the database.
    #[error("invalid record: {0}")]
    InvalidData(String),

    /// Query was rejected due to policy violation.
    #[error("query rejected: {0}")]
    QueryRejected(String),

    /// Query execution timed out.
    #[error("query timed out after {timeout_ms}ms")]
    QueryTimeout { timeout_ms: u64 },
}

impl WarehouseError {
    /// Whether the error concerns the backend itself rather than a single statement.
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Io(_))
    }
}
