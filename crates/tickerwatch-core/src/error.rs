use thiserror::Error;

use crate::stats::StatsSnapshot;

/// Validation errors for domain values.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("ticker cannot be empty")]
    EmptyTicker,
    #[error("ticker length {len} exceeds max {max}")]
    TickerTooLong { len: usize, max: usize },
    #[error("ticker must start with an ASCII letter: '{ch}'")]
    TickerInvalidStart { ch: char },
    #[error("ticker contains invalid character '{ch}' at index {index}")]
    TickerInvalidChar { ch: char, index: usize },

    #[error("invalid submission type '{value}', expected one of POST, COMMENT, REPLY")]
    InvalidSubmissionKind { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
    #[error("epoch seconds out of range: {value}")]
    InvalidEpoch { value: f64 },
}

/// Invalid run configuration. Reported before any network call is made.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("subreddit name cannot be empty")]
    EmptySubreddit,
    #[error("subreddit name contains invalid character '{ch}'")]
    InvalidSubreddit { ch: char },
    #[error("'{field}' must be greater than zero")]
    Zero { field: &'static str },
    #[error("'{field}' must be at most {max}, got {value}")]
    TooLarge {
        field: &'static str,
        value: u64,
        max: u64,
    },
    #[error("chunk size {chunk_size} must be at least twice the overlap {overlap}")]
    ChunkOverlap { chunk_size: usize, overlap: usize },
    #[error("ticker length bounds are inverted: min {min} > max {max}")]
    LengthBounds { min: usize, max: usize },
    #[error("invalid top window '{value}', expected one of hour, day, week, month, year, all")]
    InvalidTopWindow { value: String },
    #[error("{0}")]
    Invalid(String),
}

/// Neither the live reference source nor the local cache produced a registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("ticker registry unavailable: live source failed ({live}); cache failed ({cache})")]
    Unavailable { live: String, cache: String },
}

/// Failure reported by a mention sink.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The backend itself is gone. Fatal to the run.
    #[error("persistence connection lost: {0}")]
    ConnectionLost(String),
    /// A single record could not be written. Logged and counted.
    #[error("persistence write failed: {0}")]
    WriteFailed(String),
}

impl SinkError {
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::ConnectionLost(_))
    }
}

/// The tagging capability failed on one chunk.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("tagger unavailable: {0}")]
    Unavailable(String),
    #[error("tagger returned malformed output: {0}")]
    Malformed(String),
    #[error("tagger span at offset {start} is outside the {len}-byte chunk")]
    SpanOutOfBounds { start: usize, len: usize },
}

/// Fatal run outcomes. Node-local and per-record failures never surface here;
/// they are counted in [`StatsSnapshot`].
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{source}")]
    PersistenceLost {
        #[source]
        source: SinkError,
        stats: StatsSnapshot,
    },
}

impl RunError {
    /// Counters gathered before the run aborted, when it got that far.
    pub fn stats(&self) -> Option<&StatsSnapshot> {
        match self {
            Self::PersistenceLost { stats, .. } => Some(stats),
            _ => None,
        }
    }
}
