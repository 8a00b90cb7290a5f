//! # Mention Collector
//!
//! Drops repeats of `(submission_id, type, ticker)` within a run and forwards
//! the rest to a [`MentionSink`].

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tickerwatch_warehouse::{MentionRecord, Warehouse};
use tracing::{debug, warn};

use crate::{Mention, MentionKey, SinkError};

/// Persistence boundary. One record per call. Writes may block; the pipeline
/// calls sinks from the blocking pool.
pub trait MentionSink: Send + Sync {
    fn write(&self, mention: &Mention) -> Result<(), SinkError>;
}

/// Keeps written mentions in memory. Backs dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryMentionSink {
    mentions: Mutex<Vec<Mention>>,
}

impl MemoryMentionSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mentions(&self) -> Vec<Mention> {
        self.mentions
            .lock()
            .expect("memory sink should not be poisoned")
            .clone()
    }

    pub fn len(&self) -> usize {
        self.mentions
            .lock()
            .expect("memory sink should not be poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MentionSink for MemoryMentionSink {
    fn write(&self, mention: &Mention) -> Result<(), SinkError> {
        self.mentions
            .lock()
            .expect("memory sink should not be poisoned")
            .push(mention.clone());
        Ok(())
    }
}

/// Writes mentions into the DuckDB warehouse under one run id.
pub struct WarehouseSink {
    warehouse: Arc<Warehouse>,
    run_id: String,
}

impl WarehouseSink {
    pub fn new(warehouse: Arc<Warehouse>, run_id: impl Into<String>) -> Self {
        Self {
            warehouse,
            run_id: run_id.into(),
        }
    }
}

impl MentionSink for WarehouseSink {
    fn write(&self, mention: &Mention) -> Result<(), SinkError> {
        let record = MentionRecord {
            run_id: self.run_id.clone(),
            ticker: mention.ticker.to_string(),
            submission_id: mention.submission_id.clone(),
            author: mention.author.clone(),
            subreddit: mention.subreddit.clone(),
            score: mention.score,
            kind: mention.kind.as_str().to_string(),
            created_utc: mention.created_utc.format_rfc3339(),
        };

        match self.warehouse.insert_mention(&record) {
            Ok(_) => Ok(()),
            Err(error) if error.is_connection() => Err(SinkError::ConnectionLost(error.to_string())),
            Err(error) => Err(SinkError::WriteFailed(error.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Written,
    Duplicate,
    /// The sink rejected this record; the run continues.
    Failed(SinkError),
}

/// Per-run dedup set in front of a sink.
pub struct MentionCollector {
    sink: Arc<dyn MentionSink>,
    seen: Mutex<HashSet<MentionKey>>,
}

impl MentionCollector {
    pub fn new(sink: Arc<dyn MentionSink>) -> Self {
        Self {
            sink,
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Forwards `mention` unless its key was already seen this run.
    ///
    /// A key is marked seen before the write, so a record that failed once is
    /// not retried by a later repeat. Only a lost connection is returned as an error.
    pub fn record(&self, mention: Mention) -> Result<RecordOutcome, SinkError> {
        let fresh = self
            .seen
            .lock()
            .expect("collector dedup set should not be poisoned")
            .insert(mention.key());
        if !fresh {
            debug!(
                submission_id = %mention.submission_id,
                ticker = %mention.ticker,
                "duplicate mention dropped"
            );
            return Ok(RecordOutcome::Duplicate);
        }

        match self.sink.write(&mention) {
            Ok(()) => Ok(RecordOutcome::Written),
            Err(error) if error.is_fatal() => Err(error),
            Err(error) => {
                warn!(
                    submission_id = %mention.submission_id,
                    ticker = %mention.ticker,
                    error = %error,
                    "mention write failed"
                );
                Ok(RecordOutcome::Failed(error))
            }
        }
    }
}
