use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::SubmissionKind;

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every scheduled node and record succeeded.
    Completed,
    /// Finished, but some branches, chunks or records were skipped.
    Partial,
    /// Stopped early by a fatal upstream error.
    Cancelled,
    /// Aborted by a fatal local error (registry, persistence).
    Failed,
}

impl RunStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

impl Display for RunStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run counters, updated concurrently.
#[derive(Debug, Default)]
pub struct RunStats {
    posts: AtomicU64,
    comments: AtomicU64,
    replies: AtomicU64,
    mentions: AtomicU64,
    duplicates: AtomicU64,
    rejected: AtomicU64,
    errors_skipped: AtomicU64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_unit(&self, kind: SubmissionKind) {
        let counter = match kind {
            SubmissionKind::Post => &self.posts,
            SubmissionKind::Comment => &self.comments,
            SubmissionKind::Reply => &self.replies,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_mention(&self) {
        self.mentions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self, count: u64) {
        self.errors_skipped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            posts: self.posts.load(Ordering::Relaxed),
            comments: self.comments.load(Ordering::Relaxed),
            replies: self.replies.load(Ordering::Relaxed),
            mentions: self.mentions.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            errors_skipped: self.errors_skipped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`RunStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub posts: u64,
    pub comments: u64,
    pub replies: u64,
    pub mentions: u64,
    pub duplicates: u64,
    pub rejected: u64,
    pub errors_skipped: u64,
}

impl StatsSnapshot {
    pub const fn units(&self) -> u64 {
        self.posts + self.comments + self.replies
    }
}
