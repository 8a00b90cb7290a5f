use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tickerwatch_core::{RunRecord, RunStatus, StatsSnapshot};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::CliError;

/// Run identifier (UUID v4), shared by the metadata file and warehouse rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for RunId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// What a scan prints and persists once it ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub subreddit: String,
    pub status: RunStatus,
    pub registry_source: String,
    pub stats: StatsSnapshot,
    pub requests: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub started_at: String,
    pub finished_at: String,
    pub elapsed_ms: u64,
    pub dry_run: bool,
}

impl RunSummary {
    pub fn to_record(&self) -> RunRecord {
        RunRecord {
            run_id: self.run_id.to_string(),
            subreddit: self.subreddit.clone(),
            status: self.status.as_str().to_string(),
            registry_source: self.registry_source.clone(),
            posts: self.stats.posts,
            comments: self.stats.comments,
            replies: self.stats.replies,
            mentions: self.stats.mentions,
            duplicates: self.stats.duplicates,
            errors_skipped: self.stats.errors_skipped,
            started_at: self.started_at.clone(),
            finished_at: self.finished_at.clone(),
        }
    }
}

pub fn rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

/// Writes `runs/<run_id>.json` under the home directory and returns its path.
///
/// The file is written next to its final name and renamed into place, so a
/// reader never sees a partial summary.
pub fn write_run_metadata(home: &Path, summary: &RunSummary) -> Result<PathBuf, CliError> {
    let dir = home.join("runs");
    fs::create_dir_all(&dir)?;

    let path = dir.join(format!("{}.json", summary.run_id));
    let tmp = dir.join(format!("{}.json.tmp", summary.run_id));
    let bytes = serde_json::to_vec_pretty(summary)?;
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, &path)?;
    Ok(path)
}
