//! # Pipeline
//!
//! Runs traversal and processing side by side: the orchestrator pushes text
//! units into a bounded channel while the consumer extracts, validates and
//! records them as they arrive. Sink writes run on the blocking pool so a slow
//! database never stalls the runtime thread the consumer shares with traversal.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::collector::{MentionCollector, MentionSink, RecordOutcome};
use crate::extraction::{EntityTagger, ExtractionAdapter, ExtractionConfig};
use crate::fetcher::{FetcherConfig, RateLimitedFetcher};
use crate::http_client::HttpClient;
use crate::reddit::{normalize_subreddit, RedditApi};
use crate::stats::{RunStats, RunStatus, StatsSnapshot};
use crate::traversal::{TraversalLimits, TraversalOrchestrator, TraversalOutcome};
use crate::validator::TickerValidator;
use crate::{ConfigError, Mention, RunError, SinkError, TextUnit};

/// Everything a run needs besides its collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub limits: TraversalLimits,
    pub fetcher: FetcherConfig,
    pub extraction: ExtractionConfig,
    pub reddit: RedditApi,
    /// Text units buffered between traversal and processing.
    pub channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            limits: TraversalLimits::default(),
            fetcher: FetcherConfig::default(),
            extraction: ExtractionConfig::default(),
            reddit: RedditApi::default(),
            channel_capacity: 64,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.limits.validate()?;
        self.fetcher.validate()?;
        self.extraction.validate()?;
        if self.channel_capacity == 0 {
            return Err(ConfigError::Zero {
                field: "channel_capacity",
            });
        }
        Ok(())
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub subreddit: String,
    pub status: RunStatus,
    pub stats: StatsSnapshot,
    /// Upstream calls issued, retries included.
    pub requests: u64,
    /// Cause of a cancelled run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_by: Option<String>,
    pub elapsed_ms: u64,
}

/// One traversal-extraction-validation run over a subreddit.
pub struct Pipeline {
    limits: TraversalLimits,
    channel_capacity: usize,
    fetcher: Arc<RateLimitedFetcher>,
    orchestrator: TraversalOrchestrator,
    extractor: ExtractionAdapter,
    validator: TickerValidator,
    collector: Arc<MentionCollector>,
    stats: RunStats,
}

impl Pipeline {
    pub fn new(
        http: Arc<dyn HttpClient>,
        config: PipelineConfig,
        tagger: Arc<dyn EntityTagger>,
        validator: TickerValidator,
        sink: Arc<dyn MentionSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut fetcher_config = config.fetcher;
        fetcher_config.max_concurrent = config.limits.max_concurrent;
        let fetcher = Arc::new(RateLimitedFetcher::new(http, fetcher_config)?);

        Ok(Self {
            limits: config.limits,
            channel_capacity: config.channel_capacity,
            orchestrator: TraversalOrchestrator::new(Arc::clone(&fetcher), config.reddit),
            fetcher,
            extractor: ExtractionAdapter::new(tagger, config.extraction)?,
            validator,
            collector: Arc::new(MentionCollector::new(sink)),
            stats: RunStats::new(),
        })
    }

    pub fn fetcher(&self) -> &RateLimitedFetcher {
        &self.fetcher
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub async fn run(&self, subreddit: &str) -> Result<RunReport, RunError> {
        let subreddit = normalize_subreddit(subreddit)?;
        let started = Instant::now();
        info!(
            subreddit = %subreddit,
            max_posts = self.limits.max_posts,
            max_comments = self.limits.max_comments_per_post,
            max_replies = self.limits.max_replies_per_comment,
            max_concurrent = self.limits.max_concurrent,
            "starting run"
        );

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let (outcome, consumed) = tokio::join!(
            self.orchestrator.run(&subreddit, &self.limits, tx),
            self.consume(rx)
        );

        self.stats.record_skipped(outcome.errors_skipped());
        let stats = self.stats.snapshot();

        if let Err(source) = consumed {
            error!(subreddit = %subreddit, error = %source, "persistence lost; run failed");
            return Err(RunError::PersistenceLost { source, stats });
        }

        let report = RunReport {
            status: status_for(&outcome, &stats),
            subreddit,
            stats,
            requests: self.fetcher.issued(),
            cancelled_by: outcome.fatal.as_ref().map(ToString::to_string),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            subreddit = %report.subreddit,
            status = %report.status,
            posts = stats.posts,
            comments = stats.comments,
            replies = stats.replies,
            mentions = stats.mentions,
            errors_skipped = stats.errors_skipped,
            elapsed_ms = report.elapsed_ms,
            "run finished"
        );
        Ok(report)
    }

    async fn consume(&self, mut rx: mpsc::Receiver<TextUnit>) -> Result<(), SinkError> {
        while let Some(unit) = rx.recv().await {
            if let Err(error) = self.process(&unit).await {
                self.fetcher.close();
                return Err(error);
            }
        }
        Ok(())
    }

    async fn process(&self, unit: &TextUnit) -> Result<(), SinkError> {
        self.stats.record_unit(unit.kind());

        let extracted = self.extractor.extract(unit).await;
        self.stats.record_skipped(extracted.failed_chunks as u64);

        let mut accepted = Vec::new();
        for span in &extracted.spans {
            match self.validator.validate(span) {
                Some(ticker) => accepted.push(Mention::new(ticker, &unit.provenance)),
                None => self.stats.record_rejected(),
            }
        }

        debug!(
            submission_id = unit.id(),
            kind = %unit.kind(),
            spans = extracted.spans.len(),
            accepted = accepted.len(),
            "text unit processed"
        );
        if accepted.is_empty() {
            return Ok(());
        }
        self.persist(accepted).await
    }

    /// Records one unit's mentions on the blocking pool, stopping at the first
    /// lost connection. Outcomes before the loss still reach the stats.
    async fn persist(&self, mentions: Vec<Mention>) -> Result<(), SinkError> {
        let count = mentions.len() as u64;
        let collector = Arc::clone(&self.collector);
        let recorded = tokio::task::spawn_blocking(move || {
            let mut outcomes = Vec::with_capacity(mentions.len());
            for mention in mentions {
                match collector.record(mention) {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(error) => return (outcomes, Some(error)),
                }
            }
            (outcomes, None)
        })
        .await;

        let (outcomes, lost) = match recorded {
            Ok(recorded) => recorded,
            Err(join_error) => {
                warn!(error = %join_error, mentions = count, "mention writer panicked");
                self.stats.record_skipped(count);
                return Ok(());
            }
        };
        for outcome in outcomes {
            match outcome {
                RecordOutcome::Written => self.stats.record_mention(),
                RecordOutcome::Duplicate => self.stats.record_duplicate(),
                RecordOutcome::Failed(_) => self.stats.record_skipped(1),
            }
        }
        lost.map_or(Ok(()), Err)
    }
}

fn status_for(outcome: &TraversalOutcome, stats: &StatsSnapshot) -> RunStatus {
    if outcome.fatal.is_some() || outcome.cancelled {
        warn!(
            skipped = outcome.skipped_nodes,
            abandoned = outcome.abandoned_nodes,
            malformed = outcome.malformed_children,
            "run cancelled before traversal finished"
        );
        RunStatus::Cancelled
    } else if stats.errors_skipped > 0 {
        RunStatus::Partial
    } else {
        RunStatus::Completed
    }
}
