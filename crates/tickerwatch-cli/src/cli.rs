//! CLI argument definitions for tickerwatch.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `scan` | Walk a subreddit and record ticker mentions |
//! | `top` | Most mentioned tickers in the warehouse |
//! | `sql` | Read-only query against the DuckDB warehouse |
//!
//! Every `scan` option can also be set through the environment variable named
//! in its help text. A `.env` file in the working directory is loaded first.
//!
//! # Examples
//!
//! ```bash
//! tickerwatch scan wallstreetbets --max-posts 25 --top-window day
//! tickerwatch scan stocks --dry-run --log-format json
//! tickerwatch top --limit 10 --subreddit stocks
//! tickerwatch sql "SELECT * FROM vw_ticker_daily WHERE ticker = 'TSLA'"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tickerwatch_core::{
    ExtractionConfig, FetcherConfig, PipelineConfig, RedditApi, RetryConfig, TopWindow,
    TraversalLimits, ValidationPolicy,
};

use crate::error::CliError;

/// Ticker mention tracker for Reddit discussion threads.
#[derive(Debug, Parser)]
#[command(
    name = "tickerwatch",
    author,
    version,
    about = "Track stock ticker mentions across Reddit threads",
    long_about = "tickerwatch walks a subreddit's top posts, their top comments and the top \
replies to those comments, extracts ticker symbols, validates them against the SEC ticker \
list, and stores each mention in a local DuckDB warehouse.\n\
\n\
Use 'tickerwatch <command> --help' for command-specific help."
)]
pub struct Cli {
    /// Log line format on stderr. Filter with RUST_LOG.
    #[arg(
        long,
        global = true,
        value_enum,
        env = "TICKERWATCH_LOG_FORMAT",
        default_value_t = LogFormat::Text
    )]
    pub log_format: LogFormat,

    /// Pretty-print JSON output.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan one subreddit and record the ticker mentions found.
    ///
    /// Prints a JSON run summary and writes it to runs/<run_id>.json under
    /// TICKERWATCH_HOME. Exits 3 when some branches were skipped and 8 when
    /// Reddit refused access mid-run.
    ///
    /// # Examples
    ///
    ///   tickerwatch scan stocks
    ///   tickerwatch scan wallstreetbets --max-posts 50 --max-comments 10
    Scan(ScanArgs),

    /// Most mentioned tickers across stored runs.
    Top(TopArgs),

    /// Run a read-only SQL query against the warehouse.
    ///
    /// Tables: mentions, run_log. Views: vw_ticker_counts, vw_ticker_daily.
    Sql(SqlArgs),
}

/// Entity tagger used for extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TaggerKind {
    /// Built-in cashtag and all-caps pattern.
    Pattern,
    /// HTTP entity recognition service (requires --tagger-url).
    Remote,
}

/// Arguments for the `scan` command.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Subreddit to scan, with or without the r/ prefix.
    #[arg(env = "SUBREDDIT")]
    pub subreddit: String,

    /// Upper bound on simultaneous Reddit calls.
    #[arg(long, env = "TICKERWATCH_MAX_CONCURRENT", default_value_t = 15)]
    pub max_concurrent: usize,

    /// Top posts to read.
    #[arg(long, env = "TICKERWATCH_MAX_POSTS", default_value_t = 15)]
    pub max_posts: usize,

    /// Top comments to read per post.
    #[arg(long, env = "TICKERWATCH_MAX_COMMENTS", default_value_t = 5)]
    pub max_comments: usize,

    /// Top replies to read per comment.
    #[arg(long, env = "TICKERWATCH_MAX_REPLIES", default_value_t = 5)]
    pub max_replies: usize,

    /// Time window for the top listing: hour, day, week, month, year or all.
    #[arg(long, env = "TICKERWATCH_TOP_WINDOW", default_value = "week")]
    pub top_window: TopWindow,

    /// Reddit calls allowed per quota window.
    #[arg(long, env = "TICKERWATCH_QUOTA_LIMIT", default_value_t = 100)]
    pub quota_limit: u32,

    /// Length of the quota window in seconds.
    #[arg(long, env = "TICKERWATCH_QUOTA_WINDOW_SECS", default_value_t = 600)]
    pub quota_window_secs: u64,

    /// Per-request timeout in milliseconds.
    #[arg(long, env = "TICKERWATCH_TIMEOUT_MS", default_value_t = 10_000)]
    pub timeout_ms: u64,

    /// Retries after a 429 before a branch is skipped.
    #[arg(long, env = "TICKERWATCH_RATE_LIMIT_RETRIES", default_value_t = 3)]
    pub rate_limit_retries: u32,

    /// Retries after a timeout or 5xx before a branch is skipped.
    #[arg(long, env = "TICKERWATCH_TRANSIENT_RETRIES", default_value_t = 2)]
    pub transient_retries: u32,

    /// Largest text chunk handed to the tagger, in bytes.
    #[arg(long, env = "TICKERWATCH_CHUNK_SIZE", default_value_t = 512)]
    pub chunk_size: usize,

    /// Bytes shared by consecutive chunks.
    #[arg(long, env = "TICKERWATCH_CHUNK_OVERLAP", default_value_t = 8)]
    pub chunk_overlap: usize,

    /// Shortest accepted ticker.
    #[arg(long, env = "TICKERWATCH_MIN_TICKER_LEN", default_value_t = 1)]
    pub min_ticker_len: usize,

    /// Longest accepted ticker.
    #[arg(long, env = "TICKERWATCH_MAX_TICKER_LEN", default_value_t = 5)]
    pub max_ticker_len: usize,

    /// Stoplist file, one word per line. Replaces the built-in list.
    #[arg(long, env = "TICKERWATCH_STOPLIST")]
    pub stoplist: Option<PathBuf>,

    /// Reject stoplisted words even when written as a cashtag.
    #[arg(long, env = "TICKERWATCH_NO_DOLLAR_OVERRIDE", default_value_t = false)]
    pub no_dollar_override: bool,

    #[arg(long, value_enum, env = "TICKERWATCH_TAGGER", default_value_t = TaggerKind::Pattern)]
    pub tagger: TaggerKind,

    /// Endpoint of the remote tagger.
    #[arg(long, env = "TICKERWATCH_TAGGER_URL")]
    pub tagger_url: Option<String>,

    /// SEC company ticker list.
    #[arg(long, env = "TICKERWATCH_REGISTRY_URL", default_value = tickerwatch_core::registry::SEC_TICKERS_URL)]
    pub registry_url: String,

    /// Contact address appended to the SEC User-Agent.
    #[arg(long, env = "TICKERWATCH_CONTACT_EMAIL")]
    pub contact_email: Option<String>,

    /// Reddit host.
    #[arg(long, env = "TICKERWATCH_REDDIT_URL", default_value = tickerwatch_core::reddit::DEFAULT_BASE_URL)]
    pub reddit_url: String,

    /// Print mentions as NDJSON instead of writing them to the warehouse.
    #[arg(long, env = "TICKERWATCH_DRY_RUN", default_value_t = false)]
    pub dry_run: bool,
}

impl ScanArgs {
    pub fn pipeline_config(&self) -> Result<PipelineConfig, CliError> {
        let config = PipelineConfig {
            limits: TraversalLimits {
                max_posts: self.max_posts,
                max_comments_per_post: self.max_comments,
                max_replies_per_comment: self.max_replies,
                max_concurrent: self.max_concurrent,
            },
            fetcher: FetcherConfig {
                max_concurrent: self.max_concurrent,
                quota_limit: self.quota_limit,
                quota_window: Duration::from_secs(self.quota_window_secs),
                timeout_ms: self.timeout_ms,
                rate_limit_retry: RetryConfig::rate_limit().with_max_retries(self.rate_limit_retries),
                transient_retry: RetryConfig::transient().with_max_retries(self.transient_retries),
                ..FetcherConfig::default()
            },
            extraction: ExtractionConfig {
                chunk_size: self.chunk_size,
                overlap: self.chunk_overlap,
                ..ExtractionConfig::default()
            },
            reddit: RedditApi::new(&self.reddit_url, self.top_window),
            ..PipelineConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validation_policy(
        &self,
        stoplist: std::collections::BTreeSet<String>,
    ) -> Result<ValidationPolicy, CliError> {
        let policy = ValidationPolicy::standard(
            self.min_ticker_len,
            self.max_ticker_len,
            stoplist,
            !self.no_dollar_override,
        );
        policy.validate()?;
        Ok(policy)
    }
}

/// Arguments for the `top` command.
#[derive(Debug, Args)]
pub struct TopArgs {
    /// Number of tickers to list.
    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    /// Only count mentions from this subreddit.
    #[arg(long)]
    pub subreddit: Option<String>,
}

/// Arguments for the `sql` command.
#[derive(Debug, Args)]
pub struct SqlArgs {
    /// SQL query to execute.
    pub query: String,

    /// Maximum number of rows to return.
    #[arg(long, default_value_t = 10_000)]
    pub max_rows: usize,

    /// Query timeout in milliseconds.
    #[arg(long, default_value_t = 5_000)]
    pub query_timeout_ms: u64,
}
