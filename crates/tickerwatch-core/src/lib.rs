//! # Tickerwatch Core
//!
//! Traversal, extraction and validation pipeline for stock ticker mentions in
//! Reddit discussion threads.
//!
//! ## Overview
//!
//! A run walks one subreddit's top posts, their top comments and the top
//! replies to those comments. Every fetched text is split into bounded chunks,
//! tagged for ticker-like spans, checked against an ordered rule list backed by
//! the SEC ticker registry, deduplicated, and written to a sink.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`collector`] | Per-run dedup in front of a mention sink |
//! | [`domain`] | Tickers, submissions, mentions, timestamps |
//! | [`error`] | Core error types |
//! | [`extraction`] | Chunking adapter and entity taggers |
//! | [`fetcher`] | Concurrency- and quota-bounded upstream calls |
//! | [`http_client`] | HTTP client abstraction |
//! | [`pipeline`] | Run driver wiring the stages together |
//! | [`reddit`] | Reddit endpoints and wire types |
//! | [`registry`] | Ticker registry with live source and cache fallback |
//! | [`retry`] | Backoff policies |
//! | [`stats`] | Run counters and status |
//! | [`throttling`] | Sliding-window request quota |
//! | [`traversal`] | Post, comment and reply fan-out |
//! | [`validator`] | Ordered ticker acceptance rules |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐
//! │  Traversal      │────▶│ Rate-Limited     │──▶ Reddit
//! │  Orchestrator   │     │ Fetcher          │
//! └────────┬────────┘     └──────────────────┘
//!          │ TextUnit (bounded channel)
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Extraction      │────▶│ Entity Tagger    │
//! │ Adapter         │     │ (pattern/remote) │
//! └────────┬────────┘     └──────────────────┘
//!          │ CandidateSpan
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Ticker          │────▶│ Ticker Registry  │
//! │ Validator       │     │ (SEC / cache)    │
//! └────────┬────────┘     └──────────────────┘
//!          │ Mention
//!          ▼
//! ┌─────────────────┐
//! │ Collector/Sink  │
//! └─────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Upstream failures carry a [`FetchErrorKind`]. Only an authorization failure
//! stops a run; every other failure skips the affected branch:
//!
//! ```rust
//! use tickerwatch_core::{FetchError, FetchErrorKind};
//!
//! fn describe(error: &FetchError) -> &'static str {
//!     match error.kind() {
//!         FetchErrorKind::Unauthorized => "run cancelled",
//!         FetchErrorKind::RateLimited | FetchErrorKind::TransientNetwork => "retried, then skipped",
//!         _ => "skipped",
//!     }
//! }
//! ```

pub mod collector;
pub mod domain;
pub mod error;
pub mod extraction;
pub mod fetcher;
pub mod http_client;
pub mod pipeline;
pub mod reddit;
pub mod registry;
pub mod retry;
pub mod stats;
pub mod throttling;
pub mod traversal;
pub mod validator;

pub use collector::{MemoryMentionSink, MentionCollector, MentionSink, RecordOutcome, WarehouseSink};

pub use domain::{
    normalize, CandidateSpan, Mention, MentionKey, Provenance, SubmissionKind, TextUnit, Ticker,
    UtcDateTime,
};

pub use error::{
    ConfigError, ExtractionError, RegistryError, RunError, SinkError, ValidationError,
};

pub use extraction::{
    chunk_text, merge_spans, EntityTagger, ExtractionAdapter, ExtractionConfig, ExtractionOutcome,
    PatternTagger, RemoteTagger, TaggedSpan, TextChunk,
};

pub use fetcher::{FetchError, FetchErrorKind, FetcherConfig, RateLimitedFetcher};

pub use http_client::{
    HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, ReqwestHttpClient,
};

pub use pipeline::{Pipeline, PipelineConfig, RunReport};

pub use reddit::{normalize_subreddit, RedditApi, TopWindow};

pub use registry::{RegistryLoader, RegistrySnapshot, RegistrySource, TickerRegistry};

pub use retry::{Backoff, RetryConfig};

pub use stats::{RunStats, RunStatus, StatsSnapshot};

pub use throttling::QuotaWindow;

pub use traversal::{FetchNode, TraversalLimits, TraversalOrchestrator, TraversalOutcome};

pub use validator::{RejectReason, Rule, TickerValidator, ValidationPolicy, Verdict};

// Warehouse (re-exported from tickerwatch-warehouse)
pub use tickerwatch_warehouse::{
    MentionRecord, QueryGuardrails, QueryResult, RunRecord, Warehouse, WarehouseConfig,
    WarehouseError,
};
