//! # Rate-Limited Fetcher
//!
//! The single point of contention for upstream calls. Every request passes
//! through a concurrency semaphore and then a rolling quota window before it
//! is issued. Upstream rate-limit signals and transient network failures are
//! retried with bounded backoff; everything else returns immediately.
//!
//! The permit is held only while a request is on the wire. Quota waits and
//! backoff sleeps do not occupy a concurrency slot, and both end as soon as
//! the fetcher is closed.

use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, warn};

use crate::http_client::{HttpClient, HttpRequest, HttpResponse, DEFAULT_USER_AGENT};
use crate::retry::RetryConfig;
use crate::throttling::QuotaWindow;
use crate::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    /// Upstream kept signalling rate limits after every retry.
    RateLimited,
    /// Timeouts, connection resets and 5xx after every retry.
    TransientNetwork,
    /// Response body did not match the expected shape.
    MalformedResponse,
    /// Non-retryable 4xx other than 401/403/429.
    Rejected,
    /// 401/403. Fatal to the run.
    Unauthorized,
    /// The fetcher was closed while the request was queued.
    Cancelled,
}

/// Structured fetch error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    kind: FetchErrorKind,
    message: String,
    retryable: bool,
    status: Option<u16>,
    retry_after: Option<Duration>,
}

impl FetchError {
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
            status: Some(429),
            retry_after: None,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::TransientNetwork,
            message: message.into(),
            retryable: true,
            status: None,
            retry_after: None,
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::MalformedResponse,
            message: message.into(),
            retryable: false,
            status: None,
            retry_after: None,
        }
    }

    pub fn rejected(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Rejected,
            message: message.into(),
            retryable: false,
            status,
            retry_after: None,
        }
    }

    pub fn unauthorized(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Unauthorized,
            message: message.into(),
            retryable: false,
            status: Some(status),
            retry_after: None,
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Cancelled,
            message: message.into(),
            retryable: false,
            status: None,
            retry_after: None,
        }
    }

    fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    pub const fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    pub const fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    /// Errors that must cancel the whole run rather than skip one node.
    pub const fn is_fatal(&self) -> bool {
        matches!(self.kind, FetchErrorKind::Unauthorized)
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            FetchErrorKind::RateLimited => "fetch.rate_limited",
            FetchErrorKind::TransientNetwork => "fetch.transient_network",
            FetchErrorKind::MalformedResponse => "fetch.malformed_response",
            FetchErrorKind::Rejected => "fetch.rejected",
            FetchErrorKind::Unauthorized => "fetch.unauthorized",
            FetchErrorKind::Cancelled => "fetch.cancelled",
        }
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for FetchError {}

/// Tuning for [`RateLimitedFetcher`].
#[derive(Debug, Clone, PartialEq)]
pub struct FetcherConfig {
    pub max_concurrent: usize,
    pub quota_limit: u32,
    pub quota_window: Duration,
    pub timeout_ms: u64,
    pub rate_limit_retry: RetryConfig,
    pub transient_retry: RetryConfig,
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 15,
            quota_limit: 100,
            quota_window: Duration::from_secs(600),
            timeout_ms: 10_000,
            rate_limit_retry: RetryConfig::rate_limit(),
            transient_retry: RetryConfig::transient(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FetcherConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::Zero {
                field: "max_concurrent",
            });
        }
        if self.max_concurrent > Semaphore::MAX_PERMITS {
            return Err(ConfigError::TooLarge {
                field: "max_concurrent",
                value: self.max_concurrent as u64,
                max: Semaphore::MAX_PERMITS as u64,
            });
        }
        if self.quota_limit == 0 {
            return Err(ConfigError::Zero {
                field: "quota_limit",
            });
        }
        if self.quota_window.is_zero() {
            return Err(ConfigError::Zero {
                field: "quota_window",
            });
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Zero {
                field: "timeout_ms",
            });
        }
        Ok(())
    }
}

/// Shared, owned gate in front of the upstream content API.
pub struct RateLimitedFetcher {
    http: Arc<dyn HttpClient>,
    config: FetcherConfig,
    permits: Arc<Semaphore>,
    quota: QuotaWindow,
    closed: watch::Sender<bool>,
    in_flight: AtomicUsize,
    issued: AtomicU64,
}

impl RateLimitedFetcher {
    pub fn new(http: Arc<dyn HttpClient>, config: FetcherConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            http,
            permits: Arc::new(Semaphore::new(config.max_concurrent)),
            quota: QuotaWindow::new(config.quota_limit, config.quota_window),
            closed: watch::channel(false).0,
            config,
            in_flight: AtomicUsize::new(0),
            issued: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Requests currently on the wire.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Total requests issued upstream, retries included.
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    /// Stops admitting requests. Callers queued for a permit, waiting on the
    /// quota or sleeping in backoff receive [`FetchErrorKind::Cancelled`];
    /// requests already on the wire run to completion.
    pub fn close(&self) {
        self.closed.send_replace(true);
        self.permits.close();
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// Issues `request` under the concurrency cap and quota, retrying rate-limit
    /// and transient failures within their budgets.
    pub async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, FetchError> {
        let mut rate_limit_attempt = 0_u32;
        let mut transient_attempt = 0_u32;

        loop {
            let error = match self.attempt(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };

            let (policy, attempt) = match error.kind() {
                FetchErrorKind::RateLimited => (&self.config.rate_limit_retry, &mut rate_limit_attempt),
                FetchErrorKind::TransientNetwork => {
                    (&self.config.transient_retry, &mut transient_attempt)
                }
                _ => return Err(error),
            };

            if *attempt >= policy.max_retries {
                warn!(
                    url = %request.url,
                    attempts = *attempt + 1,
                    error = %error,
                    "retries exhausted"
                );
                return Err(error);
            }
            let delay = policy.delay_with_hint(*attempt, error.retry_after());
            *attempt += 1;
            warn!(
                url = %request.url,
                attempt = *attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "upstream call failed; backing off"
            );
            if !self.pause(delay).await {
                return Err(error);
            }
        }
    }

    /// Sleeps for `delay`. Returns `false` if the fetcher was closed first.
    async fn pause(&self, delay: Duration) -> bool {
        let mut closed = self.closed.subscribe();
        tokio::select! {
            biased;
            _ = closed.wait_for(|closed| *closed) => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// [`fetch`](Self::fetch) and decode the body as JSON.
    pub async fn fetch_json<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<T, FetchError> {
        let url = request.url.clone();
        let response = self.fetch(request).await?;
        serde_json::from_str(&response.body)
            .map_err(|e| FetchError::malformed(format!("invalid JSON from '{url}': {e}")))
    }

    async fn attempt(&self, request: HttpRequest) -> Result<HttpResponse, FetchError> {
        let cancelled = || FetchError::cancelled(format!("fetcher closed before '{}'", request.url));

        // The quota is only charged once a permit is held, so a recorded call
        // is always issued right away. Waiting for budget releases the permit.
        let _permit = loop {
            let permit = self.permits.acquire().await.map_err(|_| cancelled())?;
            match self.quota.try_acquire() {
                Ok(()) => break permit,
                Err(wait) => {
                    drop(permit);
                    debug!(url = %request.url, wait_ms = wait.as_millis() as u64, "quota window exhausted");
                    if !self.pause(wait.max(Duration::from_millis(1))).await {
                        return Err(cancelled());
                    }
                }
            }
        };

        let timeout = Duration::from_millis(self.config.timeout_ms);
        let mut request = request.with_timeout_ms(self.config.timeout_ms);
        if !request.headers.contains_key("user-agent") {
            request = request.with_header("user-agent", self.config.user_agent.clone());
        }
        let url = request.url.clone();

        let _guard = InFlight::enter(&self.in_flight);
        self.issued.fetch_add(1, Ordering::SeqCst);
        debug!(url = %url, "issuing upstream call");

        let result = tokio::time::timeout(timeout, self.http.execute(request)).await;
        match result {
            Err(_) => Err(FetchError::transient(format!(
                "request to '{url}' timed out after {}ms",
                self.config.timeout_ms
            ))),
            Ok(Err(error)) if error.retryable() => Err(FetchError::transient(format!(
                "request to '{url}' failed: {error}"
            ))),
            Ok(Err(error)) => Err(FetchError::rejected(
                None,
                format!("request to '{url}' failed: {error}"),
            )),
            Ok(Ok(response)) => classify(&url, response),
        }
    }
}

fn classify(url: &str, response: HttpResponse) -> Result<HttpResponse, FetchError> {
    let status = response.status;
    match status {
        200..=299 => Ok(response),
        429 => Err(FetchError::rate_limited(format!("'{url}' returned 429"))
            .with_retry_after(response.retry_after())),
        401 | 403 => Err(FetchError::unauthorized(
            status,
            format!("'{url}' returned {status}"),
        )),
        408 | 500..=599 => Err(FetchError::transient(format!("'{url}' returned {status}"))
            .with_status(status)),
        _ => Err(FetchError::rejected(
            Some(status),
            format!("'{url}' returned {status}"),
        )),
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
