//! Behavior-driven tests for the rate-limited fetcher
//!
//! These tests verify HOW the fetcher shares its concurrency and quota budget
//! between callers and how it reacts to upstream throttling.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tickerwatch_core::{
    FetchErrorKind, FetcherConfig, HttpClient, HttpError, HttpRequest, HttpResponse,
    RateLimitedFetcher, RetryConfig,
};
use tokio::task::JoinSet;

/// Answers every call with 200 after a delay, tracking peak concurrency and call times.
struct SlowUpstream {
    delay: Duration,
    current: AtomicUsize,
    peak: AtomicUsize,
    calls: Mutex<Vec<Instant>>,
}

impl SlowUpstream {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().expect("lock").clone()
    }
}

impl HttpClient for SlowUpstream {
    fn execute<'a>(
        &'a self,
        _request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.lock().expect("lock").push(Instant::now());
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(HttpResponse::ok_json("{}"))
        })
    }
}

/// Replays a fixed script of responses, then answers 200.
struct ScriptedUpstream {
    replies: Mutex<VecDeque<HttpResponse>>,
    calls: AtomicUsize,
}

impl ScriptedUpstream {
    fn new(replies: Vec<HttpResponse>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HttpClient for ScriptedUpstream {
    fn execute<'a>(
        &'a self,
        _request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| HttpResponse::ok_json("{}"));
        Box::pin(async move { Ok(reply) })
    }
}

fn fetcher(http: Arc<dyn HttpClient>, config: FetcherConfig) -> Arc<RateLimitedFetcher> {
    Arc::new(RateLimitedFetcher::new(http, config).expect("valid fetcher config"))
}

// =============================================================================
// Fetcher: Shared Concurrency Budget
// =============================================================================

#[tokio::test]
async fn when_many_callers_fetch_at_once_system_never_exceeds_max_concurrent() {
    // Given: A fetcher capped at 3 in-flight calls and a slow upstream
    let upstream = SlowUpstream::new(Duration::from_millis(30));
    let fetcher = fetcher(
        upstream.clone(),
        FetcherConfig {
            max_concurrent: 3,
            ..FetcherConfig::default()
        },
    );

    // When: 12 callers fetch concurrently
    let mut tasks = JoinSet::new();
    for index in 0..12 {
        let fetcher = Arc::clone(&fetcher);
        tasks.spawn(async move {
            fetcher
                .fetch(HttpRequest::get(format!("https://reddit.test/{index}")))
                .await
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.expect("task").expect("fetch succeeds");
    }

    // Then: Every call went through, never more than 3 at a time
    assert_eq!(fetcher.issued(), 12);
    assert!(upstream.peak() <= 3, "peak concurrency was {}", upstream.peak());
    assert_eq!(upstream.peak(), 3, "the cap should actually be used");
    assert_eq!(fetcher.in_flight(), 0);
}

// =============================================================================
// Fetcher: Rolling Quota
// =============================================================================

#[tokio::test]
async fn when_quota_is_exhausted_system_waits_for_the_window_to_roll() {
    // Given: A budget of 3 calls per 200ms
    let upstream = SlowUpstream::new(Duration::ZERO);
    let fetcher = fetcher(
        upstream.clone(),
        FetcherConfig {
            quota_limit: 3,
            quota_window: Duration::from_millis(200),
            ..FetcherConfig::default()
        },
    );

    // When: 5 calls are made back to back
    for index in 0..5 {
        fetcher
            .fetch(HttpRequest::get(format!("https://reddit.test/{index}")))
            .await
            .expect("fetch succeeds");
    }

    // Then: No 4 consecutive calls fit inside one window
    let times = upstream.call_times();
    assert_eq!(times.len(), 5);
    for pair in times.windows(4) {
        let spread = pair[3].duration_since(pair[0]);
        assert!(
            spread >= Duration::from_millis(190),
            "4 calls issued within {spread:?}"
        );
    }
}

// =============================================================================
// Fetcher: Upstream Throttling
// =============================================================================

#[tokio::test]
async fn when_first_attempt_is_rate_limited_system_succeeds_after_backoff() {
    // Given: An upstream that answers 429 once, then 200
    let upstream = ScriptedUpstream::new(vec![HttpResponse::new(429, "slow down")]);
    let fetcher = fetcher(
        upstream.clone(),
        FetcherConfig {
            rate_limit_retry: RetryConfig::fixed(Duration::from_millis(120), 2),
            ..FetcherConfig::default()
        },
    );

    // When: A single fetch is made
    let started = Instant::now();
    let response = fetcher
        .fetch(HttpRequest::get("https://reddit.test/r/stocks/top.json"))
        .await;

    // Then: It succeeds on the second attempt, no sooner than the backoff
    assert_eq!(response.expect("retried into success").status, 200);
    assert_eq!(upstream.calls(), 2);
    assert!(started.elapsed() >= Duration::from_millis(120));
}

#[tokio::test]
async fn when_upstream_sends_retry_after_system_waits_at_least_that_long() {
    // Given: A 429 carrying Retry-After: 1 and a much shorter configured backoff
    let upstream = ScriptedUpstream::new(vec![
        HttpResponse::new(429, "").with_header("Retry-After", "1")
    ]);
    let fetcher = fetcher(
        upstream.clone(),
        FetcherConfig {
            rate_limit_retry: RetryConfig::fixed(Duration::from_millis(10), 1),
            ..FetcherConfig::default()
        },
    );

    // When: The fetch is retried
    let started = Instant::now();
    fetcher
        .fetch(HttpRequest::get("https://reddit.test/r/stocks/top.json"))
        .await
        .expect("retried into success");

    // Then: The upstream's hint wins over the configured delay
    assert!(started.elapsed() >= Duration::from_secs(1));
}

#[tokio::test]
async fn when_rate_limit_persists_system_gives_up_after_the_budget() {
    // Given: An upstream that only ever answers 429
    let upstream = ScriptedUpstream::new(vec![HttpResponse::new(429, ""); 10]);
    let fetcher = fetcher(
        upstream.clone(),
        FetcherConfig {
            rate_limit_retry: RetryConfig::fixed(Duration::from_millis(5), 2),
            ..FetcherConfig::default()
        },
    );

    // When: A fetch is made
    let error = fetcher
        .fetch(HttpRequest::get("https://reddit.test/r/stocks/top.json"))
        .await
        .expect_err("budget exhausted");

    // Then: Exactly 1 + max_retries calls were made and the kind is preserved
    assert_eq!(error.kind(), FetchErrorKind::RateLimited);
    assert_eq!(upstream.calls(), 3);
}

#[tokio::test]
async fn when_upstream_refuses_access_system_does_not_retry() {
    // Given: An upstream answering 403
    let upstream = ScriptedUpstream::new(vec![HttpResponse::new(403, "forbidden")]);
    let fetcher = fetcher(upstream.clone(), FetcherConfig::default());

    // When: A fetch is made
    let error = fetcher
        .fetch(HttpRequest::get("https://reddit.test/r/private/top.json"))
        .await
        .expect_err("forbidden");

    // Then: The error is fatal and was not retried
    assert_eq!(error.kind(), FetchErrorKind::Unauthorized);
    assert!(error.is_fatal());
    assert_eq!(upstream.calls(), 1);
}

#[tokio::test]
async fn when_fetcher_is_closed_queued_callers_are_cancelled() {
    // Given: A single-permit fetcher with one slow call on the wire
    let upstream = SlowUpstream::new(Duration::from_millis(100));
    let fetcher = fetcher(
        upstream.clone(),
        FetcherConfig {
            max_concurrent: 1,
            ..FetcherConfig::default()
        },
    );
    let running = {
        let fetcher = Arc::clone(&fetcher);
        tokio::spawn(async move { fetcher.fetch(HttpRequest::get("https://reddit.test/a")).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    let queued = {
        let fetcher = Arc::clone(&fetcher);
        tokio::spawn(async move { fetcher.fetch(HttpRequest::get("https://reddit.test/b")).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // When: The fetcher is closed
    fetcher.close();

    // Then: The call on the wire finishes, the queued one is cancelled
    assert!(running.await.expect("task").is_ok());
    let error = queued.await.expect("task").expect_err("cancelled");
    assert_eq!(error.kind(), FetchErrorKind::Cancelled);
    assert_eq!(fetcher.issued(), 1);
}

#[tokio::test]
async fn when_fetcher_is_closed_callers_waiting_on_the_quota_are_cancelled_promptly() {
    // Given: A one-call-per-5s budget that the first call has already spent
    let upstream = SlowUpstream::new(Duration::ZERO);
    let fetcher = fetcher(
        upstream.clone(),
        FetcherConfig {
            max_concurrent: 1,
            quota_limit: 1,
            quota_window: Duration::from_secs(5),
            ..FetcherConfig::default()
        },
    );
    fetcher
        .fetch(HttpRequest::get("https://reddit.test/a"))
        .await
        .expect("first call fits the budget");
    let waiting = {
        let fetcher = Arc::clone(&fetcher);
        tokio::spawn(async move { fetcher.fetch(HttpRequest::get("https://reddit.test/b")).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // When: The fetcher is closed while the second caller waits for budget
    let closed_at = Instant::now();
    fetcher.close();
    let error = waiting.await.expect("task").expect_err("cancelled");

    // Then: The waiter is cancelled at once and never reaches the upstream
    assert_eq!(error.kind(), FetchErrorKind::Cancelled);
    assert!(
        closed_at.elapsed() < Duration::from_secs(1),
        "cancellation took {:?}",
        closed_at.elapsed()
    );
    assert_eq!(fetcher.issued(), 1);
    assert_eq!(upstream.call_times().len(), 1);
}

#[tokio::test]
async fn when_quota_is_exhausted_waiting_callers_do_not_hold_a_concurrency_slot() {
    // Given: Two permits and a budget that only one more call fits in
    let upstream = SlowUpstream::new(Duration::ZERO);
    let fetcher = fetcher(
        upstream.clone(),
        FetcherConfig {
            max_concurrent: 2,
            quota_limit: 1,
            quota_window: Duration::from_secs(5),
            ..FetcherConfig::default()
        },
    );
    fetcher
        .fetch(HttpRequest::get("https://reddit.test/a"))
        .await
        .expect("first call fits the budget");

    // When: Several callers pile up behind the exhausted quota
    let mut waiting = JoinSet::new();
    for index in 0..4 {
        let fetcher = Arc::clone(&fetcher);
        waiting.spawn(async move {
            fetcher
                .fetch(HttpRequest::get(format!("https://reddit.test/{index}")))
                .await
        });
    }
    tokio::time::sleep(Duration::from_millis(30)).await;

    // Then: Nobody is on the wire and closing releases all of them
    assert_eq!(fetcher.in_flight(), 0);
    fetcher.close();
    while let Some(result) = waiting.join_next().await {
        let error = result.expect("task").expect_err("cancelled");
        assert_eq!(error.kind(), FetchErrorKind::Cancelled);
    }
    assert_eq!(fetcher.issued(), 1);
}

#[tokio::test]
async fn when_fetcher_is_closed_during_backoff_system_stops_retrying() {
    // Given: An upstream that asks for a long pause before the retry
    let upstream = ScriptedUpstream::new(vec![
        HttpResponse::new(429, "").with_header("Retry-After", "5")
    ]);
    let fetcher = fetcher(
        upstream.clone(),
        FetcherConfig {
            rate_limit_retry: RetryConfig::fixed(Duration::from_millis(10), 3),
            ..FetcherConfig::default()
        },
    );
    let backing_off = {
        let fetcher = Arc::clone(&fetcher);
        tokio::spawn(async move {
            fetcher
                .fetch(HttpRequest::get("https://reddit.test/r/stocks/top.json"))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    // When: The fetcher is closed mid-backoff
    let closed_at = Instant::now();
    fetcher.close();
    let error = backing_off.await.expect("task").expect_err("gave up");

    // Then: The last upstream error surfaces without another attempt
    assert_eq!(error.kind(), FetchErrorKind::RateLimited);
    assert!(closed_at.elapsed() < Duration::from_secs(1));
    assert_eq!(upstream.calls(), 1);
}
