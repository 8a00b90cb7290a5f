use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

/// Rolling call budget: at most `limit` acquisitions in any window of length `window`.
///
/// Kept as a log of issue instants rather than a token bucket, so the bound holds
/// for every window and not only on average.
#[derive(Debug, Clone)]
pub struct QuotaWindow {
    limit: usize,
    window: Duration,
    issued: Arc<Mutex<VecDeque<Instant>>>,
}

impl QuotaWindow {
    pub fn new(limit: u32, window: Duration) -> Self {
        let limit = limit.max(1) as usize;
        Self {
            limit,
            window,
            issued: Arc::new(Mutex::new(VecDeque::with_capacity(limit))),
        }
    }

    pub const fn limit(&self) -> usize {
        self.limit
    }

    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Takes one unit of budget if available, otherwise returns how long until
    /// the oldest call in the window expires.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let mut issued = self
            .issued
            .lock()
            .expect("quota ledger should not be poisoned");

        while let Some(oldest) = issued.front() {
            if now.duration_since(*oldest) >= self.window {
                issued.pop_front();
            } else {
                break;
            }
        }

        if issued.len() < self.limit {
            issued.push_back(now);
            return Ok(());
        }

        let oldest = issued.front().copied().unwrap_or(now);
        Err(self.window.saturating_sub(now.duration_since(oldest)))
    }

    /// Calls recorded in the current window.
    pub fn used(&self) -> usize {
        let now = Instant::now();
        self.issued
            .lock()
            .expect("quota ledger should not be poisoned")
            .iter()
            .filter(|at| now.duration_since(**at) < self.window)
            .count()
    }
}
