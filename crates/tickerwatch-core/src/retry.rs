//! Retry policies for upstream fetches.
//!
//! Rate-limit signals back off exponentially with jitter; transient network
//! failures use a shorter fixed delay. Both are bounded.

use std::time::Duration;

/// Backoff strategy between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed {
        delay: Duration,
    },
    /// `base * factor^attempt`, capped at `max`.
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        /// Adds a random 0-50% on top of the computed delay. Never shortens it.
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_secs(1),
            factor: 2.0,
            max: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let seconds = base.as_secs_f64() * factor.powi(exponent);
                let capped = if seconds.is_finite() {
                    seconds.min(max.as_secs_f64())
                } else {
                    max.as_secs_f64()
                };
                let delay = Duration::from_secs_f64(capped.max(0.0));

                if jitter {
                    let extra_ms = (delay.as_millis() as u64) / 2;
                    delay + Duration::from_millis(fastrand::u64(0..=extra_ms))
                } else {
                    delay
                }
            }
        }
    }

    /// Lower bound of [`Backoff::delay`] for `attempt`, ignoring jitter.
    pub fn min_delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base, factor, max, ..
            } => Self::Exponential {
                base,
                factor,
                max,
                jitter: false,
            }
            .delay(attempt),
        }
    }
}

/// Bounded retry budget for one class of failure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl RetryConfig {
    /// Defaults for upstream rate-limit signals: 3 retries, 1s base doubling, jittered.
    pub fn rate_limit() -> Self {
        Self {
            max_retries: 3,
            backoff: Backoff::default(),
        }
    }

    /// Defaults for timeouts and connection resets: 2 retries, 250ms apart.
    pub fn transient() -> Self {
        Self::fixed(Duration::from_millis(250), 2)
    }

    pub fn exponential(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::default(),
        }
    }

    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Fixed { delay },
        }
    }

    pub fn no_retry() -> Self {
        Self::fixed(Duration::ZERO, 0)
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }

    /// Delay for `attempt`, stretched to at least the upstream's `Retry-After` hint.
    pub fn delay_with_hint(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        match hint {
            Some(hint) if hint > delay => hint,
            _ => delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_backoff() {
        let backoff = Backoff::Fixed {
            delay: Duration::from_millis(100),
        };

        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(10), Duration::from_millis(100));
    }

    #[test]
    fn test_exponential_backoff() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            factor: 2.0,
            max: Duration::from_secs(1),
            jitter: false,
        };

        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
        assert_eq!(backoff.delay(3), Duration::from_millis(800));
        assert_eq!(backoff.delay(4), Duration::from_secs(1)); // capped
    }

    #[test]
    fn test_jitter_never_shortens_delay() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            factor: 2.0,
            max: Duration::from_secs(1),
            jitter: true,
        };

        for _ in 0..20 {
            for attempt in 0..5 {
                let delay = backoff.delay(attempt);
                let floor = backoff.min_delay(attempt);
                assert!(delay >= floor, "attempt={attempt}, delay={delay:?}");
                assert!(delay <= floor + floor / 2 + Duration::from_millis(1));
            }
        }
    }

    #[test]
    fn test_huge_attempt_stays_capped() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            factor: 2.0,
            max: Duration::from_secs(1),
            jitter: false,
        };

        assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn test_retry_after_hint_extends_delay() {
        let config = RetryConfig::fixed(Duration::from_millis(100), 1);

        assert_eq!(
            config.delay_with_hint(0, Some(Duration::from_secs(2))),
            Duration::from_secs(2)
        );
        assert_eq!(
            config.delay_with_hint(0, Some(Duration::from_millis(10))),
            Duration::from_millis(100)
        );
        assert_eq!(config.delay_with_hint(0, None), Duration::from_millis(100));
    }

    #[test]
    fn test_default_policies() {
        let rate = RetryConfig::rate_limit();
        assert_eq!(rate.max_retries, 3);
        assert!(matches!(rate.backoff, Backoff::Exponential { jitter: true, .. }));

        let transient = RetryConfig::transient();
        assert_eq!(transient.max_retries, 2);
        assert!(transient.delay_for_attempt(0) < rate.backoff.min_delay(0));
    }

    #[test]
    fn test_retry_config_no_retry() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.max_retries, 0);
    }
}
