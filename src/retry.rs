use std::time::Duration;

use rand::Rng;

const DEFAULT_MAX_RETRIES: usize = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);
const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(5_000);

/// Retry budget and exponential backoff schedule for transient failures.
///
/// A policy is created once per client and shared read-only by every call.
/// The delay after the failed attempt `k` (zero-based) is
/// `min(base_delay * 2^k, max_delay)`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: usize,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Scales each delay by a random factor in `[0.75, 1.25]` when enabled.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Creates a deterministic policy.
    pub fn new(max_retries: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            jitter: false,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Enables or disables randomized jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Total number of transport attempts a call may make.
    pub fn max_attempts(&self) -> usize {
        self.max_retries.saturating_add(1)
    }

    /// Deterministic backoff for the failed attempt with zero-based index `attempt`.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exp = attempt.min(31) as u32;
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }

    /// Backoff actually slept before the next attempt, jitter included.
    pub(crate) fn backoff(&self, attempt: usize) -> Duration {
        let delay = self.delay_for(attempt);
        if !self.jitter {
            return delay;
        }
        let factor = rand::thread_rng().gen_range(0.75..=1.25);
        Duration::try_from_secs_f64(delay.as_secs_f64() * factor)
            .unwrap_or(delay)
            .min(self.max_delay)
    }
}
