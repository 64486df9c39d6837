//! Request pacing and retry for market-data providers.
//!
//! Yahoo and Tiingo throttle by request count over a rolling period. Fetches
//! go through a [`RateLimiter`] that spaces them out before the provider has
//! to answer 429, and through [`with_retry`] when it answers 429 anyway.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::provider::ProviderError;

/// Yahoo tolerates roughly one chart request per second.
const DEFAULT_REQUESTS_PER_MINUTE: u64 = 60;

const MINUTE: Duration = Duration::from_secs(60);

/// Upper bound on the send-time buffer allocated up front. Larger budgets
/// grow the buffer on demand.
const PREALLOCATED_SLOTS: u64 = 1024;

/// Send times of the requests still inside the rolling period.
struct Window {
    sent: VecDeque<Instant>,
    span: Duration,
}

impl Window {
    fn expire(&mut self, now: Instant) {
        while self
            .sent
            .front()
            .is_some_and(|&t| now.duration_since(t) >= self.span)
        {
            self.sent.pop_front();
        }
    }

    /// How long until the oldest request leaves the period.
    fn until_free(&self, now: Instant) -> Duration {
        self.sent
            .front()
            .map_or(Duration::ZERO, |&oldest| (oldest + self.span).duration_since(now))
    }
}

/// Allows at most `budget` requests in any rolling `span`.
pub struct RateLimiter {
    window: Mutex<Window>,
    budget: u64,
    tracker: RequestTracker,
}

impl RateLimiter {
    /// A budget of zero is treated as one.
    pub fn new(budget: u64, span: Duration) -> Self {
        let budget = budget.max(1);
        Self {
            window: Mutex::new(Window {
                sent: VecDeque::with_capacity(budget.min(PREALLOCATED_SLOTS) as usize),
                span,
            }),
            budget,
            tracker: RequestTracker::default(),
        }
    }

    pub fn per_minute(per_minute: u64) -> Self {
        Self::new(per_minute, MINUTE)
    }

    /// Claim a request slot, sleeping while the period is full. The lock is
    /// released before sleeping so other tickers can still check in.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let now = Instant::now();
                let mut window = self.window.lock().await;
                window.expire(now);
                if (window.sent.len() as u64) < self.budget {
                    window.sent.push_back(now);
                    return;
                }
                window.until_free(now)
            };
            tracing::debug!("Request budget spent, pausing {:.1}s", wait.as_secs_f64());
            sleep(wait).await;
        }
    }

    /// Slots left in the current period, or `None` while another task holds the lock.
    pub fn remaining_budget(&self) -> Option<u64> {
        let mut window = self.window.try_lock().ok()?;
        window.expire(Instant::now());
        Some(self.budget.saturating_sub(window.sent.len() as u64))
    }

    pub fn tracker(&self) -> &RequestTracker {
        &self.tracker
    }

    pub fn max_requests(&self) -> u64 {
        self.budget
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::per_minute(DEFAULT_REQUESTS_PER_MINUTE)
    }
}

/// Outcome counters for provider requests made during a pass.
#[derive(Default)]
pub struct RequestTracker {
    succeeded: AtomicU64,
    rate_limited: AtomicU64,
    failed: AtomicU64,
    backoff_ms: AtomicU64,
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

impl RequestTracker {
    pub fn record_success(&self) {
        bump(&self.succeeded, 1);
    }

    pub fn record_rate_limited(&self) {
        bump(&self.rate_limited, 1);
    }

    pub fn record_failure(&self) {
        bump(&self.failed, 1);
    }

    pub fn record_backoff(&self, duration: Duration) {
        bump(&self.backoff_ms, duration.as_millis() as u64);
    }

    pub fn summary(&self) -> TrackerSummary {
        let succeeded = self.succeeded.load(Ordering::Relaxed);
        let rate_limited = self.rate_limited.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        TrackerSummary {
            requests_made: succeeded + rate_limited + failed,
            requests_succeeded: succeeded,
            requests_rate_limited: rate_limited,
            requests_failed: failed,
            total_backoff_secs: self.backoff_ms.load(Ordering::Relaxed) as f64 / 1000.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct TrackerSummary {
    pub requests_made: u64,
    pub requests_succeeded: u64,
    pub requests_rate_limited: u64,
    pub requests_failed: u64,
    pub total_backoff_secs: f64,
}

/// Backoff schedule for [`with_retry`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Upper bound of the random delay added to each backoff.
    pub max_jitter: Duration,
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (0-based): `base * 2^attempt`, capped.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let multiplier = 1u32 << attempt.min(16);
        self.base_backoff
            .saturating_mul(multiplier)
            .min(self.max_backoff)
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
            max_jitter: Duration::from_millis(1000),
        }
    }
}

/// Execute an async operation with rate limiting and exponential backoff.
///
/// - Calls `rate_limiter.acquire()` before each attempt.
/// - On a retryable error (rate limit, network, 5xx): waits
///   `policy.backoff_for(attempt)` plus jitter, then retries up to
///   `policy.max_retries` times.
/// - Any other error is returned immediately.
/// - Records all outcomes on the tracker.
pub async fn with_retry<F, Fut, T>(
    rate_limiter: &RateLimiter,
    policy: &RetryPolicy,
    label: &str,
    operation: F,
) -> Result<T, ProviderError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let tracker = rate_limiter.tracker();
    let mut attempt = 0u32;

    loop {
        rate_limiter.acquire().await;

        let err = match operation().await {
            Ok(val) => {
                tracker.record_success();
                return Ok(val);
            }
            Err(err) => err,
        };

        if err.is_rate_limited() {
            tracker.record_rate_limited();
        } else {
            tracker.record_failure();
        }

        if !err.is_retryable() || attempt >= policy.max_retries {
            return Err(err);
        }

        let wait = policy.backoff_for(attempt) + policy.jitter();
        tracing::warn!(
            "{} failed (attempt {}/{}): {}; retrying in {:.1}s",
            label,
            attempt + 1,
            policy.max_retries + 1,
            err,
            wait.as_secs_f64()
        );
        tracker.record_backoff(wait);
        sleep(wait).await;
        attempt += 1;
    }
}
