//! Outbound Rate Limiter
//!
//! Spaces upstream requests at least `interval` apart. The last-grant
//! timestamp is guarded by an async mutex held across the wait, so
//! concurrent callers queue in FIFO order and never observe a stale
//! timestamp.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};

/// Default minimum spacing between upstream requests.
pub const DEFAULT_RATE_LIMIT: Duration = Duration::from_millis(1000);

/// Minimum-interval rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last_grant: Mutex<Option<Instant>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_LIMIT)
    }
}

impl RateLimiter {
    /// Create a limiter granting at most one acquisition per `interval`.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_grant: Mutex::new(None),
        }
    }

    /// Configured spacing.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until `interval` has elapsed since the previous grant, then
    /// record a new grant.
    ///
    /// Returns how long the caller was held back.
    pub async fn acquire(&self) -> Duration {
        let mut last_grant = self.last_grant.lock().await;
        let started = Instant::now();

        if let Some(previous) = *last_grant {
            let ready_at = previous + self.interval;
            if ready_at > started {
                tracing::trace!(
                    wait_ms = (ready_at - started).as_millis(),
                    "Rate limiting upstream request"
                );
                sleep_until(ready_at).await;
            }
        }

        let granted = Instant::now();
        *last_grant = Some(granted);
        granted - started
    }
}
