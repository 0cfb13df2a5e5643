//! Rate limiting for the enrichment origin.
//!
//! All enrichment fetches share one [`RateLimiter`], independent of the
//! pipeline's concurrency cap. The limiter keeps a sliding log of
//! admission times: across any window of the configured interval, at
//! most `capacity` calls are admitted, no matter how many tasks are
//! waiting concurrently. `acquire()` never errors, it only delays.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Sliding-window rate limiter shared across tasks.
pub struct RateLimiter {
    capacity: usize,
    interval: Duration,
    admissions: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter admitting at most `capacity` calls per `interval`.
    ///
    /// A zero capacity is clamped to 1; the limiter must never deadlock.
    pub fn new(capacity: u32, interval: Duration) -> Self {
        Self {
            capacity: capacity.max(1) as usize,
            interval,
            admissions: Mutex::new(VecDeque::new()),
        }
    }

    /// Wait until a slot is free under the capacity-per-interval policy.
    ///
    /// Callers are served in best-effort order (mutex wakeup order); any
    /// single waiter's delay is bounded by `interval` per queued slot.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut log = self.admissions.lock().await;
                let now = Instant::now();
                while let Some(front) = log.front() {
                    if now.duration_since(*front) >= self.interval {
                        log.pop_front();
                    } else {
                        break;
                    }
                }
                if log.len() < self.capacity {
                    log.push_back(now);
                    return;
                }
                // Oldest admission leaves the window first
                let front = *log.front().unwrap_or(&now);
                self.interval.saturating_sub(now.duration_since(front))
            };

            debug!(wait_ms = wait.as_millis() as u64, "Rate limiter waiting");
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }
}
