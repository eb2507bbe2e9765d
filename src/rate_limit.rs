use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::RateLimitExceeded;

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone)]
pub struct RateWindow {
    pub last_request: Option<Instant>,
    pub min_interval: Duration,
}

/// Enforces a minimum spacing between outbound translation calls.
///
/// A rejected attempt leaves the window untouched, so callers can wait
/// `retry_after` and try again.
#[derive(Clone)]
pub struct RateLimiter {
    window: Arc<Mutex<RateWindow>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("window", &*self.lock())
            .finish()
    }
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self::with_clock(min_interval, Arc::new(SystemClock))
    }

    pub fn with_clock(min_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            window: Arc::new(Mutex::new(RateWindow {
                last_request: None,
                min_interval,
            })),
            clock,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.lock().min_interval
    }

    pub fn try_acquire(&self) -> Result<(), RateLimitExceeded> {
        let now = self.clock.now();
        let mut window = self.lock();
        if let Some(retry_after) = remaining(&window, now) {
            debug!(
                "translation call rejected; {:.2}s left in window",
                retry_after.as_secs_f64()
            );
            return Err(RateLimitExceeded { retry_after });
        }
        window.last_request = Some(now);
        Ok(())
    }

    /// Time left before `try_acquire` would succeed. Does not consume the window.
    pub fn ready_in(&self) -> Duration {
        let now = self.clock.now();
        remaining(&self.lock(), now).unwrap_or(Duration::ZERO)
    }

    fn lock(&self) -> MutexGuard<'_, RateWindow> {
        // the window stays consistent even if a holder panicked
        self.window
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn remaining(window: &RateWindow, now: Instant) -> Option<Duration> {
    let last = window.last_request?;
    let elapsed = now.saturating_duration_since(last);
    if elapsed < window.min_interval {
        Some(window.min_interval - elapsed)
    } else {
        None
    }
}
