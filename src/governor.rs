//! Request pacing for one identity.
//!
//! Flow Overview:
//! 1) Callers queue on the budget lock; grants are strictly serial and FIFO.
//! 2) If the current window already holds `ceiling` requests, sleep out the rest
//!    of the window, then start a fresh window with a zero count.
//! 3) Wait until `min_spacing` (plus optional random jitter) has passed since the
//!    previous request completed.
//! 4) Count the request and hand out a [`RatePermit`]. The request runs while the
//!    permit is held; dropping it records the completion time.
//!
//! Windows are fixed, not sliding: unused budget never carries over.

use crate::{
    config::EngineConfig,
    delay::{sleep_or_cancel, Cancelled},
};
use rand::Rng;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestBudget {
    pub request_count: u32,
    pub window_start: Instant,
    pub last_request: Option<Instant>,
}

#[derive(Debug)]
pub struct RateGovernor {
    budget: Mutex<RequestBudget>,
    min_spacing: Duration,
    jitter: Duration,
    window: Duration,
    ceiling: u32,
}

/// Proof that the holder may issue one request. Other callers stay queued until it drops.
#[derive(Debug)]
pub struct RatePermit<'a> {
    budget: MutexGuard<'a, RequestBudget>,
}

impl Drop for RatePermit<'_> {
    fn drop(&mut self) {
        self.budget.last_request = Some(Instant::now());
    }
}

impl RateGovernor {
    #[must_use]
    pub fn new(min_spacing: Duration, window: Duration, ceiling: u32) -> Self {
        Self {
            budget: Mutex::new(RequestBudget {
                request_count: 0,
                window_start: Instant::now(),
                last_request: None,
            }),
            min_spacing,
            jitter: Duration::ZERO,
            window,
            ceiling: ceiling.max(1),
        }
    }

    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.min_request_spacing(),
            config.window_duration(),
            config.window_request_ceiling(),
        )
        .with_jitter(config.request_jitter())
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Wait until both the spacing and the window budget allow another request.
    ///
    /// # Errors
    /// Returns [`Cancelled`] if `cancel` fires while queued or waiting.
    pub async fn before_request(&self, cancel: &CancellationToken) -> Result<RatePermit<'_>, Cancelled> {
        let mut budget = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Cancelled),
            guard = self.budget.lock() => guard,
        };

        let elapsed = budget.window_start.elapsed();
        if elapsed >= self.window {
            budget.request_count = 0;
            budget.window_start = Instant::now();
        } else if budget.request_count >= self.ceiling {
            let remaining = self.window - elapsed;
            info!(
                ceiling = self.ceiling,
                "request limit reached, sleeping for {} seconds",
                remaining.as_secs()
            );
            sleep_or_cancel(remaining, cancel).await?;
            budget.request_count = 0;
            budget.window_start = Instant::now();
        }

        let wait = match budget.last_request {
            Some(last) => self.min_spacing.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        } + self.jitter_delay();
        if !wait.is_zero() {
            debug!(wait_ms = wait.as_millis(), "pacing request");
            sleep_or_cancel(wait, cancel).await?;
        }

        budget.request_count += 1;
        budget.last_request = Some(Instant::now());

        Ok(RatePermit { budget })
    }

    /// Snapshot of the current counters. Waits behind any permit in flight.
    pub async fn budget(&self) -> RequestBudget {
        *self.budget.lock().await
    }

    fn jitter_delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return Duration::ZERO;
        }
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}
