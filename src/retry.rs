//! Classified retries for single remote calls.
//!
//! | failure        | action                                         |
//! |----------------|------------------------------------------------|
//! | `RateLimited`  | wait `rate_limit_base_delay * attempt`, retry  |
//! | `Transient`    | wait `transient_retry_delay`, retry            |
//! | `NotFound`     | stop, report the absent result (`Ok(None)`)    |
//! | anything else  | stop, surface [`ExecuteError::Fatal`]          |
//!
//! Every attempt, retries included, first takes a permit from the [`RateGovernor`].
//! No delay follows the final attempt.

use crate::{
    config::EngineConfig,
    delay::{sleep_or_cancel, Cancelled},
    governor::RateGovernor,
    remote::CallError,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    RateLimited,
    NotFound,
    Transient,
    Fatal,
}

impl FailureKind {
    #[must_use]
    pub fn classify(err: &CallError) -> Self {
        match err {
            CallError::RateLimited(_) => Self::RateLimited,
            CallError::NotFound(_) => Self::NotFound,
            CallError::Transient(_) => Self::Transient,
            CallError::LoginRequired(_) | CallError::ChallengeRequired(_) | CallError::Fatal(_) => {
                Self::Fatal
            }
        }
    }

    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimited | Self::Transient)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    #[error("{source} (attempt {attempts})")]
    Fatal {
        attempts: u32,
        #[source]
        source: CallError,
    },
    #[error("giving up after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: CallError,
    },
    #[error("operation cancelled")]
    Cancelled,
}

impl From<Cancelled> for ExecuteError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl ExecuteError {
    /// The remote failure behind this error, if any.
    #[must_use]
    pub fn call_error(&self) -> Option<&CallError> {
        match self {
            Self::Fatal { source, .. } | Self::Exhausted { source, .. } => Some(source),
            Self::Cancelled => None,
        }
    }
}

/// State of one failed attempt, kept only until the next attempt starts.
#[derive(Clone, Debug)]
pub struct RetryAttempt {
    pub attempt_number: u32,
    pub last_error: CallError,
    pub next_delay: Duration,
}

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    max_retries: u32,
    rate_limit_base_delay: Duration,
    transient_retry_delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_retries: u32, rate_limit_base_delay: Duration, transient_retry_delay: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            rate_limit_base_delay,
            transient_retry_delay,
        }
    }

    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.max_retries(),
            config.rate_limit_base_delay(),
            config.transient_retry_delay(),
        )
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before the attempt that follows failed attempt `attempt` (1-based).
    /// Zero for kinds that are never retried.
    #[must_use]
    pub fn backoff_delay(&self, kind: FailureKind, attempt: u32) -> Duration {
        match kind {
            FailureKind::RateLimited => self.rate_limit_base_delay.saturating_mul(attempt),
            FailureKind::Transient => self.transient_retry_delay,
            FailureKind::NotFound | FailureKind::Fatal => Duration::ZERO,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RetryExecutor {
    governor: Arc<RateGovernor>,
    policy: RetryPolicy,
}

impl RetryExecutor {
    #[must_use]
    pub fn new(governor: Arc<RateGovernor>, policy: RetryPolicy) -> Self {
        Self { governor, policy }
    }

    #[must_use]
    pub fn governor(&self) -> &Arc<RateGovernor> {
        &self.governor
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, reports an absent resource, fails fatally
    /// or uses up the attempt budget.
    ///
    /// # Errors
    /// Returns `ExecuteError::Fatal` for non-retryable failures, `ExecuteError::Exhausted`
    /// once `max_retries` attempts failed, and `ExecuteError::Cancelled` if `cancel` fires
    /// while waiting on the governor or a backoff.
    pub async fn execute<T, F, Fut>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<Option<T>, ExecuteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let max_retries = self.policy.max_retries();
        let mut attempt_number = 0;

        loop {
            attempt_number += 1;

            let permit = self.governor.before_request(cancel).await?;
            let result = operation().await;
            drop(permit);

            let err = match result {
                Ok(value) => {
                    debug!(operation = label, attempt = attempt_number, "request succeeded");
                    return Ok(Some(value));
                }
                Err(err) => err,
            };

            let kind = FailureKind::classify(&err);
            match kind {
                FailureKind::NotFound => {
                    info!(operation = label, "not found error: {err}");
                    return Ok(None);
                }
                FailureKind::Fatal => {
                    error!(operation = label, attempt = attempt_number, "request failed: {err}");
                    return Err(ExecuteError::Fatal {
                        attempts: attempt_number,
                        source: err,
                    });
                }
                FailureKind::RateLimited | FailureKind::Transient => {}
            }

            if attempt_number >= max_retries {
                error!(
                    operation = label,
                    "request failed after {attempt_number} attempts: {err}"
                );
                return Err(ExecuteError::Exhausted {
                    attempts: attempt_number,
                    source: err,
                });
            }

            let attempt = RetryAttempt {
                attempt_number,
                next_delay: self.policy.backoff_delay(kind, attempt_number),
                last_error: err,
            };
            if kind == FailureKind::RateLimited {
                warn!(
                    operation = label,
                    attempt = attempt.attempt_number,
                    "rate limited, waiting {} seconds",
                    attempt.next_delay.as_secs()
                );
            } else {
                warn!(
                    operation = label,
                    attempt = attempt.attempt_number,
                    "request failed: {}, retrying in {} seconds",
                    attempt.last_error,
                    attempt.next_delay.as_secs()
                );
            }

            sleep_or_cancel(attempt.next_delay, cancel).await?;
        }
    }
}
