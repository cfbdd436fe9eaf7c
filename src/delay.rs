//! Cooperative, cancellable delays.

use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// The caller's cancellation token fired before the operation finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Suspend the calling task for `duration`, returning early with [`Cancelled`]
/// once `cancel` fires. A zero duration still observes a token that already fired.
///
/// # Errors
/// Returns [`Cancelled`] if the token is or becomes cancelled before the delay ends.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> Result<(), Cancelled> {
    if cancel.is_cancelled() {
        return Err(Cancelled);
    }
    if duration.is_zero() {
        return Ok(());
    }

    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Cancelled),
        () = sleep(duration) => Ok(()),
    }
}
