//! Out-of-band challenge resolution.
//!
//! When the platform demands a verification code, the controller builds a
//! [`ChallengeRequest`] and hands it to the [`ChallengeResolver`] it was constructed
//! with. [`MailChallengeResolver`] polls a [`Mailbox`] on a fixed cadence:
//!
//! 1) Fetch the most recent unseen messages (bounded by the fetch limit).
//! 2) Mark every inspected message as seen, matched or not, so no message is
//!    ever inspected twice.
//! 3) Return the first 6-digit code found in a body that also mentions the
//!    platform marker word (case-insensitive).
//!
//! Mailbox failures are logged and polling continues; only the attempt budget, the
//! request deadline or the caller's cancellation token end the loop. Running out of
//! attempts yields [`Resolution::Expired`], a normal outcome that tells the caller to
//! fall back to manual resolution.

use crate::{
    config::EngineConfig,
    delay::sleep_or_cancel,
    mailbox::{MailMessage, Mailbox},
    remote::{BoxFuture, ChannelKind},
};
use anyhow::Result;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use ulid::Ulid;

const CODE_PATTERN: &str = r"\b(\d{6})\b";

#[derive(Clone, Debug)]
pub struct ChallengeRequest {
    pub id: Ulid,
    pub identity: String,
    pub channel: ChannelKind,
    pub deadline: Instant,
}

impl ChallengeRequest {
    #[must_use]
    pub fn new(identity: impl Into<String>, channel: ChannelKind, timeout: Duration) -> Self {
        Self {
            id: Ulid::new(),
            identity: identity.into(),
            channel,
            deadline: Instant::now() + timeout,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Resolved(String),
    Expired,
    Cancelled,
}

pub trait ChallengeResolver: Send + Sync {
    /// Consume `request`, returning a code or a terminal non-code outcome.
    fn resolve<'a>(
        &'a self,
        request: ChallengeRequest,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Resolution>;
}

/// Resolver for deployments without a secondary channel; every challenge expires.
#[derive(Clone, Debug)]
pub struct NoopChallengeResolver;

impl ChallengeResolver for NoopChallengeResolver {
    fn resolve<'a>(
        &'a self,
        request: ChallengeRequest,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Resolution> {
        Box::pin(async move {
            info!(
                challenge = %request.id,
                identity = %request.identity,
                channel = %request.channel,
                "no challenge channel configured, manual intervention needed"
            );
            Resolution::Expired
        })
    }
}

pub struct MailChallengeResolver {
    mailbox: Arc<dyn Mailbox>,
    poll_interval: Duration,
    poll_attempts: u32,
    fetch_limit: usize,
    marker: String,
}

impl MailChallengeResolver {
    #[must_use]
    pub fn new(mailbox: Arc<dyn Mailbox>, config: &EngineConfig) -> Self {
        Self {
            mailbox,
            poll_interval: config.challenge_poll_interval(),
            poll_attempts: config.challenge_poll_attempts(),
            fetch_limit: config.challenge_fetch_limit(),
            marker: config.challenge_marker().to_string(),
        }
    }

    #[instrument(skip(self, cancel), fields(challenge = %request.id, identity = %request.identity))]
    async fn poll(&self, request: ChallengeRequest, cancel: &CancellationToken) -> Resolution {
        if request.channel != ChannelKind::Email {
            warn!(channel = %request.channel, "challenge channel not supported by mail resolver");
            return Resolution::Expired;
        }

        info!(
            attempts = self.poll_attempts,
            interval_secs = self.poll_interval.as_secs(),
            "waiting for email verification code"
        );

        for attempt in 1..=self.poll_attempts {
            if cancel.is_cancelled() {
                return Resolution::Cancelled;
            }

            match self.inspect_unseen().await {
                Ok(Some(code)) => {
                    info!(attempt, "verification code found");
                    return Resolution::Resolved(code);
                }
                Ok(None) => debug!(attempt, "no verification code yet"),
                Err(err) => warn!(attempt, "email code extraction failed: {err:#}"),
            }

            if sleep_or_cancel(self.poll_interval, cancel).await.is_err() {
                return Resolution::Cancelled;
            }

            if Instant::now() >= request.deadline {
                break;
            }
        }

        info!("verification code did not arrive before the deadline");
        Resolution::Expired
    }

    async fn inspect_unseen(&self) -> Result<Option<String>> {
        let mut messages = self.mailbox.fetch_unseen(self.fetch_limit).await?;
        messages.sort_by(|a, b| b.received_order.cmp(&a.received_order));
        messages.truncate(self.fetch_limit);

        for message in messages {
            if let Err(err) = self.mailbox.mark_seen(&message.id).await {
                warn!(message = %message.id, "failed to mark message as seen: {err:#}");
            }

            if let Some(code) = self.code_in(&message) {
                return Ok(Some(code));
            }
        }

        Ok(None)
    }

    fn code_in(&self, message: &MailMessage) -> Option<String> {
        let body = message.body()?;
        extract_code(&body, &self.marker)
    }
}

impl ChallengeResolver for MailChallengeResolver {
    fn resolve<'a>(
        &'a self,
        request: ChallengeRequest,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Resolution> {
        Box::pin(self.poll(request, cancel))
    }
}

/// First standalone 6-digit token in `body`, provided `marker` also appears in it
/// (case-insensitive).
#[must_use]
pub fn extract_code(body: &str, marker: &str) -> Option<String> {
    if !body.to_lowercase().contains(&marker.to_lowercase()) {
        return None;
    }

    let regex = Regex::new(CODE_PATTERN).ok()?;
    regex
        .captures(body)
        .and_then(|captures| captures.get(1))
        .map(|code| code.as_str().to_string())
}
