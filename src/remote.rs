//! The remote platform client, as seen by the engine.
//!
//! The engine never talks to the platform directly. It drives an implementation of
//! [`RemoteClient`] and reacts to the outcome kinds it reports; the client owns
//! transport, request signing and endpoint semantics.

use secrecy::SecretString;
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::pin::Pin;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Secondary channel the platform chose to deliver a verification code on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Email,
    Sms,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Email => write!(f, "email"),
            Self::Sms => write!(f, "sms"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated,
    ChallengeRequired(ChannelKind),
    Failed(String),
}

/// Failure kinds a remote call can report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    #[error("rate limited by platform: {0}")]
    RateLimited(String),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("login required: {0}")]
    LoginRequired(String),
    #[error("{0} challenge required")]
    ChallengeRequired(ChannelKind),
    #[error("fatal failure: {0}")]
    Fatal(String),
}

pub trait RemoteClient: Send + Sync {
    fn authenticate<'a>(
        &'a self,
        identity: &'a str,
        credential: &'a SecretString,
    ) -> BoxFuture<'a, AuthOutcome>;

    /// Submit the out-of-band code for the challenge raised by the last
    /// `authenticate` call or routed request.
    fn complete_challenge<'a>(&'a self, code: &'a str) -> BoxFuture<'a, AuthOutcome>;

    fn call<'a>(&'a self, endpoint: &'a str, args: &'a Value) -> BoxFuture<'a, Result<Value, CallError>>;

    fn set_session_state(&self, settings: &Map<String, Value>);

    fn session_state(&self) -> Map<String, Value>;

    /// Route subsequent requests through `proxy`. Clients without proxy support ignore it.
    fn set_proxy(&self, _proxy: &SecretString) {}
}
