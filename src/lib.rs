//! # Holdfast (Resilient Remote Sessions)
//!
//! `holdfast` wraps an authenticated remote-API client with the machinery needed to
//! keep it working unattended: durable sessions, request pacing, classified retries
//! and out-of-band challenge resolution.
//!
//! ## Components
//!
//! - [`session::SessionStore`] persists the client's settings blob as JSON and
//!   replaces it atomically.
//! - [`governor::RateGovernor`] enforces a minimum spacing between requests and a
//!   request ceiling per fixed window.
//! - [`retry::RetryExecutor`] classifies failures (rate limited, not found,
//!   transient, fatal) and backs off accordingly.
//! - [`challenge::MailChallengeResolver`] polls a mailbox for a 6-digit code when
//!   the platform demands verification.
//! - [`controller::SessionController`] ties them together: restore, probe, log in,
//!   resolve challenges, persist.
//!
//! ## Collaborators
//!
//! The platform client and the mail transport are supplied by the caller through
//! the [`remote::RemoteClient`] and [`mailbox::Mailbox`] traits. Every wait in the
//! engine is cooperative and observes a caller-supplied
//! [`tokio_util::sync::CancellationToken`].

pub mod challenge;
pub mod cli;
pub mod config;
pub mod controller;
pub mod delay;
pub mod governor;
pub mod mailbox;
pub mod remote;
pub mod retry;
pub mod session;

pub use challenge::{ChallengeRequest, ChallengeResolver, MailChallengeResolver, Resolution};
pub use config::EngineConfig;
pub use controller::{LoginError, SessionController, SessionState};
pub use remote::{AuthOutcome, CallError, ChannelKind, RemoteClient};
pub use retry::ExecuteError;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
