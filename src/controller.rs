//! Session lifecycle for one identity.
//!
//! ```text
//! Unauthenticated -> SessionLoaded -> Authenticated
//!        ^               |                 |
//!        +--- probe -----+                 v
//!        +------ expired ----------- AwaitingChallenge
//! ```
//!
//! [`SessionController::ensure_authenticated`] restores the stored session and probes
//! it with a cheap authenticated call. A probe that fails falls through to a fresh
//! login; a login that raises a challenge is handed to the injected
//! [`ChallengeResolver`]. Every successful login is persisted; a failed persist is
//! logged and does not downgrade the state.
//!
//! Each successful login or re-verification bumps a generation counter. A call that
//! hits a challenge remembers the generation it started under, so when several
//! concurrent calls trip over the same challenge only the first one resolves it and
//! the rest simply run again on the refreshed session.
//!
//! All remote requests, including the probe, login and challenge completion, pass
//! through the controller's single [`RateGovernor`]. Controllers share nothing, so
//! controllers for different identities run independently.

use crate::{
    challenge::{ChallengeRequest, ChallengeResolver, Resolution},
    config::{redact_proxy, EngineConfig},
    delay::Cancelled,
    governor::RateGovernor,
    remote::{AuthOutcome, CallError, ChannelKind, RemoteClient},
    retry::{ExecuteError, RetryExecutor, RetryPolicy},
    session::{Session, SessionStore, StorageError},
};
use secrecy::SecretString;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    SessionLoaded,
    Authenticated,
    AwaitingChallenge,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unauthenticated => "unauthenticated",
            Self::SessionLoaded => "session_loaded",
            Self::Authenticated => "authenticated",
            Self::AwaitingChallenge => "awaiting_challenge",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoginError {
    #[error("challenge unresolved, manual intervention needed")]
    ChallengeUnresolved,
    #[error("login rejected: {0}")]
    Rejected(String),
    #[error("login cancelled")]
    Cancelled,
}

impl From<Cancelled> for LoginError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

pub struct SessionController {
    identity: String,
    credential: SecretString,
    client: Arc<dyn RemoteClient>,
    resolver: Arc<dyn ChallengeResolver>,
    store: SessionStore,
    executor: RetryExecutor,
    probe_endpoint: String,
    challenge_timeout: Duration,
    state: Mutex<SessionState>,
    generation: AtomicU64,
    login: tokio::sync::Mutex<()>,
}

impl SessionController {
    #[must_use]
    pub fn new(
        identity: impl Into<String>,
        credential: SecretString,
        client: Arc<dyn RemoteClient>,
        resolver: Arc<dyn ChallengeResolver>,
        config: &EngineConfig,
    ) -> Self {
        let config = config.clone().normalize();
        let governor = Arc::new(RateGovernor::from_config(&config));

        if let Some(proxy) = config.proxy() {
            client.set_proxy(proxy);
            info!(proxy = %redact_proxy(proxy), "proxy configured");
        }

        Self {
            identity: identity.into(),
            credential,
            client,
            resolver,
            store: SessionStore::new(config.session_file_path()),
            executor: RetryExecutor::new(governor, RetryPolicy::from_config(&config)),
            probe_endpoint: config.probe_endpoint().to_string(),
            challenge_timeout: config.challenge_deadline(),
            state: Mutex::new(SessionState::Unauthenticated),
            generation: AtomicU64::new(0),
            login: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    #[must_use]
    pub fn governor(&self) -> &Arc<RateGovernor> {
        self.executor.governor()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reach `Authenticated`, reusing the stored session when it still works.
    ///
    /// # Errors
    /// Returns `LoginError::ChallengeUnresolved` if a required challenge expired,
    /// `LoginError::Rejected` if the platform refused the credential, and
    /// `LoginError::Cancelled` if `cancel` fired first.
    #[instrument(skip(self, cancel), fields(identity = %self.identity))]
    pub async fn ensure_authenticated(&self, cancel: &CancellationToken) -> Result<(), LoginError> {
        let _login = self.login.lock().await;

        if self.state() == SessionState::Authenticated {
            return Ok(());
        }

        match self.store.load(&self.identity).await {
            Ok(session) => {
                self.client.set_session_state(session.settings());
                self.transition(SessionState::SessionLoaded);
                info!("session loaded successfully");

                match self.probe(cancel).await {
                    Ok(Some(_)) => {
                        self.transition(SessionState::Authenticated);
                        info!("using existing session");
                        return Ok(());
                    }
                    Ok(None) => {
                        self.transition(SessionState::Unauthenticated);
                        info!("probe target not found, creating new session");
                    }
                    Err(ExecuteError::Cancelled) => {
                        self.transition(SessionState::Unauthenticated);
                        return Err(LoginError::Cancelled);
                    }
                    Err(err) => {
                        self.transition(SessionState::Unauthenticated);
                        info!("session expired, creating new session: {err}");
                    }
                }
            }
            Err(StorageError::NotFound(_)) => debug!("no stored session"),
            Err(err) => warn!("failed to load session: {err}"),
        }

        let result = self.login_fresh(cancel).await;
        if result.is_err() {
            self.transition(SessionState::Unauthenticated);
        }
        result
    }

    /// Issue a remote call through the retry executor and rate governor.
    ///
    /// `Ok(None)` means the target does not exist. A `LoginRequired` failure
    /// invalidates the session so the next `ensure_authenticated` logs in again; a
    /// `ChallengeRequired` failure triggers re-verification and, once it succeeds,
    /// one more run of the call.
    ///
    /// # Errors
    /// Returns the executor's error when the call fails fatally, runs out of attempts
    /// or is cancelled. Failures never leave the controller unusable.
    #[instrument(skip(self, args, cancel), fields(identity = %self.identity))]
    pub async fn call(
        &self,
        endpoint: &str,
        args: &Value,
        cancel: &CancellationToken,
    ) -> Result<Option<Value>, ExecuteError> {
        let generation = self.generation();
        let result = self.execute(endpoint, args, cancel).await;

        let challenge = match &result {
            Err(ExecuteError::Fatal {
                source: CallError::LoginRequired(reason),
                ..
            }) => {
                warn!("login required during {endpoint}: {reason}");
                self.invalidate();
                None
            }
            Err(ExecuteError::Fatal {
                source: CallError::ChallengeRequired(kind),
                ..
            }) => Some(*kind),
            _ => None,
        };

        match challenge {
            Some(kind) => match self.reverify_after(kind, generation, cancel).await {
                Ok(()) => self.execute(endpoint, args, cancel).await,
                Err(err) => {
                    error!("re-verification failed: {err}");
                    result
                }
            },
            None => result,
        }
    }

    /// Answer a challenge raised in the middle of an authenticated session.
    ///
    /// # Errors
    /// Same as [`Self::ensure_authenticated`]; on error the session is invalidated.
    #[instrument(skip(self, cancel), fields(identity = %self.identity))]
    pub async fn reverify(&self, kind: ChannelKind, cancel: &CancellationToken) -> Result<(), LoginError> {
        let _login = self.login.lock().await;
        self.reverify_locked(kind, cancel).await
    }

    /// Number of successful logins and re-verifications so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Re-verify unless a login completed after `observed` was read.
    async fn reverify_after(
        &self,
        kind: ChannelKind,
        observed: u64,
        cancel: &CancellationToken,
    ) -> Result<(), LoginError> {
        let _login = self.login.lock().await;

        if self.generation() != observed && self.state() == SessionState::Authenticated {
            debug!(channel = %kind, "challenge already answered by a concurrent call");
            return Ok(());
        }

        self.reverify_locked(kind, cancel).await
    }

    async fn reverify_locked(&self, kind: ChannelKind, cancel: &CancellationToken) -> Result<(), LoginError> {
        info!(channel = %kind, "re-verification required");

        let result = match self.resolve_challenge(kind, cancel).await {
            Ok(outcome) => self.finish_login(outcome).await,
            Err(err) => Err(err),
        };
        if result.is_err() {
            self.invalidate();
        }
        result
    }

    /// Forget the current session, in memory and on disk.
    pub fn invalidate(&self) {
        self.transition(SessionState::Unauthenticated);
        if let Err(err) = self.store.clear() {
            error!("failed to remove session: {err}");
        }
        info!("session invalidated");
    }

    async fn probe(&self, cancel: &CancellationToken) -> Result<Option<Value>, ExecuteError> {
        let args = Value::Null;
        self.execute(&self.probe_endpoint, &args, cancel).await
    }

    async fn execute(
        &self,
        endpoint: &str,
        args: &Value,
        cancel: &CancellationToken,
    ) -> Result<Option<Value>, ExecuteError> {
        self.executor
            .execute(endpoint, cancel, || self.client.call(endpoint, args))
            .await
    }

    async fn login_fresh(&self, cancel: &CancellationToken) -> Result<(), LoginError> {
        info!("logging in as {}", self.identity);

        let outcome = {
            let _permit = self.governor().before_request(cancel).await?;
            self.client
                .authenticate(&self.identity, &self.credential)
                .await
        };

        let outcome = match outcome {
            AuthOutcome::ChallengeRequired(kind) => self.resolve_challenge(kind, cancel).await?,
            outcome => outcome,
        };

        self.finish_login(outcome).await
    }

    async fn resolve_challenge(
        &self,
        kind: ChannelKind,
        cancel: &CancellationToken,
    ) -> Result<AuthOutcome, LoginError> {
        self.transition(SessionState::AwaitingChallenge);

        let request = ChallengeRequest::new(&self.identity, kind, self.challenge_timeout);
        info!(challenge = %request.id, channel = %kind, "challenge required");

        match self.resolver.resolve(request, cancel).await {
            Resolution::Resolved(code) => {
                let _permit = self.governor().before_request(cancel).await?;
                Ok(self.client.complete_challenge(&code).await)
            }
            Resolution::Expired => {
                error!("challenge required - manual intervention needed");
                Err(LoginError::ChallengeUnresolved)
            }
            Resolution::Cancelled => Err(LoginError::Cancelled),
        }
    }

    async fn finish_login(&self, outcome: AuthOutcome) -> Result<(), LoginError> {
        match outcome {
            AuthOutcome::Authenticated => {
                self.persist().await;
                self.transition(SessionState::Authenticated);
                self.generation.fetch_add(1, Ordering::SeqCst);
                info!("logged in");
                Ok(())
            }
            AuthOutcome::ChallengeRequired(kind) => {
                error!(channel = %kind, "platform raised another challenge after completion");
                Err(LoginError::ChallengeUnresolved)
            }
            AuthOutcome::Failed(reason) => {
                error!("login failed: {reason}");
                Err(LoginError::Rejected(reason))
            }
        }
    }

    async fn persist(&self) {
        let session = Session::new(self.identity.as_str(), self.client.session_state());
        match self.store.save(session).await {
            Ok(()) => info!("session saved successfully"),
            Err(err) => error!("failed to save session: {err}"),
        }
    }

    fn transition(&self, next: SessionState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = *state;
        if previous != next {
            debug!(from = %previous, to = %next, "session state change");
            *state = next;
        }
    }
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("identity", &self.identity)
            .field("credential", &"***")
            .field("store", &self.store)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
