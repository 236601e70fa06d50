//! Session container: credential resolution and the auth state machine.
//!
//! ARCHITECTURE
//! ============
//! `Uninitialized → Resolving → {Authenticated, Unauthenticated}`. Logout and
//! invalidation signals return to `Unauthenticated`; login and registration
//! move to `Authenticated`. [`SessionManager`] is the only writer. Readers get
//! snapshots via [`SessionManager::state`] or follow changes through a
//! `tokio::sync::watch` receiver.
//!
//! CONCURRENCY
//! ===========
//! Every mutation runs inside one short synchronous critical section guarded
//! by a generation counter. Transitions the user asked for (mount, refresh,
//! login success, logout, invalidation, unmount) advance the generation. An
//! async result is applied only if the generation it captured is still
//! current, so a validation or login response that lands after a newer
//! transition is dropped.
//!
//! The session never navigates. Redirect decisions belong to the guard and
//! to the signal loop, which is what keeps several mounted guards from
//! fighting over the router.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::cache::{QueryCache, QueryKind};
use crate::config::Routes;
use crate::guard::{Navigator, Redirect, route_path};
use crate::net::api::AuthApi;
use crate::net::types::{ApiError, Credentials, User, error_detail};
use crate::signal::{AuthSignal, Invalidation, SignalReceiver};
use crate::storage::{self, CredentialStore};

// =============================================================================
// STATE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Resolving,
    Authenticated,
    Unauthenticated,
}

/// Displayable reason the session is not (or no longer) authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The server could not be reached.
    NetworkUnavailable,
    /// The stored credential was rejected, malformed, or undecodable.
    InvalidSession,
    /// The server reported the credential as expired.
    SessionExpired,
    /// A request mid-session was rejected for a bad credential.
    Unauthorized,
    /// Login was refused.
    LoginFailed(String),
    /// Registration was refused.
    RegistrationFailed(String),
    /// Local credential storage failed.
    Storage(String),
    /// A newer session transition made this result obsolete.
    Superseded,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NetworkUnavailable => f.write_str("could not reach server"),
            Self::InvalidSession => f.write_str("invalid session, please sign in again"),
            Self::SessionExpired => f.write_str("your session has expired, please sign in again"),
            Self::Unauthorized => f.write_str("you were signed out, please sign in again"),
            Self::LoginFailed(detail) => write!(f, "login failed: {detail}"),
            Self::RegistrationFailed(detail) => write!(f, "registration failed: {detail}"),
            Self::Storage(detail) => write!(f, "could not access local storage: {detail}"),
            Self::Superseded => f.write_str("request superseded by a newer session change"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub phase: Phase,
    /// `Some` iff `phase == Authenticated`.
    pub identity: Option<User>,
    pub failure: Option<FailureReason>,
}

impl SessionState {
    #[must_use]
    pub const fn uninitialized() -> Self {
        Self { phase: Phase::Uninitialized, identity: None, failure: None }
    }

    const fn resolving() -> Self {
        Self { phase: Phase::Resolving, identity: None, failure: None }
    }

    fn signed_in(user: User) -> Self {
        Self { phase: Phase::Authenticated, identity: Some(user), failure: None }
    }

    fn signed_out(failure: Option<FailureReason>) -> Self {
        Self { phase: Phase::Unauthenticated, identity: None, failure }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.phase == Phase::Authenticated
    }

    #[must_use]
    pub fn is_resolving(&self) -> bool {
        self.phase == Phase::Resolving
    }

    /// True once the session rests in `Authenticated` or `Unauthenticated`.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self.phase, Phase::Authenticated | Phase::Unauthenticated)
    }

    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.identity.as_ref()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::uninitialized()
    }
}

struct Control {
    generation: u64,
    mounted: bool,
}

// =============================================================================
// MANAGER
// =============================================================================

pub struct SessionManager {
    api: Arc<dyn AuthApi>,
    store: Arc<dyn CredentialStore>,
    cache: Arc<QueryCache>,
    routes: Routes,
    state: watch::Sender<SessionState>,
    control: Mutex<Control>,
}

impl SessionManager {
    #[must_use]
    pub fn new(
        api: Arc<dyn AuthApi>,
        store: Arc<dyn CredentialStore>,
        cache: Arc<QueryCache>,
        routes: Routes,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::uninitialized());
        Self { api, store, cache, routes, state, control: Mutex::new(Control { generation: 0, mounted: false }) }
    }

    /// Current snapshot.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Receiver that wakes on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn routes(&self) -> &Routes {
        &self.routes
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }


    // -------------------------------------------------------------------------
    // mount / resolve
    // -------------------------------------------------------------------------

    /// Enter `Resolving` synchronously. Returns the generation to resolve
    /// under, or `None` if this lifetime is already mounted.
    fn begin_mount(&self) -> Option<u64> {
        let mut control = self.lock_control();
        if control.mounted {
            return None;
        }
        control.mounted = true;
        control.generation += 1;
        self.publish(SessionState::resolving());
        Some(control.generation)
    }

    /// Resolve the stored credential once for this mount lifetime.
    pub async fn mount(&self) -> SessionState {
        if let Some(generation) = self.begin_mount() {
            self.resolve(generation).await;
        }
        self.state()
    }

    /// Like [`SessionManager::mount`], but returns as soon as the session is
    /// `Resolving` and finishes resolution on a spawned task.
    pub fn spawn_mount(self: &Arc<Self>) -> Option<JoinHandle<SessionState>> {
        let generation = self.begin_mount()?;
        let session = Arc::clone(self);
        Some(tokio::spawn(async move {
            session.resolve(generation).await;
            session.state()
        }))
    }

    /// Re-run credential resolution on demand.
    pub async fn refresh(&self) -> SessionState {
        let generation = {
            let mut control = self.lock_control();
            control.mounted = true;
            control.generation += 1;
            self.publish(SessionState::resolving());
            control.generation
        };
        self.resolve(generation).await;
        self.state()
    }

    /// Drop the mount. Results still in flight are discarded.
    pub fn unmount(&self) {
        let mut control = self.lock_control();
        control.mounted = false;
        control.generation += 1;
        self.publish(SessionState::uninitialized());
        tracing::debug!(generation = control.generation, "session unmounted");
    }

    async fn resolve(&self, generation: u64) {
        let token = match storage::read_token(self.store.as_ref()) {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %e, "credential storage unreadable");
                self.commit(generation, |_| SessionState::signed_out(Some(FailureReason::Storage(e.to_string()))));
                return;
            }
        };

        let Some(token) = token else {
            tracing::info!("no stored credential, session unauthenticated");
            self.commit(generation, |_| SessionState::signed_out(None));
            return;
        };

        if token.trim().is_empty() {
            tracing::warn!("stored credential is blank, discarding");
            self.commit(generation, |_| self.discard(FailureReason::InvalidSession));
            return;
        }

        tracing::debug!(token = %token_preview(&token), "validating stored credential");
        match self.api.validate(&token).await {
            Ok(user) => {
                let applied = self.commit(generation, |_| {
                    if let Err(e) = storage::write_cached_user(self.store.as_ref(), &user) {
                        tracing::warn!(error = %e, "failed to cache user record");
                    }
                    SessionState::signed_in(user.clone())
                });
                if applied {
                    tracing::info!(user_id = user.id, player_id = ?user.player_id, "session authenticated");
                }
            }
            Err(e) => {
                let reason = validation_failure(&e);
                let applied = self.commit(generation, |_| self.discard(reason.clone()));
                if applied {
                    tracing::warn!(code = e.error_code(), error = %e, %reason, "credential validation failed");
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // login / register / logout
    // -------------------------------------------------------------------------

    /// Exchange credentials for a token and sign in.
    ///
    /// # Errors
    ///
    /// Returns the recorded failure reason if the server refuses, cannot be
    /// reached, or the result was superseded by a newer transition. A stored
    /// credential that predates the attempt is left alone on failure.
    pub async fn login(&self, credentials: &Credentials) -> Result<User, FailureReason> {
        let generation = self.generation();

        let (token, user) = match self.authenticate(credentials).await {
            Ok(pair) => pair,
            Err(e) => {
                let reason = login_failure(&e);
                tracing::warn!(code = e.error_code(), error = %e, "login failed");
                return Err(self.record_failure(generation, reason));
            }
        };

        let mut storage_failure = None;
        let applied = self.commit_and_advance(generation, |current| {
            match storage::write_session(self.store.as_ref(), &token, &user) {
                Ok(()) => {
                    self.cache.invalidate_kind(QueryKind::PlayerData);
                    SessionState::signed_in(user.clone())
                }
                Err(e) => {
                    let reason = FailureReason::Storage(e.to_string());
                    storage_failure = Some(reason.clone());
                    let mut next = current.clone();
                    next.failure = Some(reason);
                    if next.phase == Phase::Uninitialized {
                        next.phase = Phase::Unauthenticated;
                    }
                    next
                }
            }
        });

        if !applied {
            tracing::debug!("login result superseded, discarding");
            return Err(FailureReason::Superseded);
        }
        if let Some(reason) = storage_failure {
            tracing::warn!(%reason, "could not persist new credential");
            return Err(reason);
        }
        tracing::info!(user_id = user.id, player_id = ?user.player_id, "login succeeded");
        Ok(user)
    }

    /// Create an account, then sign in with the same credentials.
    ///
    /// # Errors
    ///
    /// Returns the recorded failure reason from registration or the
    /// follow-up login.
    pub async fn register(&self, credentials: &Credentials) -> Result<User, FailureReason> {
        let generation = self.generation();
        match self.api.register(credentials).await {
            Ok(created) => {
                tracing::info!(user_id = created.id, "registration succeeded, signing in");
                self.login(credentials).await
            }
            Err(e) => {
                let reason = if e.is_transport() {
                    FailureReason::NetworkUnavailable
                } else {
                    FailureReason::RegistrationFailed(api_detail(&e))
                };
                tracing::warn!(code = e.error_code(), error = %e, "registration failed");
                Err(self.record_failure(generation, reason))
            }
        }
    }

    /// Sign out locally. Never navigates; calling it twice is harmless.
    pub fn logout(&self) {
        let mut control = self.lock_control();
        control.generation += 1;
        if let Err(e) = storage::clear_session(self.store.as_ref()) {
            tracing::warn!(error = %e, "failed to clear stored credential");
        }
        self.cache.clear();
        if self.publish(SessionState::signed_out(None)) {
            tracing::info!("logged out");
        }
    }

    // -------------------------------------------------------------------------
    // invalidation
    // -------------------------------------------------------------------------

    /// React to an out-of-band signal. Returns the login redirect to issue,
    /// or `None` when already on the login route or when the signal was
    /// raised against a credential that has since been replaced.
    pub fn handle_signal(&self, invalidation: impl Into<Invalidation>, current_path: &str) -> Option<Redirect> {
        let Invalidation { signal, credential } = invalidation.into();
        let path = route_path(current_path);
        if path == self.routes.login {
            tracing::debug!(?signal, "auth signal ignored on login route");
            return None;
        }

        let reason = match signal {
            AuthSignal::Unauthorized => FailureReason::Unauthorized,
            AuthSignal::TokenExpired => FailureReason::SessionExpired,
        };

        let mut control = self.lock_control();
        if let Some(credential) = credential {
            let stored = storage::read_token(self.store.as_ref()).ok().flatten();
            if stored.as_deref() != Some(credential.as_str()) {
                tracing::debug!(?signal, token = %token_preview(&credential), "auth signal for replaced credential, ignoring");
                return None;
            }
        }
        control.generation += 1;
        let next = self.discard(reason);
        self.publish(next);
        drop(control);

        tracing::info!(?signal, from = path, "session invalidated");
        Some(Redirect::after_signal(&self.routes, signal, path))
    }

    /// Apply signals until every sender is dropped, issuing redirects through
    /// `navigator`.
    pub async fn run_signal_loop(&self, mut signals: SignalReceiver, navigator: Arc<dyn Navigator>) {
        while let Some(invalidation) = signals.recv().await {
            if let Some(redirect) = self.handle_signal(invalidation, &navigator.current_path()) {
                navigator.push(&redirect);
            }
        }
        tracing::debug!("auth signal channel closed");
    }

    pub fn spawn_signal_loop(
        self: &Arc<Self>,
        signals: SignalReceiver,
        navigator: Arc<dyn Navigator>,
    ) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move { session.run_signal_loop(signals, navigator).await })
    }

    // -------------------------------------------------------------------------
    // internals
    // -------------------------------------------------------------------------

    async fn authenticate(&self, credentials: &Credentials) -> Result<(String, User), ApiError> {
        let response = self.api.login(credentials).await?;
        let user = match response.inline_user() {
            Some(user) => user,
            None => self.api.validate(&response.access_token).await?,
        };
        Ok((response.access_token, user))
    }

    /// Clear credential, cached user and query cache; return the signed-out state.
    fn discard(&self, reason: FailureReason) -> SessionState {
        if let Err(e) = storage::clear_session(self.store.as_ref()) {
            tracing::warn!(error = %e, "failed to clear stored credential");
        }
        self.cache.clear();
        SessionState::signed_out(Some(reason))
    }

    /// Record `reason` without changing phase (an unmounted session settles
    /// to `Unauthenticated`). Returns the reason, or `Superseded` if stale.
    fn record_failure(&self, generation: u64, reason: FailureReason) -> FailureReason {
        let applied = self.commit(generation, |current| {
            let mut next = current.clone();
            next.failure = Some(reason.clone());
            if next.phase == Phase::Uninitialized {
                next.phase = Phase::Unauthenticated;
            }
            next
        });
        if applied { reason } else { FailureReason::Superseded }
    }

    fn generation(&self) -> u64 {
        self.lock_control().generation
    }

    /// Apply `next` if `generation` is still current.
    fn commit(&self, generation: u64, next: impl FnOnce(&SessionState) -> SessionState) -> bool {
        let control = self.lock_control();
        if control.generation != generation {
            tracing::debug!(stale = generation, current = control.generation, "discarding stale session result");
            return false;
        }
        let current = self.state();
        self.publish(next(&current));
        true
    }

    /// Like [`SessionManager::commit`], and advance the generation.
    fn commit_and_advance(&self, generation: u64, next: impl FnOnce(&SessionState) -> SessionState) -> bool {
        let mut control = self.lock_control();
        if control.generation != generation {
            return false;
        }
        control.generation += 1;
        let current = self.state();
        self.publish(next(&current));
        true
    }

    /// Replace the state, waking watchers only if it changed.
    fn publish(&self, next: SessionState) -> bool {
        self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        })
    }

    fn lock_control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn validation_failure(error: &ApiError) -> FailureReason {
    match error {
        ApiError::Transport(_) => FailureReason::NetworkUnavailable,
        ApiError::Unauthorized { expired: true, .. } => FailureReason::SessionExpired,
        _ => FailureReason::InvalidSession,
    }
}

fn login_failure(error: &ApiError) -> FailureReason {
    match error {
        ApiError::Transport(_) => FailureReason::NetworkUnavailable,
        ApiError::Unauthorized { .. } => FailureReason::LoginFailed("incorrect email or password".into()),
        other => FailureReason::LoginFailed(api_detail(other)),
    }
}

fn api_detail(error: &ApiError) -> String {
    match error {
        ApiError::Status { body, .. } => error_detail(body).unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}

/// First few characters of a credential, for logs.
fn token_preview(token: &str) -> String {
    let head: String = token.chars().take(6).collect();
    format!("{head}…")
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
