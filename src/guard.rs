//! Route guard: gate protected screens on the resolved session.
//!
//! DESIGN
//! ======
//! [`guard`] is a plain decorator: given a session snapshot, the current
//! path and a render callback, it answers `Loading`, `Redirect` or `Render`.
//! It never caches; callers re-run it whenever the session changes.
//! [`Guard`] binds it to a live [`SessionManager`] and a [`Navigator`] so
//! redirects are actually issued.
//!
//! `Uninitialized` and `Resolving` both map to `Loading`. A guard that
//! redirected before validation finished would bounce a signed-in user to
//! the login screen on every reload.

use std::fmt;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::Routes;
use crate::net::types::{PlayerId, User};
use crate::session::{Phase, SessionManager, SessionState};
use crate::signal::AuthSignal;

// =============================================================================
// REDIRECT
// =============================================================================

/// Navigation target: a route plus query hints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl Redirect {
    #[must_use]
    pub fn to(path: impl Into<String>) -> Self {
        Self { path: path.into(), query: Vec::new() }
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Login redirect issued by the guard for an unauthenticated visitor.
    #[must_use]
    pub fn to_login(routes: &Routes, from: &str) -> Self {
        Self::to(&routes.login).with("redirected", "true").with("from", from)
    }

    /// Login redirect issued after an invalidation signal.
    #[must_use]
    pub fn after_signal(routes: &Routes, signal: AuthSignal, from: &str) -> Self {
        Self::to(&routes.login)
            .with("redirected", "true")
            .with("reason", signal.reason())
            .with("from", from)
    }

    #[must_use]
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Path with the form-encoded query appended.
    #[must_use]
    pub fn url(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query.iter())
            .finish();
        format!("{}?{query}", self.path)
    }
}

impl fmt::Display for Redirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

/// Path component of a location, without its query string.
#[must_use]
pub fn route_path(location: &str) -> &str {
    location.split_once('?').map_or(location, |(path, _)| path)
}

// =============================================================================
// NAVIGATOR
// =============================================================================

/// External router. This crate requests navigation; it never owns routing.
pub trait Navigator: Send + Sync {
    /// Current location, optionally with a query string.
    fn current_path(&self) -> String;

    /// Navigate, adding a history entry.
    fn push(&self, target: &Redirect);

    /// Navigate, replacing the current history entry.
    fn replace(&self, target: &Redirect);
}

/// Navigator that only records where it was sent.
#[derive(Debug)]
pub struct MemoryNavigator {
    history: Mutex<Vec<String>>,
}

impl MemoryNavigator {
    #[must_use]
    pub fn new(start: &str) -> Self {
        Self { history: Mutex::new(vec![start.to_owned()]) }
    }

    /// Every location visited, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Simulate the user following a link.
    pub fn visit(&self, location: &str) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(location.to_owned());
    }
}

impl Navigator for MemoryNavigator {
    fn current_path(&self) -> String {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
            .unwrap_or_else(|| "/".to_owned())
    }

    fn push(&self, target: &Redirect) {
        self.visit(&target.url());
    }

    fn replace(&self, target: &Redirect) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.pop();
        history.push(target.url());
    }
}

// =============================================================================
// GUARD
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome<T> {
    /// Session still resolving; show the placeholder, do not redirect.
    Loading,
    Redirect(Redirect),
    Render(T),
}

impl<T> GuardOutcome<T> {
    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    #[must_use]
    pub fn redirect(&self) -> Option<&Redirect> {
        match self {
            Self::Redirect(r) => Some(r),
            _ => None,
        }
    }

    #[must_use]
    pub fn rendered(self) -> Option<T> {
        match self {
            Self::Render(v) => Some(v),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> GuardOutcome<U> {
        match self {
            Self::Loading => GuardOutcome::Loading,
            Self::Redirect(r) => GuardOutcome::Redirect(r),
            Self::Render(v) => GuardOutcome::Render(f(v)),
        }
    }

    /// Layer a narrower check on top of a passed guard.
    pub fn and_then<U>(self, f: impl FnOnce(T) -> GuardOutcome<U>) -> GuardOutcome<U> {
        match self {
            Self::Loading => GuardOutcome::Loading,
            Self::Redirect(r) => GuardOutcome::Redirect(r),
            Self::Render(v) => f(v),
        }
    }
}

/// Check the session, then delegate to `next` with the signed-in user.
pub fn guard<T>(
    state: &SessionState,
    current_path: &str,
    routes: &Routes,
    next: impl FnOnce(&User) -> T,
) -> GuardOutcome<T> {
    match (state.phase, state.user()) {
        (Phase::Authenticated, Some(user)) => GuardOutcome::Render(next(user)),
        (Phase::Uninitialized | Phase::Resolving, _) => GuardOutcome::Loading,
        _ => GuardOutcome::Redirect(Redirect::to_login(routes, route_path(current_path))),
    }
}

/// Screens that need a linked player send users without one to setup.
pub fn require_player<T>(user: &User, routes: &Routes, next: impl FnOnce(&User, PlayerId) -> T) -> GuardOutcome<T> {
    match user.player_id {
        Some(player_id) => GuardOutcome::Render(next(user, player_id)),
        None => GuardOutcome::Redirect(Redirect::to(&routes.setup)),
    }
}

/// [`guard`] followed by [`require_player`].
pub fn guard_player<T>(
    state: &SessionState,
    current_path: &str,
    routes: &Routes,
    next: impl FnOnce(&User, PlayerId) -> T,
) -> GuardOutcome<T> {
    guard(state, current_path, routes, User::clone).and_then(|user| require_player(&user, routes, next))
}

/// A guard bound to a live session and router.
pub struct Guard {
    session: Arc<SessionManager>,
    navigator: Arc<dyn Navigator>,
}

impl Guard {
    #[must_use]
    pub fn new(session: Arc<SessionManager>, navigator: Arc<dyn Navigator>) -> Self {
        Self { session, navigator }
    }

    /// Evaluate against the current snapshot and apply any redirect.
    pub fn evaluate<T>(&self, render: impl FnOnce(&User) -> T) -> GuardOutcome<T> {
        let state = self.session.state();
        let location = self.navigator.current_path();
        let outcome = guard(&state, &location, self.session.routes(), render);
        self.apply(&outcome, &location);
        outcome
    }

    /// Evaluate for a screen that also needs a linked player.
    pub fn evaluate_player<T>(&self, render: impl FnOnce(&User, PlayerId) -> T) -> GuardOutcome<T> {
        let state = self.session.state();
        let location = self.navigator.current_path();
        let outcome = guard_player(&state, &location, self.session.routes(), render);
        self.apply(&outcome, &location);
        outcome
    }

    /// Wait until the session settles, then evaluate.
    pub async fn settle<T>(&self, render: impl FnOnce(&User) -> T) -> GuardOutcome<T> {
        self.wait_settled().await;
        self.evaluate(render)
    }

    /// Re-evaluate on every session change until `sink` breaks or the
    /// session is dropped.
    pub async fn follow<T>(
        &self,
        mut render: impl FnMut(&User) -> T,
        mut sink: impl FnMut(GuardOutcome<T>) -> ControlFlow<()>,
    ) {
        let mut changes = self.session.subscribe();
        loop {
            drop(changes.borrow_and_update());
            if sink(self.evaluate(&mut render)).is_break() {
                return;
            }
            if changes.changed().await.is_err() {
                return;
            }
        }
    }

    async fn wait_settled(&self) {
        let mut changes = self.session.subscribe();
        loop {
            if changes.borrow_and_update().is_settled() {
                return;
            }
            if changes.changed().await.is_err() {
                return;
            }
        }
    }

    fn apply<T>(&self, outcome: &GuardOutcome<T>, location: &str) {
        if let GuardOutcome::Redirect(target) = outcome {
            if route_path(location) != target.path {
                tracing::info!(from = location, to = %target, "guard redirect");
                self.navigator.replace(target);
            }
        }
    }
}

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;
