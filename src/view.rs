//! Plain-text rendering of session and guard results.

use crate::guard::GuardOutcome;
use crate::net::types::User;
use crate::session::{Phase, SessionState};

pub const LOADING_PLACEHOLDER: &str = "Loading authentication...";
pub const NOT_AUTHENTICATED: &str = "You are not authenticated.";

#[must_use]
pub fn render_user(user: &User) -> String {
    match user.player_id {
        Some(player_id) => format!("Signed in as {} (user {}, player {player_id})", user.email, user.id),
        None => format!("Signed in as {} (user {}, no player yet)", user.email, user.id),
    }
}

/// One-screen summary of the session.
#[must_use]
pub fn render_status(state: &SessionState) -> String {
    let mut out = match (state.phase, state.user()) {
        (Phase::Uninitialized | Phase::Resolving, _) => LOADING_PLACEHOLDER.to_owned(),
        (Phase::Authenticated, Some(user)) => render_user(user),
        _ => NOT_AUTHENTICATED.to_owned(),
    };
    if let Some(failure) = &state.failure {
        out.push('\n');
        out.push_str(&failure.to_string());
    }
    out
}

/// What a guarded screen shows for `outcome`.
#[must_use]
pub fn render_outcome(outcome: &GuardOutcome<String>) -> String {
    match outcome {
        GuardOutcome::Loading => LOADING_PLACEHOLDER.to_owned(),
        GuardOutcome::Redirect(target) => format!("Redirecting to {target}"),
        GuardOutcome::Render(body) => body.clone(),
    }
}

#[cfg(test)]
#[path = "view_test.rs"]
mod tests;
