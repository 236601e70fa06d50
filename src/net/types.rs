//! Wire DTOs for the remote game API and the errors its client produces.
//!
//! DESIGN
//! ======
//! The server is a black box; these types mirror only the fields the client
//! relies on. Unknown fields are ignored so server additions never break
//! session validation.

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;

use serde::{Deserialize, Serialize};

/// Numeric identifier of a user account.
pub type UserId = i64;

/// Numeric identifier of the game-side player record linked to a user.
pub type PlayerId = i64;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by remote API calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request never produced a response (connect, timeout, TLS).
    #[error("request failed: {0}")]
    Transport(String),

    /// The server rejected the credential.
    #[error("credential rejected: status {status}")]
    Unauthorized { status: u16, expired: bool },

    /// The server returned some other non-success status.
    #[error("API response error: status {status}")]
    Status { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("response parse failed: {0}")]
    Decode(String),

    /// The call needs a stored credential and there is none.
    #[error("no stored credential")]
    MissingCredential,

    /// An update named a record that has no server-assigned id yet.
    #[error("{0} has no id; create it first")]
    MissingId(&'static str),

    /// The local credential store could not be read.
    #[error("credential storage failed: {0}")]
    Storage(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl ApiError {
    /// Stable machine-readable code for logs.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "E_TRANSPORT",
            Self::Unauthorized { expired: true, .. } => "E_TOKEN_EXPIRED",
            Self::Unauthorized { .. } => "E_UNAUTHORIZED",
            Self::Status { .. } => "E_API_STATUS",
            Self::Decode(_) => "E_API_DECODE",
            Self::MissingCredential => "E_MISSING_CREDENTIAL",
            Self::MissingId(_) => "E_MISSING_ID",
            Self::Storage(_) => "E_STORAGE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    /// True when the server was never reached.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Status { status: 429 | 500..=599, .. })
    }
}

/// Human-readable detail pulled from a FastAPI-style `{"detail": ...}` body.
#[must_use]
pub fn error_detail(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct Detail {
        detail: serde_json::Value,
    }
    let parsed: Detail = serde_json::from_str(body).ok()?;
    match parsed.detail {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Whether a 401 body says the credential's validity window has passed.
///
/// Matches both `expired` and the backend's Portuguese `expirado`.
#[must_use]
pub fn mentions_expiry(body: &str) -> bool {
    error_detail(body).is_some_and(|d| d.to_lowercase().contains("expir"))
}

// =============================================================================
// AUTH
// =============================================================================

/// The signed-in user as the session layer sees it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    /// `None` until the user has completed character setup.
    #[serde(default)]
    pub player_id: Option<PlayerId>,
}

impl User {
    #[must_use]
    pub fn has_player(&self) -> bool {
        self.player_id.is_some()
    }
}

/// Email/password pair submitted to login and registration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self { email: email.into(), password: password.into() }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// User block optionally embedded in a login response.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct LoginUser {
    pub id: UserId,
    pub email: String,
}

/// `POST /auth/login` response body.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub player_id: Option<PlayerId>,
    #[serde(default)]
    pub user: Option<LoginUser>,
}

impl LoginResponse {
    /// Identity carried inline by the response, if the server sent one.
    #[must_use]
    pub fn inline_user(&self) -> Option<User> {
        self.user.as_ref().map(|u| User { id: u.id, email: u.email.clone(), player_id: self.player_id })
    }
}

/// `POST /auth/register` response body.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RegisteredUser {
    pub id: UserId,
    pub email: String,
}

// =============================================================================
// PLAYER DATA
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub user_id: UserId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameProgress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub user_id: UserId,
    pub level: u32,
    pub score: i64,
    pub coins: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    System,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub user_id: UserId,
    pub theme: Theme,
    pub volume: f32,
    pub music_volume: f32,
    pub sfx_volume: f32,
    pub language: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterCustomization {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<PlayerId>,
    pub name: String,
    pub head_id: i64,
    pub body_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,
}

/// Saved game snapshot. The game state itself is opaque to this crate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameSave {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub user_id: UserId,
    pub save_name: String,
    pub game_state: serde_json::Value,
}

/// Everything loaded for a player right after sign-in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerData {
    pub profile: UserProfile,
    pub progress: GameProgress,
    pub settings: UserSettings,
    pub character: CharacterCustomization,
}
