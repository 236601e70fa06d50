//! REST client for the remote game API.
//!
//! ERROR HANDLING
//! ==============
//! Every call returns `Result<_, ApiError>`; nothing panics. A 401 on any
//! credential-bearing call is classified as `Unauthorized` (with `expired`
//! set when the body says so) and, when a [`SignalSender`] is attached, also
//! emitted as an [`AuthSignal`] tagged with the credential the request
//! carried, so the session can react out of band.
//!
//! The validation call is the exception: its failures belong to the session
//! bootstrap that issued it and are never re-emitted as signals.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::types::{ApiError, Credentials, LoginResponse, RegisteredUser, User, mentions_expiry};
use crate::config::ClientConfig;
use crate::signal::{AuthSignal, Invalidation, SignalSender};
use crate::storage::{self, CredentialStore};

// =============================================================================
// AUTH SEAM
// =============================================================================

/// The three auth endpoints the session manager depends on.
#[async_trait::async_trait]
pub trait AuthApi: Send + Sync {
    /// `GET /auth/validate` with the given bearer credential.
    async fn validate(&self, token: &str) -> Result<User, ApiError>;

    /// `POST /auth/login`, form-encoded.
    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, ApiError>;

    /// `POST /auth/register`, JSON body.
    async fn register(&self, credentials: &Credentials) -> Result<RegisteredUser, ApiError>;
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    store: Arc<dyn CredentialStore>,
    signals: Option<SignalSender>,
}

impl ApiClient {
    /// Build a client for `config.api_base_url` that reads its credential
    /// from `store` on every request.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &ClientConfig, store: Arc<dyn CredentialStore>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| ApiError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: config.api_base_url.trim_end_matches('/').to_owned(), store, signals: None })
    }

    /// Emit 401s from credential-bearing calls on `signals`.
    #[must_use]
    pub fn with_signals(mut self, signals: SignalSender) -> Self {
        self.signals = Some(signals);
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `GET` a JSON resource with the stored credential attached.
    ///
    /// # Errors
    ///
    /// Returns an error on missing credential, transport failure, non-2xx
    /// status, or an undecodable body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.authorized::<(), T>(Method::GET, path, None).await
    }

    /// `POST` a JSON body with the stored credential attached.
    ///
    /// # Errors
    ///
    /// Same as [`ApiClient::get_json`].
    pub async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.authorized(Method::POST, path, Some(body)).await
    }

    /// `PUT` a JSON body with the stored credential attached.
    ///
    /// # Errors
    ///
    /// Same as [`ApiClient::get_json`].
    pub async fn put_json<B: Serialize + Sync, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.authorized(Method::PUT, path, Some(body)).await
    }

    async fn authorized<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        let token = storage::read_token(self.store.as_ref())
            .map_err(|e| ApiError::Storage(e.to_string()))?
            .filter(|t| !t.trim().is_empty())
            .ok_or(ApiError::MissingCredential)?;

        let mut request = self.http.request(method.clone(), self.url(path)).bearer_auth(&token);
        if let Some(body) = body {
            request = request.json(body);
        }

        tracing::debug!(%method, path, "api request");
        let result = send(request).await.and_then(|text| decode(&text));
        if let Err(ApiError::Unauthorized { expired, .. }) = &result {
            let signal = if *expired { AuthSignal::TokenExpired } else { AuthSignal::Unauthorized };
            tracing::warn!(%method, path, ?signal, "api call rejected credential");
            if let Some(signals) = &self.signals {
                signals.emit(Invalidation::for_credential(signal, token));
            }
        }
        result
    }
}

#[async_trait::async_trait]
impl AuthApi for ApiClient {
    async fn validate(&self, token: &str) -> Result<User, ApiError> {
        let request = self.http.get(self.url("/auth/validate")).bearer_auth(token);
        let text = send(request).await?;
        decode(&text)
    }

    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, ApiError> {
        #[derive(Serialize)]
        struct LoginForm<'a> {
            username: &'a str,
            password: &'a str,
        }
        let form = LoginForm { username: &credentials.email, password: &credentials.password };
        let request = self.http.post(self.url("/auth/login")).form(&form);
        let text = send(request).await?;
        let response: LoginResponse = decode(&text)?;
        if response.access_token.trim().is_empty() {
            return Err(ApiError::Decode("login response carried an empty access_token".into()));
        }
        Ok(response)
    }

    async fn register(&self, credentials: &Credentials) -> Result<RegisteredUser, ApiError> {
        #[derive(Serialize)]
        struct RegisterBody<'a> {
            email: &'a str,
            password: &'a str,
        }
        let body = RegisterBody { email: &credentials.email, password: &credentials.password };
        let request = self.http.post(self.url("/auth/register")).json(&body);
        let text = send(request).await?;
        decode(&text)
    }
}

// =============================================================================
// HELPERS
// =============================================================================

async fn send(request: reqwest::RequestBuilder) -> Result<String, ApiError> {
    let response = request
        .send()
        .await
        .map_err(|e| ApiError::Transport(e.to_string()))?;
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| ApiError::Transport(e.to_string()))?;
    classify(status, text)
}

pub(crate) fn classify(status: StatusCode, body: String) -> Result<String, ApiError> {
    if status.is_success() {
        return Ok(body);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(ApiError::Unauthorized { status: status.as_u16(), expired: mentions_expiry(&body) });
    }
    Err(ApiError::Status { status: status.as_u16(), body })
}

pub(crate) fn decode<T: DeserializeOwned>(text: &str) -> Result<T, ApiError> {
    serde_json::from_str(text).map_err(|e| ApiError::Decode(e.to_string()))
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
