//! Client configuration parsed from environment variables.

use std::path::PathBuf;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_STORAGE_PATH: &str = ".farmgate/storage.json";
pub const DEFAULT_LOGIN_ROUTE: &str = "/auth";
pub const DEFAULT_SETUP_ROUTE: &str = "/character";
pub const DEFAULT_HOME_ROUTE: &str = "/game";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid API base URL '{value}': {reason}")]
    InvalidBaseUrl { value: String, reason: String },
    #[error("route {var} must start with '/', got '{value}'")]
    InvalidRoute { var: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

/// Well-known client routes the session layer redirects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routes {
    pub login: String,
    pub setup: String,
    pub home: String,
}

impl Default for Routes {
    fn default() -> Self {
        Self {
            login: DEFAULT_LOGIN_ROUTE.to_owned(),
            setup: DEFAULT_SETUP_ROUTE.to_owned(),
            home: DEFAULT_HOME_ROUTE.to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub timeouts: Timeouts,
    pub storage_path: PathBuf,
    pub routes: Routes,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_owned(),
            timeouts: Timeouts::default(),
            storage_path: PathBuf::from(DEFAULT_STORAGE_PATH),
            routes: Routes::default(),
        }
    }
}

impl ClientConfig {
    /// Build typed client config from environment variables.
    ///
    /// Optional:
    /// - `FARMGATE_API_BASE_URL`: default `http://localhost:8000`
    /// - `FARMGATE_REQUEST_TIMEOUT_SECS`: default 15
    /// - `FARMGATE_CONNECT_TIMEOUT_SECS`: default 10
    /// - `FARMGATE_STORAGE_PATH`: default `.farmgate/storage.json`
    /// - `FARMGATE_LOGIN_ROUTE` / `FARMGATE_SETUP_ROUTE` / `FARMGATE_HOME_ROUTE`
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL does not parse or a route is not absolute.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] but reads values through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL does not parse or a route is not absolute.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_base_url = normalize_base_url(
            &lookup("FARMGATE_API_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE_URL.to_owned()),
        )?;

        let timeouts = Timeouts {
            request_secs: parse_or(&lookup, "FARMGATE_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: parse_or(&lookup, "FARMGATE_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };

        let storage_path = lookup("FARMGATE_STORAGE_PATH")
            .filter(|v| !v.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_STORAGE_PATH), PathBuf::from);

        let routes = Routes {
            login: route(&lookup, "FARMGATE_LOGIN_ROUTE", DEFAULT_LOGIN_ROUTE)?,
            setup: route(&lookup, "FARMGATE_SETUP_ROUTE", DEFAULT_SETUP_ROUTE)?,
            home: route(&lookup, "FARMGATE_HOME_ROUTE", DEFAULT_HOME_ROUTE)?,
        };

        Ok(Self { api_base_url, timeouts, storage_path, routes })
    }
}

/// Validate an API base URL and strip trailing slashes so paths can be appended.
///
/// # Errors
///
/// Returns an error if `raw` is not an absolute http(s) URL.
pub fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let parsed = url::Url::parse(trimmed)
        .map_err(|e| ConfigError::InvalidBaseUrl { value: raw.to_owned(), reason: e.to_string() })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidBaseUrl {
            value: raw.to_owned(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    Ok(trimmed.to_owned())
}

fn parse_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> u64 {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn route(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: &str,
) -> Result<String, ConfigError> {
    let value = lookup(var).unwrap_or_else(|| default.to_owned());
    if !value.starts_with('/') {
        return Err(ConfigError::InvalidRoute { var, value });
    }
    Ok(value)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
