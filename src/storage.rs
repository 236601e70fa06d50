//! Persistent key/value storage for the credential and cached user.
//!
//! DESIGN
//! ======
//! Exactly two keys are used: [`TOKEN_KEY`] holds the bearer credential and
//! [`USER_KEY`] holds the JSON of the last known [`User`]. The session
//! manager is the only writer; everything else reads.
//!
//! [`FileStore`] re-reads its file on every access so a value written by one
//! process run is visible to the next.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::net::types::User;

pub const TOKEN_KEY: &str = "auth_token";
pub const USER_KEY: &str = "auth_user";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage contents are not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// String key/value storage that survives a client reload.
pub trait CredentialStore: Send + Sync {
    /// Read a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing medium cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing medium cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a value. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing medium cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

// =============================================================================
// SESSION HELPERS
// =============================================================================

/// Stored credential, with blank values reported as present-but-empty.
///
/// # Errors
///
/// Propagates storage read failures.
pub fn read_token(store: &dyn CredentialStore) -> Result<Option<String>, StorageError> {
    store.get(TOKEN_KEY)
}

/// Last cached user. An undecodable record reads as `None`.
///
/// # Errors
///
/// Propagates storage read failures.
pub fn read_cached_user(store: &dyn CredentialStore) -> Result<Option<User>, StorageError> {
    Ok(store
        .get(USER_KEY)?
        .and_then(|raw| serde_json::from_str(&raw).ok()))
}

/// Persist the cached user record.
///
/// # Errors
///
/// Propagates storage write failures.
pub fn write_cached_user(store: &dyn CredentialStore, user: &User) -> Result<(), StorageError> {
    let raw = serde_json::to_string(user)?;
    store.set(USER_KEY, &raw)
}

/// Persist a freshly issued credential together with its user.
///
/// # Errors
///
/// Propagates storage write failures.
pub fn write_session(store: &dyn CredentialStore, token: &str, user: &User) -> Result<(), StorageError> {
    store.set(TOKEN_KEY, token)?;
    write_cached_user(store, user)
}

/// Remove both the credential and the cached user.
///
/// # Errors
///
/// Propagates storage write failures; the user key is still attempted if the
/// token removal fails.
pub fn clear_session(store: &dyn CredentialStore) -> Result<(), StorageError> {
    let token = store.remove(TOKEN_KEY);
    let user = store.remove(USER_KEY);
    token.and(user)
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// In-process store, used by tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a credential.
    #[must_use]
    pub fn with_token(token: &str) -> Self {
        let store = Self::new();
        store.lock().insert(TOKEN_KEY.to_owned(), token.to_owned());
        store
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.lock().remove(key);
        Ok(())
    }
}

// =============================================================================
// FILE STORE
// =============================================================================

/// JSON object on disk, one string value per key.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    io: Mutex<()>,
}

impl FileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), io: Mutex::new(()) }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, values: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string_pretty(values)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut BTreeMap<String, String>) -> bool) -> Result<(), StorageError> {
        let _io = self.io.lock().unwrap_or_else(PoisonError::into_inner);
        let mut values = self.load()?;
        if f(&mut values) {
            self.save(&values)?;
        }
        Ok(())
    }
}

impl CredentialStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _io = self.io.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.update(|values| {
            values.insert(key.to_owned(), value.to_owned());
            true
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.update(|values| values.remove(key).is_some())
    }
}

#[cfg(test)]
#[path = "storage_test.rs"]
mod tests;
