//! Typed query cache for session-derived player data.
//!
//! DESIGN
//! ======
//! Keys are a closed enum, one variant per resource, each carrying the user
//! id it belongs to. Mutations name exactly which keys they invalidate, and
//! an invalidated entry is a miss until the next fetch stores it again.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::net::types::{CharacterCustomization, GameProgress, GameSave, PlayerData, UserId, UserProfile, UserSettings};

/// Resource family of a [`QueryKey`], for bulk invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    PlayerData,
    Profile,
    Progress,
    Settings,
    Characters,
    Saves,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKey {
    PlayerData(UserId),
    Profile(UserId),
    Progress(UserId),
    Settings(UserId),
    Characters(UserId),
    Saves(UserId),
}

impl QueryKey {
    #[must_use]
    pub fn kind(self) -> QueryKind {
        match self {
            Self::PlayerData(_) => QueryKind::PlayerData,
            Self::Profile(_) => QueryKind::Profile,
            Self::Progress(_) => QueryKind::Progress,
            Self::Settings(_) => QueryKind::Settings,
            Self::Characters(_) => QueryKind::Characters,
            Self::Saves(_) => QueryKind::Saves,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    PlayerData(PlayerData),
    Profile(UserProfile),
    Progress(GameProgress),
    Settings(UserSettings),
    Characters(Vec<CharacterCustomization>),
    Saves(Vec<GameSave>),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CachedValue,
    stale: bool,
}

#[derive(Debug, Default)]
pub struct QueryCache {
    entries: RwLock<HashMap<QueryKey, CacheEntry>>,
}

impl QueryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh value for `key`; `None` if missing or invalidated.
    #[must_use]
    pub fn get(&self, key: QueryKey) -> Option<CachedValue> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(&key)
            .filter(|e| !e.stale)
            .map(|e| e.value.clone())
    }

    pub fn insert(&self, key: QueryKey, value: CachedValue) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key, CacheEntry { value, stale: false });
    }

    /// Mark one key stale. Returns whether an entry existed.
    pub fn invalidate(&self, key: QueryKey) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get_mut(&key) {
            Some(entry) => {
                entry.stale = true;
                true
            }
            None => false,
        }
    }

    /// Mark every key of `kind` stale, for all users. Returns how many.
    pub fn invalidate_kind(&self, kind: QueryKind) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut count = 0;
        for (key, entry) in entries.iter_mut() {
            if key.kind() == kind {
                entry.stale = true;
                count += 1;
            }
        }
        count
    }

    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod tests;
