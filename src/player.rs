//! Player data: profile, progress, settings, characters and saves.
//!
//! DESIGN
//! ======
//! Plain pass-through REST calls keyed by user id. The first load after
//! sign-in fills in server-side defaults for any resource the player does
//! not have yet, then caches the whole bundle under
//! [`QueryKey::PlayerData`]. Each update writes through the API and then
//! invalidates exactly the keys it made stale.

use std::sync::Arc;

use crate::cache::{CachedValue, QueryCache, QueryKey};
use crate::net::api::ApiClient;
use crate::net::types::{
    ApiError, CharacterCustomization, GameProgress, GameSave, PlayerData, Theme, UserId, UserProfile, UserSettings,
};

pub const DEFAULT_USERNAME: &str = "New Farmer";
pub const DEFAULT_CHARACTER_NAME: &str = "Farmer";
pub const DEFAULT_LANGUAGE: &str = "en-US";
pub const STARTING_COINS: i64 = 100;

pub struct PlayerService {
    api: Arc<ApiClient>,
    cache: Arc<QueryCache>,
}

impl PlayerService {
    #[must_use]
    pub fn new(api: Arc<ApiClient>, cache: Arc<QueryCache>) -> Self {
        Self { api, cache }
    }

    /// Load everything the game screen needs, creating defaults where the
    /// server has nothing yet. Served from cache while fresh.
    ///
    /// # Errors
    ///
    /// Returns an error if a missing resource cannot be created, or on any
    /// credential or transport failure.
    pub async fn load_player_data(&self, user_id: UserId) -> Result<PlayerData, ApiError> {
        if let Some(CachedValue::PlayerData(data)) = self.cache.get(QueryKey::PlayerData(user_id)) {
            return Ok(data);
        }

        let profile = self
            .get_or_create(&format!("/players/{user_id}/profile"), || default_profile(user_id))
            .await?;
        let progress = self
            .get_or_create(&format!("/players/{user_id}/progress"), || default_progress(user_id))
            .await?;
        let settings = self
            .get_or_create(&format!("/players/{user_id}/settings"), || default_settings(user_id))
            .await?;
        let character = match self.characters(user_id).await {
            Ok(list) if !list.is_empty() => list.into_iter().next(),
            Ok(_) => None,
            Err(e) if is_recoverable_miss(&e) => None,
            Err(e) => return Err(e),
        };
        let character = match character {
            Some(c) => c,
            None => {
                tracing::info!(user_id, "creating default character");
                self.create_character(&default_character(user_id)).await?
            }
        };

        let data = PlayerData { profile, progress, settings, character };
        self.cache
            .insert(QueryKey::PlayerData(user_id), CachedValue::PlayerData(data.clone()));
        tracing::info!(user_id, "player data loaded");
        Ok(data)
    }

    /// # Errors
    ///
    /// Propagates API failures.
    pub async fn update_profile(&self, profile: &UserProfile) -> Result<UserProfile, ApiError> {
        let user_id = profile.user_id;
        let updated: UserProfile = self
            .api
            .put_json(&format!("/players/{user_id}/profile"), profile)
            .await?;
        self.cache
            .insert(QueryKey::Profile(user_id), CachedValue::Profile(updated.clone()));
        self.cache.invalidate(QueryKey::PlayerData(user_id));
        Ok(updated)
    }

    /// # Errors
    ///
    /// Propagates API failures.
    pub async fn update_progress(&self, progress: &GameProgress) -> Result<GameProgress, ApiError> {
        let user_id = progress.user_id;
        let updated: GameProgress = self
            .api
            .put_json(&format!("/players/{user_id}/progress"), progress)
            .await?;
        self.cache
            .insert(QueryKey::Progress(user_id), CachedValue::Progress(updated.clone()));
        self.cache.invalidate(QueryKey::PlayerData(user_id));
        Ok(updated)
    }

    /// # Errors
    ///
    /// Propagates API failures.
    pub async fn update_settings(&self, settings: &UserSettings) -> Result<UserSettings, ApiError> {
        let user_id = settings.user_id;
        let updated: UserSettings = self
            .api
            .put_json(&format!("/players/{user_id}/settings"), settings)
            .await?;
        self.cache
            .insert(QueryKey::Settings(user_id), CachedValue::Settings(updated.clone()));
        self.cache.invalidate(QueryKey::PlayerData(user_id));
        Ok(updated)
    }

    /// # Errors
    ///
    /// Propagates API failures.
    pub async fn characters(&self, user_id: UserId) -> Result<Vec<CharacterCustomization>, ApiError> {
        if let Some(CachedValue::Characters(list)) = self.cache.get(QueryKey::Characters(user_id)) {
            return Ok(list);
        }
        let list: Vec<CharacterCustomization> = self
            .api
            .get_json(&format!("/players/{user_id}/characters"))
            .await?;
        self.cache
            .insert(QueryKey::Characters(user_id), CachedValue::Characters(list.clone()));
        Ok(list)
    }

    /// # Errors
    ///
    /// Propagates API failures.
    pub async fn create_character(
        &self,
        character: &CharacterCustomization,
    ) -> Result<CharacterCustomization, ApiError> {
        let user_id = character.user_id;
        let created = self
            .api
            .post_json(&format!("/players/{user_id}/characters"), character)
            .await?;
        self.cache.invalidate(QueryKey::Characters(user_id));
        self.cache.invalidate(QueryKey::PlayerData(user_id));
        Ok(created)
    }

    /// Overwrite an existing character.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::MissingId`] if `character.id` is unset, otherwise
    /// propagates API failures.
    pub async fn update_character(
        &self,
        character: &CharacterCustomization,
    ) -> Result<CharacterCustomization, ApiError> {
        let user_id = character.user_id;
        let Some(character_id) = character.id else {
            return Err(ApiError::MissingId("character"));
        };
        let updated = self
            .api
            .put_json(&format!("/players/{user_id}/characters/{character_id}"), character)
            .await?;
        self.cache.invalidate(QueryKey::Characters(user_id));
        self.cache.invalidate(QueryKey::PlayerData(user_id));
        Ok(updated)
    }

    /// # Errors
    ///
    /// Propagates API failures.
    pub async fn saves(&self, user_id: UserId) -> Result<Vec<GameSave>, ApiError> {
        if let Some(CachedValue::Saves(list)) = self.cache.get(QueryKey::Saves(user_id)) {
            return Ok(list);
        }
        let list: Vec<GameSave> = self.api.get_json(&format!("/players/{user_id}/saves")).await?;
        self.cache
            .insert(QueryKey::Saves(user_id), CachedValue::Saves(list.clone()));
        Ok(list)
    }

    /// Create a new save, or overwrite `save.id` when set.
    ///
    /// # Errors
    ///
    /// Propagates API failures.
    pub async fn store_save(&self, save: &GameSave) -> Result<GameSave, ApiError> {
        let user_id = save.user_id;
        let stored = match save.id {
            Some(save_id) => {
                self.api
                    .put_json(&format!("/players/{user_id}/saves/{save_id}"), save)
                    .await?
            }
            None => self.api.post_json(&format!("/players/{user_id}/saves"), save).await?,
        };
        self.cache.invalidate(QueryKey::Saves(user_id));
        Ok(stored)
    }

    async fn get_or_create<T>(&self, path: &str, default: impl FnOnce() -> T) -> Result<T, ApiError>
    where
        T: serde::Serialize + serde::de::DeserializeOwned + Sync,
    {
        match self.api.get_json::<T>(path).await {
            Ok(value) => Ok(value),
            Err(e) if is_recoverable_miss(&e) => {
                tracing::info!(path, code = e.error_code(), "resource missing, creating default");
                self.api.post_json(path, &default()).await
            }
            Err(e) => Err(e),
        }
    }
}

/// A lookup failure that means "the player has none yet" rather than
/// "the session is broken".
fn is_recoverable_miss(error: &ApiError) -> bool {
    matches!(error, ApiError::Status { .. } | ApiError::Decode(_))
}

#[must_use]
pub fn default_profile(user_id: UserId) -> UserProfile {
    UserProfile { id: None, user_id, username: DEFAULT_USERNAME.to_owned(), avatar_url: None }
}

#[must_use]
pub fn default_progress(user_id: UserId) -> GameProgress {
    GameProgress { id: None, user_id, level: 1, score: 0, coins: STARTING_COINS }
}

#[must_use]
pub fn default_settings(user_id: UserId) -> UserSettings {
    UserSettings {
        id: None,
        user_id,
        theme: Theme::Light,
        volume: 0.7,
        music_volume: 0.5,
        sfx_volume: 0.8,
        language: DEFAULT_LANGUAGE.to_owned(),
    }
}

#[must_use]
pub fn default_character(user_id: UserId) -> CharacterCustomization {
    CharacterCustomization {
        id: None,
        user_id,
        player_id: None,
        name: DEFAULT_CHARACTER_NAME.to_owned(),
        head_id: 1,
        body_id: 1,
        tool_id: None,
    }
}

#[cfg(test)]
#[path = "player_test.rs"]
mod tests;
