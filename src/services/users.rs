use serde::{Deserialize, Serialize};

use crate::cache::{keys, RedisCache};
use crate::db::documents;
use crate::db::operations::{delete_user, delete_user_auth_sessions};
use crate::db::{Collection, DatabaseProxy, Document, StoreError};
use crate::services::groups::{self, GroupError};
use crate::services::types::CefrLevel;

pub const MIN_DAILY_GOAL_MINUTES: i64 = 5;
pub const MAX_DAILY_GOAL_MINUTES: i64 = 240;
const DEFAULT_DAILY_GOAL_MINUTES: i64 = 15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub native_language: Option<String>,
    pub target_level: CefrLevel,
    pub daily_goal_minutes: i64,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            display_name: None,
            native_language: None,
            target_level: CefrLevel::default(),
            daily_goal_minutes: DEFAULT_DAILY_GOAL_MINUTES,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    pub display_name: Option<String>,
    pub native_language: Option<String>,
    pub target_level: Option<CefrLevel>,
    pub daily_goal_minutes: Option<i64>,
}

impl ProfilePatch {
    fn apply(self, profile: &mut UserProfile) {
        if let Some(name) = self.display_name {
            profile.display_name = Some(name.trim().to_string()).filter(|n| !n.is_empty());
        }
        if let Some(language) = self.native_language {
            profile.native_language = Some(language.trim().to_string()).filter(|l| !l.is_empty());
        }
        if let Some(level) = self.target_level {
            profile.target_level = level;
        }
        if let Some(minutes) = self.daily_goal_minutes {
            profile.daily_goal_minutes = minutes;
        }
    }
}

pub async fn ensure_profile(
    proxy: &DatabaseProxy,
    user_id: &str,
) -> Result<Document<UserProfile>, StoreError> {
    if let Some(doc) = documents::get(proxy, Collection::UserProfiles, user_id).await? {
        return Ok(doc);
    }
    match documents::insert(
        proxy,
        Collection::UserProfiles,
        user_id,
        Some(user_id),
        &UserProfile::default(),
    )
    .await
    {
        Ok(_) | Err(StoreError::Conflict) => {}
        Err(err) => return Err(err),
    }
    documents::get(proxy, Collection::UserProfiles, user_id)
        .await?
        .ok_or(StoreError::NotFound)
}

pub async fn target_level(proxy: &DatabaseProxy, user_id: &str) -> Result<CefrLevel, StoreError> {
    Ok(ensure_profile(proxy, user_id).await?.data.target_level)
}

pub async fn update_profile(
    proxy: &DatabaseProxy,
    user_id: &str,
    patch: ProfilePatch,
) -> Result<UserProfile, StoreError> {
    let mut doc = ensure_profile(proxy, user_id).await?;
    patch.apply(&mut doc.data);
    documents::update(proxy, Collection::UserProfiles, user_id, doc.version, &doc.data).await?;
    Ok(doc.data)
}

/// Deletes the account and everything hanging off it.
pub async fn delete_account(
    proxy: &DatabaseProxy,
    cache: Option<&RedisCache>,
    user_id: &str,
    token_hash: Option<&str>,
) -> Result<(), GroupError> {
    let groups_left = groups::remove_user_everywhere(proxy, user_id).await?;
    let documents_removed = documents::delete_by_owner(proxy, user_id).await?;
    delete_user_auth_sessions(proxy, user_id)
        .await
        .map_err(StoreError::from)?;
    delete_user(proxy, user_id).await.map_err(StoreError::from)?;

    if let (Some(cache), Some(hash)) = (cache, token_hash) {
        cache.delete(&keys::session_key(hash)).await;
    }

    tracing::info!(user_id, groups_left, documents_removed, "account deleted");
    Ok(())
}
