//! Ranked snapshots over XP, streaks and recent module activity.
//!
//! Snapshots are stored in the `leaderboards` collection under the kind's key
//! and served until `expiresAt`; the refresh worker recomputes them ahead of
//! expiry so most reads never pay for the aggregation.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::documents;
use crate::db::operations::{count_module_activity, usernames_by_ids};
use crate::db::{Collection, DatabaseProxy, DocFilter, StoreError};
use crate::services::gamification::GamificationProfile;
use crate::services::types::Module;

pub const MAX_ENTRIES: usize = 100;
pub const DEFAULT_LIMIT: usize = 20;
const ACTIVITY_WINDOW_MS: i64 = 7 * 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeaderboardKind {
    Xp,
    Streak,
    Module(Module),
}

impl LeaderboardKind {
    pub fn all() -> Vec<LeaderboardKind> {
        let mut kinds = vec![Self::Xp, Self::Streak];
        kinds.extend(Module::ALL.into_iter().map(Self::Module));
        kinds
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "xp" => Some(Self::Xp),
            "streak" => Some(Self::Streak),
            other => Module::parse(other).map(Self::Module),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Xp => "xp",
            Self::Streak => "streak",
            Self::Module(module) => module.as_str(),
        }
    }
}

impl fmt::Display for LeaderboardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: i64,
    pub user_id: String,
    pub username: String,
    pub value: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardSnapshot {
    pub kind: String,
    pub entries: Vec<LeaderboardEntry>,
    pub computed_at: i64,
    pub expires_at: i64,
}

impl LeaderboardSnapshot {
    pub fn entry_for(&self, user_id: &str) -> Option<&LeaderboardEntry> {
        self.entries.iter().find(|e| e.user_id == user_id)
    }
}

/// Orders by value descending, then username, and assigns competition
/// ranks: equal values share a rank and the next rank skips ahead.
pub fn rank_entries(mut rows: Vec<(String, String, i64)>) -> Vec<LeaderboardEntry> {
    rows.sort_by(|a, b| {
        b.2.cmp(&a.2)
            .then_with(|| a.1.to_lowercase().cmp(&b.1.to_lowercase()))
            .then_with(|| a.0.cmp(&b.0))
    });

    let mut entries = Vec::with_capacity(rows.len());
    let mut rank = 0;
    let mut previous: Option<i64> = None;
    for (index, (user_id, username, value)) in rows.into_iter().enumerate() {
        if previous != Some(value) {
            rank = index as i64 + 1;
            previous = Some(value);
        }
        entries.push(LeaderboardEntry {
            rank,
            user_id,
            username,
            value,
        });
    }
    entries
}

/// Attaches usernames, dropping rows whose user no longer exists.
pub async fn with_usernames(
    proxy: &DatabaseProxy,
    values: Vec<(String, i64)>,
) -> Result<Vec<(String, String, i64)>, StoreError> {
    let ids: Vec<String> = values.iter().map(|(id, _)| id.clone()).collect();
    let names: HashMap<String, String> = usernames_by_ids(proxy, &ids).await?.into_iter().collect();
    Ok(values
        .into_iter()
        .filter_map(|(id, value)| names.get(&id).cloned().map(|name| (id, name, value)))
        .collect())
}

async fn collect_values(
    proxy: &DatabaseProxy,
    kind: LeaderboardKind,
    now_ms: i64,
) -> Result<Vec<(String, i64)>, StoreError> {
    match kind {
        LeaderboardKind::Xp | LeaderboardKind::Streak => {
            let today = Utc::now().date_naive();
            let profiles = documents::list::<GamificationProfile>(
                proxy,
                Collection::Gamification,
                &DocFilter::new(),
            )
            .await?;
            Ok(profiles
                .into_iter()
                .map(|doc| {
                    let value = match kind {
                        LeaderboardKind::Xp => doc.data.xp,
                        _ => doc.data.effective_streak(today),
                    };
                    (doc.data.user_id, value)
                })
                .filter(|(_, value)| *value > 0)
                .collect())
        }
        LeaderboardKind::Module(module) => {
            Ok(count_module_activity(proxy, module.as_str(), now_ms - ACTIVITY_WINDOW_MS).await?)
        }
    }
}

/// Recomputes and stores the snapshot for `kind`.
pub async fn compute(
    proxy: &DatabaseProxy,
    kind: LeaderboardKind,
    ttl: Duration,
) -> Result<LeaderboardSnapshot, StoreError> {
    let now = Utc::now().timestamp_millis();
    let values = collect_values(proxy, kind, now).await?;
    let mut entries = rank_entries(with_usernames(proxy, values).await?);
    entries.truncate(MAX_ENTRIES);

    let snapshot = LeaderboardSnapshot {
        kind: kind.as_str().to_string(),
        entries,
        computed_at: now,
        expires_at: now + ttl.as_millis() as i64,
    };
    documents::upsert(proxy, Collection::Leaderboards, kind.as_str(), None, &snapshot).await?;
    Ok(snapshot)
}

/// Cached snapshot while it is fresh, otherwise a recomputed one.
pub async fn get(
    proxy: &DatabaseProxy,
    kind: LeaderboardKind,
    ttl: Duration,
) -> Result<LeaderboardSnapshot, StoreError> {
    let cached =
        documents::get::<LeaderboardSnapshot>(proxy, Collection::Leaderboards, kind.as_str()).await?;
    if let Some(doc) = cached {
        if doc.data.expires_at > Utc::now().timestamp_millis() {
            return Ok(doc.data);
        }
    }
    compute(proxy, kind, ttl).await
}

pub async fn refresh_all(proxy: &DatabaseProxy, ttl: Duration) -> Result<usize, StoreError> {
    let kinds = LeaderboardKind::all();
    for kind in &kinds {
        compute(proxy, *kind, ttl).await?;
    }
    Ok(kinds.len())
}
