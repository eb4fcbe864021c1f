use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::db::documents::{self, retry_on_conflict};
use crate::db::{Collection, DatabaseProxy, Document, StoreError};
use crate::services::types::Module;

const XP_PER_LEVEL_STEP: f64 = 100.0;
const BASE_SESSION_XP: i64 = 10;
pub const VOCABULARY_REVIEW_XP: i64 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GamificationProfile {
    pub user_id: String,
    pub xp: i64,
    pub level: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub last_activity_date: Option<NaiveDate>,
    #[serde(default)]
    pub module_xp: BTreeMap<String, i64>,
    pub sessions_completed: i64,
}

impl GamificationProfile {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            xp: 0,
            level: 1,
            current_streak: 0,
            longest_streak: 0,
            last_activity_date: None,
            module_xp: BTreeMap::new(),
            sessions_completed: 0,
        }
    }

    /// Adds XP and moves the daily streak forward for `today`.
    pub fn apply_award(&mut self, module: Module, amount: i64, completed_session: bool, today: NaiveDate) {
        let amount = amount.max(0);
        self.xp += amount;
        self.level = level_for_xp(self.xp);
        *self.module_xp.entry(module.as_str().to_string()).or_default() += amount;
        if completed_session {
            self.sessions_completed += 1;
        }

        match self.last_activity_date {
            Some(last) if last == today => {}
            Some(last) if last.succ_opt() == Some(today) => self.current_streak += 1,
            Some(last) if last > today => {}
            _ => self.current_streak = 1,
        }
        if self.last_activity_date.map_or(true, |last| last < today) {
            self.last_activity_date = Some(today);
        }
        self.longest_streak = self.longest_streak.max(self.current_streak);
    }

    /// A streak not extended yesterday or today has lapsed.
    pub fn effective_streak(&self, today: NaiveDate) -> i64 {
        match self.last_activity_date {
            Some(last) if last == today || last.succ_opt() == Some(today) => self.current_streak,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    #[serde(flatten)]
    pub profile: GamificationProfile,
    pub next_level_xp: i64,
    pub xp_to_next_level: i64,
}

impl ProfileView {
    pub fn new(mut profile: GamificationProfile, today: NaiveDate) -> Self {
        profile.current_streak = profile.effective_streak(today);
        let next_level_xp = xp_for_level(profile.level + 1);
        Self {
            xp_to_next_level: (next_level_xp - profile.xp).max(0),
            next_level_xp,
            profile,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct XpAward {
    pub xp_awarded: i64,
    pub total_xp: i64,
    pub level: i64,
    pub leveled_up: bool,
    pub current_streak: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    pub module: Module,
    pub xp: i64,
}

pub fn level_for_xp(xp: i64) -> i64 {
    (xp.max(0) as f64 / XP_PER_LEVEL_STEP).sqrt().floor() as i64 + 1
}

/// Total XP at which `level` is reached.
pub fn xp_for_level(level: i64) -> i64 {
    let steps = (level - 1).max(0);
    steps * steps * XP_PER_LEVEL_STEP as i64
}

pub fn xp_for_session(score: f64) -> i64 {
    let score = if score.is_finite() { score.clamp(0.0, 100.0) } else { 0.0 };
    BASE_SESSION_XP + (score / 10.0).round() as i64 * 2
}

/// Loads the profile, creating an empty one on first use.
pub async fn ensure_profile(
    proxy: &DatabaseProxy,
    user_id: &str,
) -> Result<Document<GamificationProfile>, StoreError> {
    if let Some(doc) = documents::get(proxy, Collection::Gamification, user_id).await? {
        return Ok(doc);
    }
    match documents::insert(
        proxy,
        Collection::Gamification,
        user_id,
        Some(user_id),
        &GamificationProfile::new(user_id),
    )
    .await
    {
        Ok(_) | Err(StoreError::Conflict) => {}
        Err(err) => return Err(err),
    }
    documents::get(proxy, Collection::Gamification, user_id)
        .await?
        .ok_or(StoreError::NotFound)
}

pub async fn get_profile(proxy: &DatabaseProxy, user_id: &str) -> Result<ProfileView, StoreError> {
    let doc = ensure_profile(proxy, user_id).await?;
    Ok(ProfileView::new(doc.data, Utc::now().date_naive()))
}

/// Credits XP with optimistic retries, then records an activity event.
pub async fn award_xp(
    proxy: &DatabaseProxy,
    user_id: &str,
    module: Module,
    amount: i64,
    completed_session: bool,
) -> Result<XpAward, StoreError> {
    let award = retry_on_conflict(|| apply_award_once(proxy, user_id, module, amount, completed_session)).await?;

    documents::insert(
        proxy,
        Collection::Activity,
        &uuid::Uuid::new_v4().to_string(),
        Some(user_id),
        &ActivityEvent { module, xp: amount },
    )
    .await?;

    tracing::debug!(user_id, %module, amount, total = award.total_xp, "xp awarded");
    Ok(award)
}

async fn apply_award_once(
    proxy: &DatabaseProxy,
    user_id: &str,
    module: Module,
    amount: i64,
    completed_session: bool,
) -> Result<XpAward, StoreError> {
    let doc = ensure_profile(proxy, user_id).await?;
    let mut profile = doc.data;
    let previous_level = profile.level;
    profile.apply_award(module, amount, completed_session, Utc::now().date_naive());

    documents::update(proxy, Collection::Gamification, user_id, doc.version, &profile).await?;

    Ok(XpAward {
        xp_awarded: amount.max(0),
        total_xp: profile.xp,
        level: profile.level,
        leveled_up: profile.level > previous_level,
        current_streak: profile.current_streak,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_level_curve() {
        assert_eq!(level_for_xp(0), 1);
        assert_eq!(level_for_xp(99), 1);
        assert_eq!(level_for_xp(100), 2);
        assert_eq!(level_for_xp(399), 2);
        assert_eq!(level_for_xp(400), 3);
        assert_eq!(level_for_xp(-50), 1);
        assert_eq!(xp_for_level(3), 400);
        assert_eq!(xp_for_level(1), 0);
    }

    #[test]
    fn test_session_xp() {
        assert_eq!(xp_for_session(0.0), 10);
        assert_eq!(xp_for_session(100.0), 30);
        assert_eq!(xp_for_session(67.0), 24);
        assert_eq!(xp_for_session(250.0), 30);
        assert_eq!(xp_for_session(f64::NAN), 10);
    }

    #[test]
    fn test_streak_progression() {
        let mut profile = GamificationProfile::new("u1");
        profile.apply_award(Module::Reading, 10, true, day(2024, 3, 1));
        assert_eq!(profile.current_streak, 1);

        profile.apply_award(Module::Reading, 10, true, day(2024, 3, 1));
        assert_eq!(profile.current_streak, 1);

        profile.apply_award(Module::Grammar, 10, true, day(2024, 3, 2));
        assert_eq!(profile.current_streak, 2);

        profile.apply_award(Module::Grammar, 10, false, day(2024, 3, 5));
        assert_eq!(profile.current_streak, 1);
        assert_eq!(profile.longest_streak, 2);
        assert_eq!(profile.sessions_completed, 3);
        assert_eq!(profile.xp, 40);
        assert_eq!(profile.module_xp["grammar"], 20);
    }

    #[test]
    fn test_effective_streak_lapses() {
        let mut profile = GamificationProfile::new("u1");
        profile.apply_award(Module::Writing, 10, true, day(2024, 3, 1));
        assert_eq!(profile.effective_streak(day(2024, 3, 2)), 1);
        assert_eq!(profile.effective_streak(day(2024, 3, 3)), 0);
    }

    #[tokio::test]
    async fn test_award_xp_persists_and_logs_activity() {
        let proxy = DatabaseProxy::connect("sqlite::memory:").await.unwrap();
        let first = award_xp(&proxy, "u1", Module::Reading, 30, true).await.unwrap();
        assert_eq!(first.total_xp, 30);
        assert!(!first.leveled_up);

        let second = award_xp(&proxy, "u1", Module::Reading, 80, true).await.unwrap();
        assert_eq!(second.total_xp, 110);
        assert_eq!(second.level, 2);
        assert!(second.leveled_up);

        let events = documents::count(
            &proxy,
            Collection::Activity,
            &crate::db::DocFilter::new().owner("u1"),
        )
        .await
        .unwrap();
        assert_eq!(events, 2);
    }
}
