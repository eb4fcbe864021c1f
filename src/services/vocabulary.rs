use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::documents;
use crate::db::{Collection, DatabaseProxy, DocFilter, Document, StoreError};
use crate::services::gamification::{self, XpAward, VOCABULARY_REVIEW_XP};
use crate::services::grading::is_answer_correct;
use crate::services::types::{CefrLevel, Module};

pub const MAX_MASTERY: i64 = 5;
const WRONG_ANSWER_PENALTY: i64 = 2;

const MINUTE_MS: i64 = 60 * 1000;
const DAY_MS: i64 = 24 * 60 * MINUTE_MS;

/// Wait before the next review, indexed by mastery.
pub const REVIEW_INTERVALS_MS: [i64; 6] = [
    10 * MINUTE_MS,
    DAY_MS,
    3 * DAY_MS,
    7 * DAY_MS,
    14 * DAY_MS,
    30 * DAY_MS,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MasteryLabel {
    New,
    Learning,
    Familiar,
    Mastered,
}

impl MasteryLabel {
    pub fn from_mastery(mastery: i64) -> Self {
        match mastery {
            i64::MIN..=0 => Self::New,
            1..=2 => Self::Learning,
            3..=4 => Self::Familiar,
            _ => Self::Mastered,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyEntry {
    pub word: String,
    /// Lowercased word used for duplicate detection.
    pub word_key: String,
    pub definition: String,
    #[serde(default)]
    pub example: Option<String>,
    #[serde(default)]
    pub level: Option<CefrLevel>,
    pub mastery: i64,
    pub review_count: i64,
    pub correct_count: i64,
    pub next_review_at: i64,
    #[serde(default)]
    pub last_reviewed_at: Option<i64>,
}

impl VocabularyEntry {
    pub fn new(word: &str, definition: &str, example: Option<String>, level: Option<CefrLevel>, now: i64) -> Self {
        let word = word.trim();
        Self {
            word: word.to_string(),
            word_key: word.to_lowercase(),
            definition: definition.trim().to_string(),
            example,
            level,
            mastery: 0,
            review_count: 0,
            correct_count: 0,
            next_review_at: now,
            last_reviewed_at: None,
        }
    }

    pub fn apply_review(&mut self, correct: bool, now: i64) {
        self.review_count += 1;
        if correct {
            self.correct_count += 1;
            self.mastery = (self.mastery + 1).min(MAX_MASTERY);
        } else {
            self.mastery = (self.mastery - WRONG_ANSWER_PENALTY).max(0);
        }
        self.next_review_at = now + REVIEW_INTERVALS_MS[self.mastery.clamp(0, MAX_MASTERY) as usize];
        self.last_reviewed_at = Some(now);
    }

    pub fn is_due(&self, now: i64) -> bool {
        self.next_review_at <= now
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyView {
    pub id: String,
    #[serde(flatten)]
    pub entry: VocabularyEntry,
    pub mastery_label: MasteryLabel,
    pub due: bool,
    pub created_at: i64,
}

impl VocabularyView {
    fn new(doc: Document<VocabularyEntry>, now: i64) -> Self {
        Self {
            id: doc.id,
            mastery_label: MasteryLabel::from_mastery(doc.data.mastery),
            due: doc.data.is_due(now),
            entry: doc.data,
            created_at: doc.created_at,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntryPatch {
    pub definition: Option<String>,
    pub example: Option<String>,
    pub level: Option<CefrLevel>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOutcome {
    pub correct: bool,
    pub entry: VocabularyView,
    pub xp: XpAward,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyStats {
    pub total: usize,
    pub due: usize,
    pub new: usize,
    pub learning: usize,
    pub familiar: usize,
    pub mastered: usize,
}

#[derive(Debug, Error)]
pub enum VocabularyError {
    #[error("word is already in your vocabulary")]
    Duplicate,
    #[error("provide either correct or answer")]
    MissingVerdict,
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub async fn add(
    proxy: &DatabaseProxy,
    user_id: &str,
    entry: VocabularyEntry,
) -> Result<VocabularyView, VocabularyError> {
    let existing = documents::count(
        proxy,
        Collection::Vocabulary,
        &DocFilter::new()
            .owner(user_id)
            .field_eq("wordKey", entry.word_key.clone()),
    )
    .await?;
    if existing > 0 {
        return Err(VocabularyError::Duplicate);
    }

    let id = uuid::Uuid::new_v4().to_string();
    let created_at = documents::insert(proxy, Collection::Vocabulary, &id, Some(user_id), &entry).await?;
    Ok(VocabularyView::new(
        Document {
            id,
            owner_id: Some(user_id.to_string()),
            version: 1,
            created_at,
            updated_at: created_at,
            data: entry,
        },
        created_at,
    ))
}

pub async fn list(
    proxy: &DatabaseProxy,
    user_id: &str,
    due_only: bool,
    search: Option<&str>,
) -> Result<Vec<VocabularyView>, VocabularyError> {
    let now = Utc::now().timestamp_millis();
    let needle = search
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());
    let docs =
        documents::list::<VocabularyEntry>(proxy, Collection::Vocabulary, &DocFilter::new().owner(user_id))
            .await?;

    let mut entries: Vec<VocabularyView> = docs
        .into_iter()
        .filter(|doc| !due_only || doc.data.is_due(now))
        .filter(|doc| match &needle {
            Some(n) => doc.data.word_key.contains(n.as_str()) || doc.data.definition.to_lowercase().contains(n.as_str()),
            None => true,
        })
        .map(|doc| VocabularyView::new(doc, now))
        .collect();
    if due_only {
        entries.sort_by_key(|e| e.entry.next_review_at);
    }
    Ok(entries)
}

pub async fn get(proxy: &DatabaseProxy, user_id: &str, id: &str) -> Result<VocabularyView, VocabularyError> {
    let doc = documents::get_owned(proxy, Collection::Vocabulary, id, user_id).await?;
    Ok(VocabularyView::new(doc, Utc::now().timestamp_millis()))
}

pub async fn update(
    proxy: &DatabaseProxy,
    user_id: &str,
    id: &str,
    patch: EntryPatch,
) -> Result<VocabularyView, VocabularyError> {
    let mut doc = documents::get_owned::<VocabularyEntry>(proxy, Collection::Vocabulary, id, user_id).await?;
    if let Some(definition) = patch.definition {
        doc.data.definition = definition.trim().to_string();
    }
    if let Some(example) = patch.example {
        doc.data.example = Some(example).filter(|e| !e.trim().is_empty());
    }
    if let Some(level) = patch.level {
        doc.data.level = Some(level);
    }
    doc.version = documents::update(proxy, Collection::Vocabulary, id, doc.version, &doc.data).await?;
    Ok(VocabularyView::new(doc, Utc::now().timestamp_millis()))
}

pub async fn delete(proxy: &DatabaseProxy, user_id: &str, id: &str) -> Result<(), VocabularyError> {
    documents::get_owned::<VocabularyEntry>(proxy, Collection::Vocabulary, id, user_id).await?;
    documents::delete(proxy, Collection::Vocabulary, id).await?;
    Ok(())
}

/// Grades a review, reschedules the entry and credits XP.
pub async fn review(
    proxy: &DatabaseProxy,
    user_id: &str,
    id: &str,
    correct: Option<bool>,
    answer: Option<&str>,
) -> Result<ReviewOutcome, VocabularyError> {
    let mut doc = documents::get_owned::<VocabularyEntry>(proxy, Collection::Vocabulary, id, user_id).await?;
    let correct = match (correct, answer) {
        (Some(verdict), _) => verdict,
        (None, Some(answer)) => {
            is_answer_correct(&doc.data.word, answer) || is_answer_correct(&doc.data.definition, answer)
        }
        (None, None) => return Err(VocabularyError::MissingVerdict),
    };

    let now = Utc::now().timestamp_millis();
    doc.data.apply_review(correct, now);
    doc.version = documents::update(proxy, Collection::Vocabulary, id, doc.version, &doc.data).await?;

    let xp_amount = if correct { VOCABULARY_REVIEW_XP } else { 0 };
    let xp = gamification::award_xp(proxy, user_id, Module::Vocabulary, xp_amount, false).await?;

    Ok(ReviewOutcome {
        correct,
        entry: VocabularyView::new(doc, now),
        xp,
    })
}

pub async fn stats(proxy: &DatabaseProxy, user_id: &str) -> Result<VocabularyStats, VocabularyError> {
    let now = Utc::now().timestamp_millis();
    let docs =
        documents::list::<VocabularyEntry>(proxy, Collection::Vocabulary, &DocFilter::new().owner(user_id))
            .await?;

    let mut stats = VocabularyStats {
        total: docs.len(),
        ..Default::default()
    };
    for doc in &docs {
        if doc.data.is_due(now) {
            stats.due += 1;
        }
        match MasteryLabel::from_mastery(doc.data.mastery) {
            MasteryLabel::New => stats.new += 1,
            MasteryLabel::Learning => stats.learning += 1,
            MasteryLabel::Familiar => stats.familiar += 1,
            MasteryLabel::Mastered => stats.mastered += 1,
        }
    }
    Ok(stats)
}
