//! Lifecycle of reading, listening, writing, speaking and grammar sessions.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::db::documents;
use crate::db::{Collection, DatabaseProxy, DocFilter, Document, StoreError};
use crate::services::content::{self, ContentSource, ExerciseContent};
use crate::services::evaluation::{
    self, DictationResult, QuestionResult, SpeakingEvaluation, WritingEvaluation,
};
use crate::services::evaluation_guard::EvaluationGuard;
use crate::services::gamification::{self, xp_for_session, XpAward};
use crate::services::grading::{clamp_score, suggest_next_level, ScoreBand};
use crate::services::llm_provider::LLMProvider;
use crate::services::speech::SpeechAnalyzer;
use crate::services::types::{CefrLevel, Module};

pub const MIN_WRITING_CHARS: usize = 20;
pub const MAX_WRITING_CHARS: usize = 5000;
const MAX_TOPIC_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    InProgress,
    Completed,
}

impl SessionStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "IN_PROGRESS" => Some(Self::InProgress),
            "COMPLETED" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResult {
    pub score: f64,
    pub band: ScoreBand,
    pub feedback: String,
    pub suggested_level: CefrLevel,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub questions: Vec<QuestionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dictation: Option<DictationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writing: Option<WritingEvaluation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaking: Option<SpeakingEvaluation>,
}

impl SessionResult {
    fn new(score: f64, level: CefrLevel, feedback: String) -> Self {
        let score = clamp_score(score);
        Self {
            score,
            band: ScoreBand::from_score(score),
            feedback,
            suggested_level: suggest_next_level(level, score),
            questions: Vec::new(),
            dictation: None,
            writing: None,
            speaking: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningSession {
    pub user_id: String,
    pub module: Module,
    pub level: CefrLevel,
    #[serde(default)]
    pub topic: Option<String>,
    pub status: SessionStatus,
    pub content: ExerciseContent,
    pub content_source: ContentSource,
    #[serde(default)]
    pub submission: Option<Value>,
    #[serde(default)]
    pub result: Option<SessionResult>,
    #[serde(default)]
    pub xp_awarded: i64,
    #[serde(default)]
    pub completed_at: Option<i64>,
}

/// What the learner sees; the answer key stays server side.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: String,
    pub module: Module,
    pub level: CefrLevel,
    pub topic: Option<String>,
    pub status: SessionStatus,
    pub content: Value,
    pub content_source: ContentSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<SessionResult>,
    pub xp_awarded: i64,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

impl From<Document<LearningSession>> for SessionView {
    fn from(doc: Document<LearningSession>) -> Self {
        let session = doc.data;
        Self {
            id: doc.id,
            module: session.module,
            level: session.level,
            topic: session.topic,
            status: session.status,
            content: session.content.client_view(),
            content_source: session.content_source,
            submission: session.submission,
            result: session.result,
            xp_awarded: session.xp_awarded,
            created_at: doc.created_at,
            completed_at: session.completed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub module: Module,
    pub level: CefrLevel,
    pub topic: Option<String>,
    pub status: SessionStatus,
    pub score: Option<f64>,
    pub xp_awarded: i64,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

impl From<Document<LearningSession>> for SessionSummary {
    fn from(doc: Document<LearningSession>) -> Self {
        let session = doc.data;
        Self {
            id: doc.id,
            module: session.module,
            level: session.level,
            topic: session.topic,
            status: session.status,
            score: session.result.map(|r| r.score),
            xp_awarded: session.xp_awarded,
            created_at: doc.created_at,
            completed_at: session.completed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    pub session: SessionView,
    pub xp: XpAward,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session belongs to the {0} module")]
    WrongModule(Module),
    #[error("session already completed")]
    AlreadyCompleted,
    #[error("session is already being evaluated")]
    EvaluationInProgress,
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn invalid(message: impl Into<String>) -> SessionError {
    SessionError::Invalid(message.into())
}

/// External collaborators used while grading a submission.
#[derive(Clone, Copy)]
pub struct Evaluators<'a> {
    pub llm: &'a LLMProvider,
    pub speech: &'a SpeechAnalyzer,
    pub guard: &'a Arc<EvaluationGuard>,
}

pub async fn create(
    proxy: &DatabaseProxy,
    llm: &LLMProvider,
    user_id: &str,
    module: Module,
    level: CefrLevel,
    topic: Option<String>,
) -> Result<SessionView, SessionError> {
    let topic = topic
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    if topic
        .as_deref()
        .is_some_and(|t| t.chars().count() > MAX_TOPIC_CHARS)
    {
        return Err(invalid(format!("topic must be at most {MAX_TOPIC_CHARS} characters")));
    }

    let (content, content_source) = content::generate(llm, module, level, topic.as_deref()).await;
    let session = LearningSession {
        user_id: user_id.to_string(),
        module,
        level,
        topic,
        status: SessionStatus::InProgress,
        content,
        content_source,
        submission: None,
        result: None,
        xp_awarded: 0,
        completed_at: None,
    };

    let id = uuid::Uuid::new_v4().to_string();
    let created_at =
        documents::insert(proxy, Collection::LearningSessions, &id, Some(user_id), &session).await?;
    tracing::debug!(session_id = %id, %module, %level, ?content_source, "session created");

    Ok(Document {
        id,
        owner_id: Some(user_id.to_string()),
        version: 1,
        created_at,
        updated_at: created_at,
        data: session,
    }
    .into())
}

pub async fn list(
    proxy: &DatabaseProxy,
    user_id: &str,
    module: Module,
    status: Option<SessionStatus>,
    limit: i64,
    offset: i64,
) -> Result<(Vec<SessionSummary>, i64), SessionError> {
    let mut filter = DocFilter::new()
        .owner(user_id)
        .field_eq("module", module.as_str());
    if let Some(status) = status {
        filter = filter.field_eq("status", status.as_str());
    }
    let total = documents::count(proxy, Collection::LearningSessions, &filter).await?;
    let docs = documents::list::<LearningSession>(
        proxy,
        Collection::LearningSessions,
        &filter.page(limit, offset),
    )
    .await?;
    Ok((docs.into_iter().map(Into::into).collect(), total))
}

/// Missing → not found, someone else's → forbidden, other module → invalid.
async fn load(
    proxy: &DatabaseProxy,
    user_id: &str,
    module: Module,
    id: &str,
) -> Result<Document<LearningSession>, SessionError> {
    let doc = documents::get_owned::<LearningSession>(proxy, Collection::LearningSessions, id, user_id).await?;
    if doc.data.module != module {
        return Err(SessionError::WrongModule(doc.data.module));
    }
    Ok(doc)
}

pub async fn get(
    proxy: &DatabaseProxy,
    user_id: &str,
    module: Module,
    id: &str,
) -> Result<SessionView, SessionError> {
    Ok(load(proxy, user_id, module, id).await?.into())
}

pub async fn delete(
    proxy: &DatabaseProxy,
    user_id: &str,
    module: Module,
    id: &str,
) -> Result<(), SessionError> {
    load(proxy, user_id, module, id).await?;
    documents::delete(proxy, Collection::LearningSessions, id).await?;
    Ok(())
}

pub async fn submit(
    proxy: &DatabaseProxy,
    evaluators: Evaluators<'_>,
    user_id: &str,
    module: Module,
    id: &str,
    body: &Value,
) -> Result<SubmitOutcome, SessionError> {
    let doc = load(proxy, user_id, module, id).await?;
    if doc.data.status == SessionStatus::Completed {
        return Err(SessionError::AlreadyCompleted);
    }

    let submission = Submission::parse(&doc.data.content, body)?;

    let _ticket = evaluators
        .guard
        .try_acquire(id)
        .ok_or(SessionError::EvaluationInProgress)?;

    let result = evaluate(evaluators, &doc.data, &submission).await;
    let score = result.score;
    let xp = xp_for_session(score);

    let mut doc = doc;
    doc.data.status = SessionStatus::Completed;
    doc.data.submission = Some(submission.to_record());
    doc.data.result = Some(result);
    doc.data.xp_awarded = xp;
    doc.data.completed_at = Some(Utc::now().timestamp_millis());

    match documents::update(proxy, Collection::LearningSessions, id, doc.version, &doc.data).await {
        Ok(version) => doc.version = version,
        Err(StoreError::Conflict) => return Err(SessionError::AlreadyCompleted),
        Err(err) => return Err(err.into()),
    }

    let award = gamification::award_xp(proxy, user_id, module, xp, true).await?;
    tracing::info!(session_id = id, %module, score, xp, "session completed");

    Ok(SubmitOutcome {
        session: doc.into(),
        xp: award,
    })
}

/// A validated submission body.
#[derive(Debug, Clone)]
pub enum Submission {
    Answers {
        answers: Vec<String>,
        dictation: Option<String>,
    },
    Writing {
        text: String,
    },
    Speaking {
        transcript: Option<String>,
        audio_base64: Option<String>,
    },
}

impl Submission {
    pub fn parse(content: &ExerciseContent, body: &Value) -> Result<Self, SessionError> {
        if !body.is_object() {
            return Err(invalid("request body must be a JSON object"));
        }
        match content {
            ExerciseContent::Reading(_) | ExerciseContent::Listening(_) | ExerciseContent::Grammar(_) => {
                let answers = parse_answers(body.get("answers"))?;
                let expected = content.questions().len();
                if answers.len() != expected {
                    return Err(invalid(format!("expected {expected} answers, got {}", answers.len())));
                }
                let dictation = match content {
                    ExerciseContent::Listening(_) => optional_string(body, "dictation")?,
                    _ => None,
                };
                Ok(Self::Answers { answers, dictation })
            }
            ExerciseContent::Writing(_) => {
                let text = optional_string(body, "text")?
                    .map(|t| t.trim().to_string())
                    .ok_or_else(|| invalid("text is required"))?;
                let len = text.chars().count();
                if !(MIN_WRITING_CHARS..=MAX_WRITING_CHARS).contains(&len) {
                    return Err(invalid(format!(
                        "text must be between {MIN_WRITING_CHARS} and {MAX_WRITING_CHARS} characters"
                    )));
                }
                Ok(Self::Writing { text })
            }
            ExerciseContent::Speaking(_) => {
                let transcript = optional_string(body, "transcript")?.filter(|t| !t.trim().is_empty());
                let audio_base64 = optional_string(body, "audioBase64")?.filter(|a| !a.trim().is_empty());
                if transcript.is_none() && audio_base64.is_none() {
                    return Err(invalid("transcript or audioBase64 is required"));
                }
                Ok(Self::Speaking {
                    transcript,
                    audio_base64,
                })
            }
        }
    }

    /// Stored form of the submission; raw audio is not kept.
    fn to_record(&self) -> Value {
        match self {
            Self::Answers { answers, dictation } => serde_json::json!({
                "answers": answers,
                "dictation": dictation,
            }),
            Self::Writing { text } => serde_json::json!({ "text": text }),
            Self::Speaking {
                transcript,
                audio_base64,
            } => serde_json::json!({
                "transcript": transcript,
                "hasAudio": audio_base64.is_some(),
            }),
        }
    }
}

fn parse_answers(value: Option<&Value>) -> Result<Vec<String>, SessionError> {
    let Some(Value::Array(items)) = value else {
        return Err(invalid("answers must be an array"));
    };
    items
        .iter()
        .map(|item| match item {
            Value::String(s) => Ok(s.clone()),
            Value::Null => Ok(String::new()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            _ => Err(invalid("each answer must be a string")),
        })
        .collect()
}

fn optional_string(body: &Value, field: &str) -> Result<Option<String>, SessionError> {
    match body.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(invalid(format!("{field} must be a string"))),
    }
}

async fn evaluate(
    evaluators: Evaluators<'_>,
    session: &LearningSession,
    submission: &Submission,
) -> SessionResult {
    let level = session.level;
    match (&session.content, submission) {
        (content, Submission::Answers { answers, dictation }) => {
            let mut questions = evaluation::grade_questions(content.questions(), answers);
            if let ExerciseContent::Grammar(_) = content {
                evaluation::explain_mistakes(evaluators.llm, &mut questions).await;
            }
            let question_score = evaluation::question_score(&questions);

            let dictation = match (content, dictation) {
                (ExerciseContent::Listening(listening), Some(given)) => {
                    Some(evaluation::grade_dictation(&listening.dictation, given))
                }
                _ => None,
            };
            let score = match &dictation {
                Some(d) => ((question_score + d.accuracy) / 2.0).round(),
                None => question_score,
            };

            let mut result = SessionResult::new(score, level, evaluation::question_feedback(&questions, score));
            result.questions = questions;
            result.dictation = dictation;
            result
        }
        (ExerciseContent::Writing(task), Submission::Writing { text }) => {
            let writing = evaluation::evaluate_writing(evaluators.llm, task, text).await;
            let mut result = SessionResult::new(writing.score, level, writing.feedback.clone());
            result.writing = Some(writing);
            result
        }
        (
            ExerciseContent::Speaking(task),
            Submission::Speaking {
                transcript,
                audio_base64,
            },
        ) => {
            let speaking = evaluation::evaluate_speaking(
                evaluators.speech,
                task,
                transcript.as_deref(),
                audio_base64.as_deref(),
            )
            .await;
            let mut result = SessionResult::new(speaking.score, level, speaking.feedback.clone());
            result.speaking = Some(speaking);
            result
        }
        // Submission::parse keys the variant off the content kind.
        _ => SessionResult::new(0.0, level, ScoreBand::NeedsWork.message().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::services::content::fallback_content;

    fn reading() -> ExerciseContent {
        fallback_content(Module::Reading, CefrLevel::A1, None)
    }

    #[test]
    fn test_non_array_answers_rejected() {
        for body in [json!({}), json!({"answers": "Saturday"}), json!({"answers": {"0": "a"}})] {
            let err = Submission::parse(&reading(), &body).unwrap_err();
            assert!(matches!(err, SessionError::Invalid(ref m) if m.contains("array")));
        }
    }

    #[test]
    fn test_answer_count_must_match() {
        let err = Submission::parse(&reading(), &json!({"answers": ["Saturday"]})).unwrap_err();
        assert!(matches!(err, SessionError::Invalid(_)));

        let ok = Submission::parse(&reading(), &json!({"answers": ["Saturday", null, 8]})).unwrap();
        match ok {
            Submission::Answers { answers, dictation } => {
                assert_eq!(answers, vec!["Saturday", "", "8"]);
                assert!(dictation.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_writing_length_bounds() {
        let content = fallback_content(Module::Writing, CefrLevel::B1, None);
        assert!(Submission::parse(&content, &json!({"text": "too short"})).is_err());
        assert!(Submission::parse(&content, &json!({"text": "x".repeat(5001)})).is_err());
        assert!(Submission::parse(&content, &json!({"text": "This text is long enough to pass."})).is_ok());
    }

    #[test]
    fn test_speaking_needs_transcript_or_audio() {
        let content = fallback_content(Module::Speaking, CefrLevel::B1, None);
        assert!(Submission::parse(&content, &json!({"transcript": "  "})).is_err());
        let parsed = Submission::parse(&content, &json!({"audioBase64": "AAAA"})).unwrap();
        assert_eq!(parsed.to_record(), json!({"transcript": null, "hasAudio": true}));
    }
}
