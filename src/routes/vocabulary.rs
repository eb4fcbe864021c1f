use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::response::{ok, AppError, SuccessResponse};
use crate::routes::{parse_json, parse_json_or_default, require_text, ApiQuery};
use crate::services::types::CefrLevel;
use crate::services::vocabulary::{
    self, EntryPatch, ReviewOutcome, VocabularyEntry, VocabularyError, VocabularyStats, VocabularyView,
};
use crate::state::AppState;

const MAX_WORD_CHARS: usize = 64;
const MAX_DEFINITION_CHARS: usize = 500;
const MAX_EXAMPLE_CHARS: usize = 500;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_entries).post(add_entry))
        .route("/stats", get(stats))
        .route(
            "/:id",
            get(get_entry).put(update_entry).delete(delete_entry),
        )
        .route("/:id/review", post(review_entry))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddEntryRequest {
    word: Option<String>,
    definition: Option<String>,
    example: Option<String>,
    level: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateEntryRequest {
    definition: Option<String>,
    example: Option<String>,
    level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewRequest {
    correct: Option<bool>,
    answer: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    filter: Option<String>,
    search: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeletedResponse {
    id: String,
    deleted: bool,
}

impl From<VocabularyError> for AppError {
    fn from(err: VocabularyError) -> Self {
        match err {
            VocabularyError::Duplicate => AppError::conflict("This word is already in your vocabulary"),
            VocabularyError::MissingVerdict => {
                AppError::validation("Provide either correct or answer")
            }
            VocabularyError::Store(err) => err.into(),
        }
    }
}

fn parse_level(level: Option<&str>) -> Result<Option<CefrLevel>, AppError> {
    level
        .map(|raw| {
            CefrLevel::parse(raw)
                .ok_or_else(|| AppError::validation("level must be one of A1, A2, B1, B2, C1, C2"))
        })
        .transpose()
}

fn check_example(example: Option<&str>) -> Result<(), AppError> {
    if example.is_some_and(|e| e.chars().count() > MAX_EXAMPLE_CHARS) {
        return Err(AppError::validation(format!(
            "example must be at most {MAX_EXAMPLE_CHARS} characters"
        )));
    }
    Ok(())
}

async fn add_entry(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Bytes,
) -> Result<Response, AppError> {
    let payload: AddEntryRequest = parse_json(&body)?;
    let word = require_text(payload.word, "word", 1, MAX_WORD_CHARS)?;
    let definition = require_text(payload.definition, "definition", 1, MAX_DEFINITION_CHARS)?;
    check_example(payload.example.as_deref())?;
    let level = parse_level(payload.level.as_deref())?;
    let example = payload
        .example
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty());

    let entry = VocabularyEntry::new(&word, &definition, example, level, Utc::now().timestamp_millis());
    let view = vocabulary::add(state.db_proxy().as_ref(), &user.id, entry).await?;
    Ok((StatusCode::CREATED, ok(view)).into_response())
}

async fn list_entries(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Json<SuccessResponse<Vec<VocabularyView>>>, AppError> {
    let due_only = match query.filter.as_deref().map(str::trim) {
        None | Some("") | Some("all") => false,
        Some("due") => true,
        Some(_) => return Err(AppError::validation("filter must be due or all")),
    };
    let entries =
        vocabulary::list(state.db_proxy().as_ref(), &user.id, due_only, query.search.as_deref()).await?;
    Ok(ok(entries))
}

async fn stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SuccessResponse<VocabularyStats>>, AppError> {
    Ok(ok(vocabulary::stats(state.db_proxy().as_ref(), &user.id).await?))
}

async fn get_entry(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse<VocabularyView>>, AppError> {
    Ok(ok(vocabulary::get(state.db_proxy().as_ref(), &user.id, &id).await?))
}

async fn update_entry(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<SuccessResponse<VocabularyView>>, AppError> {
    let payload: UpdateEntryRequest = parse_json(&body)?;
    let definition = match payload.definition {
        Some(definition) => Some(require_text(Some(definition), "definition", 1, MAX_DEFINITION_CHARS)?),
        None => None,
    };
    check_example(payload.example.as_deref())?;
    let patch = EntryPatch {
        definition,
        example: payload.example,
        level: parse_level(payload.level.as_deref())?,
    };

    Ok(ok(vocabulary::update(state.db_proxy().as_ref(), &user.id, &id, patch).await?))
}

async fn delete_entry(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse<DeletedResponse>>, AppError> {
    vocabulary::delete(state.db_proxy().as_ref(), &user.id, &id).await?;
    Ok(ok(DeletedResponse { id, deleted: true }))
}

async fn review_entry(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<SuccessResponse<ReviewOutcome>>, AppError> {
    let payload: ReviewRequest = parse_json_or_default(&body)?;
    let outcome = vocabulary::review(
        state.db_proxy().as_ref(),
        &user.id,
        &id,
        payload.correct,
        payload.answer.as_deref(),
    )
    .await?;
    Ok(ok(outcome))
}
