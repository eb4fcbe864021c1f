//! Session endpoints shared by every exercise module; the module itself
//! arrives as a request extension set where the router is nested.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::AuthUser;
use crate::response::{ok, AppError, PagePagination, SuccessResponse, SuccessResponseWithPagination};
use crate::routes::{page_request, parse_json, parse_json_or_default, ApiQuery};
use crate::services::sessions::{self, SessionError, SessionStatus, SessionSummary, SessionView, SubmitOutcome};
use crate::services::types::{CefrLevel, Module};
use crate::services::users;
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 50;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sessions", get(list_sessions).post(create_session))
        .route("/sessions/:id", get(get_session).delete(delete_session))
        .route("/sessions/:id/submit", post(submit_session))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest {
    level: Option<String>,
    topic: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListSessionsQuery {
    page: Option<i64>,
    page_size: Option<i64>,
    status: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeletedResponse {
    id: String,
    deleted: bool,
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::WrongModule(module) => {
                AppError::bad_request(format!("Session belongs to the {module} module"))
            }
            SessionError::AlreadyCompleted => AppError::conflict("Session already completed"),
            SessionError::EvaluationInProgress => {
                AppError::conflict("This session is already being evaluated")
            }
            SessionError::Invalid(message) => AppError::validation(message),
            SessionError::Store(err) => err.into(),
        }
    }
}

async fn create_session(
    State(state): State<AppState>,
    Extension(module): Extension<Module>,
    Extension(user): Extension<AuthUser>,
    body: Bytes,
) -> Result<Response, AppError> {
    let payload: CreateSessionRequest = parse_json_or_default(&body)?;
    let proxy = state.db_proxy();

    let level = match payload.level.as_deref() {
        Some(raw) => CefrLevel::parse(raw)
            .ok_or_else(|| AppError::validation("level must be one of A1, A2, B1, B2, C1, C2"))?,
        None => users::target_level(proxy.as_ref(), &user.id).await?,
    };

    let view = sessions::create(proxy.as_ref(), state.llm(), &user.id, module, level, payload.topic).await?;
    Ok((StatusCode::CREATED, ok(view)).into_response())
}

async fn list_sessions(
    State(state): State<AppState>,
    Extension(module): Extension<Module>,
    Extension(user): Extension<AuthUser>,
    ApiQuery(query): ApiQuery<ListSessionsQuery>,
) -> Result<Json<SuccessResponseWithPagination<Vec<SessionSummary>>>, AppError> {
    let paging = page_request(query.page, query.page_size, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE)?;
    let status = match query.status.as_deref() {
        Some(raw) => Some(
            SessionStatus::parse(raw)
                .ok_or_else(|| AppError::validation("status must be IN_PROGRESS or COMPLETED"))?,
        ),
        None => None,
    };

    let (data, total) = sessions::list(
        state.db_proxy().as_ref(),
        &user.id,
        module,
        status,
        paging.page_size,
        paging.offset,
    )
    .await?;
    Ok(Json(SuccessResponseWithPagination {
        success: true,
        data,
        pagination: PagePagination::new(paging.page, paging.page_size, total),
    }))
}

async fn get_session(
    State(state): State<AppState>,
    Extension(module): Extension<Module>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse<SessionView>>, AppError> {
    let view = sessions::get(state.db_proxy().as_ref(), &user.id, module, &id).await?;
    Ok(ok(view))
}

async fn delete_session(
    State(state): State<AppState>,
    Extension(module): Extension<Module>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse<DeletedResponse>>, AppError> {
    sessions::delete(state.db_proxy().as_ref(), &user.id, module, &id).await?;
    Ok(ok(DeletedResponse { id, deleted: true }))
}

async fn submit_session(
    State(state): State<AppState>,
    Extension(module): Extension<Module>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<SuccessResponse<SubmitOutcome>>, AppError> {
    let payload: Value = parse_json(&body)?;
    if !payload.is_object() {
        return Err(AppError::validation("Request body must be a JSON object"));
    }

    let outcome = sessions::submit(
        state.db_proxy().as_ref(),
        state.evaluators(),
        &user.id,
        module,
        &id,
        &payload,
    )
    .await?;
    Ok(ok(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_errors_map_to_statuses() {
        assert_eq!(
            AppError::from(SessionError::WrongModule(Module::Reading)).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(SessionError::AlreadyCompleted).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(SessionError::EvaluationInProgress).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(SessionError::Invalid("answers must be an array".into())).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
