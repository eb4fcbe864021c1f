use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::response::{ok, AppError, SuccessResponse};
use crate::routes::{parse_json, require_text};
use crate::services::feedback::{self, FeedbackCategory, FeedbackError, TicketView};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_mine).post(create_ticket))
        .route("/:id", get(get_ticket))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTicketRequest {
    category: Option<String>,
    subject: Option<String>,
    message: Option<String>,
}

impl From<FeedbackError> for AppError {
    fn from(err: FeedbackError) -> Self {
        match err {
            FeedbackError::TicketClosed => AppError::validation("A closed ticket cannot be reopened"),
            FeedbackError::Store(err) => err.into(),
        }
    }
}

async fn create_ticket(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Bytes,
) -> Result<Response, AppError> {
    let payload: CreateTicketRequest = parse_json(&body)?;
    let category = match payload.category.as_deref() {
        Some(raw) => FeedbackCategory::parse(raw)
            .ok_or_else(|| AppError::validation("category must be BUG, CONTENT, FEATURE or OTHER"))?,
        None => FeedbackCategory::Other,
    };
    let subject = require_text(payload.subject, "subject", 3, 120)?;
    let message = require_text(payload.message, "message", 10, 2000)?;

    let ticket = feedback::create(state.db_proxy().as_ref(), &user.id, category, &subject, &message).await?;
    Ok((StatusCode::CREATED, ok(ticket)).into_response())
}

async fn list_mine(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SuccessResponse<Vec<TicketView>>>, AppError> {
    Ok(ok(feedback::list_for_user(state.db_proxy().as_ref(), &user.id).await?))
}

async fn get_ticket(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse<TicketView>>, AppError> {
    Ok(ok(feedback::get(state.db_proxy().as_ref(), &user, &id).await?))
}
