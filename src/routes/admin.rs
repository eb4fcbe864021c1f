use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::routing::{get, put};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::db::operations::{count_users, find_user_by_id, set_user_role, UserRecord, ROLE_ADMIN, ROLE_USER};
use crate::response::{ok, AppError, PagePagination, SuccessResponse, SuccessResponseWithPagination};
use crate::routes::{page_request, parse_json, ApiQuery};
use crate::services::feedback::{self, TicketStatus, TicketView};
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stats", get(stats))
        .route("/feedback", get(list_feedback))
        .route("/feedback/:id/status", put(update_feedback_status))
        .route("/users/:id/role", put(update_user_role))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedbackQuery {
    status: Option<String>,
    page: Option<i64>,
    page_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateStatusRequest {
    status: Option<String>,
    admin_note: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateRoleRequest {
    role: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AdminStats {
    users: i64,
    evaluations_in_flight: usize,
    uptime: u64,
}

async fn stats(State(state): State<AppState>) -> Result<Json<SuccessResponse<AdminStats>>, AppError> {
    let users = count_users(state.db_proxy().as_ref()).await?;
    Ok(ok(AdminStats {
        users,
        evaluations_in_flight: state.evaluators().guard.in_flight(),
        uptime: state.uptime_seconds(),
    }))
}

async fn list_feedback(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<FeedbackQuery>,
) -> Result<Json<SuccessResponseWithPagination<Vec<TicketView>>>, AppError> {
    let paging = page_request(query.page, query.page_size, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE)?;
    let status = match query.status.as_deref() {
        Some(raw) => Some(TicketStatus::parse(raw).ok_or_else(|| {
            AppError::validation("status must be OPEN, IN_PROGRESS, RESOLVED or CLOSED")
        })?),
        None => None,
    };

    let (data, total) =
        feedback::list_all(state.db_proxy().as_ref(), status, paging.page_size, paging.offset).await?;
    Ok(Json(SuccessResponseWithPagination {
        success: true,
        data,
        pagination: PagePagination::new(paging.page, paging.page_size, total),
    }))
}

async fn update_feedback_status(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<SuccessResponse<TicketView>>, AppError> {
    let payload: UpdateStatusRequest = parse_json(&body)?;
    let status = payload
        .status
        .as_deref()
        .and_then(TicketStatus::parse)
        .ok_or_else(|| AppError::validation("status must be OPEN, IN_PROGRESS, RESOLVED or CLOSED"))?;
    if payload
        .admin_note
        .as_deref()
        .is_some_and(|n| n.chars().count() > 2000)
    {
        return Err(AppError::validation("adminNote must be at most 2000 characters"));
    }

    let ticket = feedback::update_status(state.db_proxy().as_ref(), &id, status, payload.admin_note).await?;
    tracing::info!(ticket_id = %id, status = status.as_str(), admin_id = %admin.id, "feedback status updated");
    Ok(ok(ticket))
}

/// Cached auth sessions keep the old role until they expire.
async fn update_user_role(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<SuccessResponse<UserRecord>>, AppError> {
    let payload: UpdateRoleRequest = parse_json(&body)?;
    let role = match payload.role.as_deref().map(|r| r.trim().to_ascii_uppercase()) {
        Some(role) if role == ROLE_ADMIN => ROLE_ADMIN,
        Some(role) if role == ROLE_USER => ROLE_USER,
        _ => return Err(AppError::validation("role must be ADMIN or USER")),
    };
    if id == admin.id && role != ROLE_ADMIN {
        return Err(AppError::validation("Administrators cannot demote themselves"));
    }

    let proxy = state.db_proxy();
    if find_user_by_id(proxy.as_ref(), &id).await?.is_none() {
        return Err(AppError::not_found("User not found"));
    }
    set_user_role(proxy.as_ref(), &id, role).await?;
    tracing::info!(user_id = %id, role, admin_id = %admin.id, "user role changed");

    let user = find_user_by_id(proxy.as_ref(), &id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(ok(user))
}
