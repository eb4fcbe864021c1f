use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::response::{ok, AppError, SuccessResponse};
use crate::routes::{parse_json, require_text};
use crate::services::groups::{self, GroupError, GroupRole, GroupView};
use crate::services::leaderboard::LeaderboardEntry;
use crate::state::AppState;

const MAX_DESCRIPTION_CHARS: usize = 500;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_groups).post(create_group))
        .route("/join", post(join_group))
        .route("/:id", get(get_group).delete(delete_group))
        .route("/:id/leave", post(leave_group))
        .route("/:id/leaderboard", get(group_leaderboard))
        .route(
            "/:id/members/:user_id",
            put(set_member_role).delete(remove_member),
        )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateGroupRequest {
    name: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinGroupRequest {
    invite_code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetRoleRequest {
    role: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LeaveResponse {
    left: bool,
    group_deleted: bool,
    group: Option<GroupView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeletedResponse {
    id: String,
    deleted: bool,
}

impl From<GroupError> for AppError {
    fn from(err: GroupError) -> Self {
        match err {
            GroupError::NotFound => AppError::not_found("Group not found"),
            GroupError::NotMember => AppError::forbidden("You are not a member of this group"),
            GroupError::NotAdmin => AppError::forbidden("Only group admins can do this"),
            GroupError::AlreadyMember => AppError::conflict("You are already a member of this group"),
            GroupError::MemberNotFound => AppError::not_found("Member not found"),
            GroupError::LastAdmin => AppError::validation("A group needs at least one admin"),
            GroupError::CannotRemoveSelf => AppError::validation("Use leave to remove yourself"),
            GroupError::Store(err) => err.into(),
        }
    }
}

async fn create_group(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Bytes,
) -> Result<Response, AppError> {
    let payload: CreateGroupRequest = parse_json(&body)?;
    let name = require_text(payload.name, "name", 3, 60)?;
    let description = payload
        .description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());
    if description
        .as_deref()
        .is_some_and(|d| d.chars().count() > MAX_DESCRIPTION_CHARS)
    {
        return Err(AppError::validation(format!(
            "description must be at most {MAX_DESCRIPTION_CHARS} characters"
        )));
    }

    let view = groups::create(state.db_proxy().as_ref(), &user.id, &name, description).await?;
    tracing::info!(group_id = %view.id, user_id = %user.id, "group created");
    Ok((StatusCode::CREATED, ok(view)).into_response())
}

async fn list_groups(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SuccessResponse<Vec<GroupView>>>, AppError> {
    Ok(ok(groups::list_for_user(state.db_proxy().as_ref(), &user.id).await?))
}

async fn join_group(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Bytes,
) -> Result<Json<SuccessResponse<GroupView>>, AppError> {
    let payload: JoinGroupRequest = parse_json(&body)?;
    let code = require_text(payload.invite_code, "inviteCode", 1, 32)?;
    Ok(ok(groups::join(state.db_proxy().as_ref(), &code, &user.id).await?))
}

async fn get_group(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse<GroupView>>, AppError> {
    Ok(ok(groups::get(state.db_proxy().as_ref(), &id, &user.id).await?))
}

async fn delete_group(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse<DeletedResponse>>, AppError> {
    groups::delete(state.db_proxy().as_ref(), &id, &user.id).await?;
    Ok(ok(DeletedResponse { id, deleted: true }))
}

async fn leave_group(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse<LeaveResponse>>, AppError> {
    let group = groups::leave(state.db_proxy().as_ref(), &id, &user.id).await?;
    Ok(ok(LeaveResponse {
        left: true,
        group_deleted: group.is_none(),
        group,
    }))
}

async fn group_leaderboard(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse<Vec<LeaderboardEntry>>>, AppError> {
    Ok(ok(groups::leaderboard(state.db_proxy().as_ref(), &id, &user.id).await?))
}

async fn set_member_role(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((id, member_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<SuccessResponse<GroupView>>, AppError> {
    let payload: SetRoleRequest = parse_json(&body)?;
    let role = payload
        .role
        .as_deref()
        .and_then(GroupRole::parse)
        .ok_or_else(|| AppError::validation("role must be ADMIN or MEMBER"))?;
    Ok(ok(
        groups::set_role(state.db_proxy().as_ref(), &id, &user.id, &member_id, role).await?,
    ))
}

async fn remove_member(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((id, member_id)): Path<(String, String)>,
) -> Result<Json<SuccessResponse<GroupView>>, AppError> {
    Ok(ok(
        groups::remove_member(state.db_proxy().as_ref(), &id, &user.id, &member_id).await?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_errors_map_to_statuses() {
        assert_eq!(AppError::from(GroupError::NotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::from(GroupError::NotMember).status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::from(GroupError::NotAdmin).status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::from(GroupError::AlreadyMember).status(), StatusCode::CONFLICT);
        assert_eq!(AppError::from(GroupError::LastAdmin).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::from(GroupError::CannotRemoveSelf).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
