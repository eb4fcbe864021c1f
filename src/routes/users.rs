use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::db::operations::{find_user_by_id, update_username, UserRecord};
use crate::response::{ok, AppError, SuccessResponse};
use crate::routes::{parse_json, require_text};
use crate::services::gamification::{self, ProfileView};
use crate::services::types::CefrLevel;
use crate::services::users::{self, ProfilePatch, UserProfile, MAX_DAILY_GOAL_MINUTES, MIN_DAILY_GOAL_MINUTES};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeData {
    user: UserRecord,
    profile: UserProfile,
    progress: ProfileView,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateMeRequest {
    username: Option<String>,
    display_name: Option<String>,
    native_language: Option<String>,
    target_level: Option<String>,
    daily_goal_minutes: Option<i64>,
}

impl UpdateMeRequest {
    fn into_patch(self) -> Result<(Option<String>, ProfilePatch), AppError> {
        let username = match self.username {
            Some(name) => Some(require_text(Some(name), "username", 2, 32)?),
            None => None,
        };
        let target_level = match self.target_level.as_deref() {
            Some(level) => Some(
                CefrLevel::parse(level)
                    .ok_or_else(|| AppError::validation("targetLevel must be one of A1, A2, B1, B2, C1, C2"))?,
            ),
            None => None,
        };
        if let Some(minutes) = self.daily_goal_minutes {
            if !(MIN_DAILY_GOAL_MINUTES..=MAX_DAILY_GOAL_MINUTES).contains(&minutes) {
                return Err(AppError::validation(format!(
                    "dailyGoalMinutes must be between {MIN_DAILY_GOAL_MINUTES} and {MAX_DAILY_GOAL_MINUTES}"
                )));
            }
        }
        if self.display_name.as_deref().is_some_and(|n| n.chars().count() > 64) {
            return Err(AppError::validation("displayName must be at most 64 characters"));
        }
        if self.native_language.as_deref().is_some_and(|l| l.chars().count() > 32) {
            return Err(AppError::validation("nativeLanguage must be at most 32 characters"));
        }

        Ok((
            username,
            ProfilePatch {
                display_name: self.display_name,
                native_language: self.native_language,
                target_level,
                daily_goal_minutes: self.daily_goal_minutes,
            },
        ))
    }
}

async fn load_me(state: &AppState, user_id: &str) -> Result<MeData, AppError> {
    let proxy = state.db_proxy();
    let user = find_user_by_id(proxy.as_ref(), user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    let profile = users::ensure_profile(proxy.as_ref(), user_id).await?.data;
    let progress = gamification::get_profile(proxy.as_ref(), user_id).await?;
    Ok(MeData {
        user,
        profile,
        progress,
    })
}

pub async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SuccessResponse<MeData>>, AppError> {
    Ok(ok(load_me(&state, &user.id).await?))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Bytes,
) -> Result<Json<SuccessResponse<MeData>>, AppError> {
    let payload: UpdateMeRequest = parse_json(&body)?;
    let (username, patch) = payload.into_patch()?;

    let proxy = state.db_proxy();
    if let Some(username) = username {
        update_username(proxy.as_ref(), &user.id, &username).await?;
    }
    users::update_profile(proxy.as_ref(), &user.id, patch).await?;

    Ok(ok(load_me(&state, &user.id).await?))
}

pub async fn delete_me(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let token_hash = crate::auth::extract_token(&headers).map(|t| crate::auth::hash_token(&t));
    let cache = state.cache();
    users::delete_account(
        state.db_proxy().as_ref(),
        cache.as_deref(),
        &user.id,
        token_hash.as_deref(),
    )
    .await?;

    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = "auth_token=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0".parse() {
        response_headers.insert(header::SET_COOKIE, cookie);
    }
    Ok((
        response_headers,
        Json(serde_json::json!({ "success": true, "message": "Account deleted" })),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_daily_goal_out_of_range_rejected() {
        let request = UpdateMeRequest {
            daily_goal_minutes: Some(1),
            ..UpdateMeRequest::default()
        };
        assert_eq!(request.into_patch().unwrap_err().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_level_parsed_case_insensitively() {
        let request = UpdateMeRequest {
            target_level: Some("c1".to_string()),
            ..UpdateMeRequest::default()
        };
        let (_, patch) = request.into_patch().unwrap();
        assert_eq!(patch.target_level, Some(CefrLevel::C1));
    }
}
