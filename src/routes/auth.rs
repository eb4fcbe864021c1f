use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{AuthError, AuthUser};
use crate::cache::keys;
use crate::config::{env_bool, Config};
use crate::db::operations::{
    delete_auth_session, find_user_by_email, insert_auth_session, insert_user, UserRecord, ROLE_USER,
};
use crate::db::StoreError;
use crate::middleware::auth::SessionExpiry;
use crate::response::{ok, AppError, SuccessResponse};
use crate::routes::{parse_json, require_text};
use crate::services::{gamification, users};
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 128;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    email: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthData {
    token: String,
    expires_at: i64,
    user: AuthUser,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    valid: bool,
    user: AuthUser,
    expires_at: i64,
}

pub async fn register(State(state): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let payload: RegisterRequest = parse_json(&body)?;
    let email = normalize_email(payload.email)?;
    let username = require_text(payload.username, "username", 2, 32)?;
    let password = validate_password(payload.password)?;
    let secret = jwt_secret(state.config())?;

    let password_hash = crate::auth::hash_password(&password).map_err(|err| {
        tracing::error!(error = %err, "password hashing failed");
        AppError::internal("password hashing failed")
    })?;

    let proxy = state.db_proxy();
    let user = match insert_user(
        proxy.as_ref(),
        &Uuid::new_v4().to_string(),
        &email,
        &username,
        &password_hash,
        ROLE_USER,
    )
    .await
    {
        Ok(user) => user,
        Err(StoreError::Conflict) => {
            return Err(AppError::conflict("An account with this email already exists"))
        }
        Err(err) => return Err(err.into()),
    };

    gamification::ensure_profile(proxy.as_ref(), &user.id).await?;
    users::ensure_profile(proxy.as_ref(), &user.id).await?;

    let data = issue_session(&state, &secret, user).await?;
    tracing::info!(user_id = %data.user.id, "user registered");
    Ok(auth_response(StatusCode::CREATED, &state, data))
}

pub async fn login(State(state): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let payload: LoginRequest = parse_json(&body)?;
    let (Some(email), Some(password)) = (payload.email, payload.password) else {
        return Err(AppError::validation("email and password are required"));
    };
    let secret = jwt_secret(state.config())?;

    let proxy = state.db_proxy();
    let email = email.trim().to_lowercase();
    let user = find_user_by_email(proxy.as_ref(), &email).await?;
    let Some(user) = user.filter(|u| crate::auth::verify_password(&password, &u.password_hash)) else {
        tracing::debug!("login rejected");
        return Err(AppError::unauthorized("Invalid email or password"));
    };

    let data = issue_session(&state, &secret, user).await?;
    Ok(auth_response(StatusCode::OK, &state, data))
}

/// Idempotent: an unknown or missing token still clears the cookie.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, AppError> {
    if let Some(token) = crate::auth::extract_token(&headers) {
        let token_hash = crate::auth::hash_token(&token);
        delete_auth_session(state.db_proxy().as_ref(), &token_hash).await?;
        if let Some(cache) = state.cache() {
            cache.delete(&keys::session_key(&token_hash)).await;
        }
    }

    let mut response_headers = HeaderMap::new();
    if let Some(cookie) = clear_auth_cookie_header() {
        response_headers.insert(header::SET_COOKIE, cookie);
    }
    Ok((
        response_headers,
        Json(serde_json::json!({ "success": true, "message": "Logged out" })),
    )
        .into_response())
}

/// Heartbeat polled by the client; reaching the handler means the session is live.
pub async fn session(
    Extension(user): Extension<AuthUser>,
    Extension(SessionExpiry(expires_at)): Extension<SessionExpiry>,
) -> Json<SuccessResponse<SessionData>> {
    ok(SessionData {
        valid: true,
        user,
        expires_at,
    })
}

async fn issue_session(state: &AppState, secret: &str, user: UserRecord) -> Result<AuthData, AppError> {
    let (token, expires_at) = crate::auth::sign_jwt_for_user(&user.id, secret, &state.config().jwt_expires_in)
        .map_err(|err| match err {
            AuthError::InvalidExpiresIn => AppError::unavailable("Authentication is misconfigured"),
            other => {
                tracing::error!(error = %other, "token signing failed");
                AppError::internal("token signing failed")
            }
        })?;

    insert_auth_session(
        state.db_proxy().as_ref(),
        &user.id,
        &crate::auth::hash_token(&token),
        expires_at,
    )
    .await?;

    Ok(AuthData {
        token,
        expires_at,
        user: AuthUser {
            id: user.id,
            email: user.email,
            username: user.username,
            role: user.role,
            created_at: user.created_at,
        },
    })
}

fn auth_response(status: StatusCode, state: &AppState, data: AuthData) -> Response {
    let mut headers = HeaderMap::new();
    if let Some(cookie) = auth_cookie_header(&data.token, state.config()) {
        headers.insert(header::SET_COOKIE, cookie);
    }
    (status, headers, ok(data)).into_response()
}

fn jwt_secret(config: &Config) -> Result<String, AppError> {
    config
        .jwt_secret
        .clone()
        .ok_or_else(|| AppError::unavailable("Authentication is not configured"))
}

fn normalize_email(email: Option<String>) -> Result<String, AppError> {
    let email = email.map(|e| e.trim().to_lowercase()).unwrap_or_default();
    let valid = email.len() <= 254
        && email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty());
    if !valid {
        return Err(AppError::validation("A valid email address is required"));
    }
    Ok(email)
}

fn validate_password(password: Option<String>) -> Result<String, AppError> {
    let password = password.unwrap_or_default();
    let len = password.chars().count();
    if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len) {
        return Err(AppError::validation(format!(
            "password must be between {MIN_PASSWORD_LEN} and {MAX_PASSWORD_LEN} characters"
        )));
    }
    Ok(password)
}

fn secure_cookies() -> bool {
    env_bool("COOKIE_SECURE").unwrap_or(false)
}

fn auth_cookie_header(token: &str, config: &Config) -> Option<HeaderValue> {
    let max_age = crate::auth::parse_expires_in_ms(&config.jwt_expires_in)
        .map(|ms| ms / 1000)
        .unwrap_or(86400);

    let mut cookie = format!("auth_token={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
    if secure_cookies() {
        cookie.push_str("; Secure");
    }

    HeaderValue::from_str(&cookie).ok()
}

fn clear_auth_cookie_header() -> Option<HeaderValue> {
    let mut cookie =
        "auth_token=; Path=/; HttpOnly; SameSite=Lax; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=0"
            .to_string();
    if secure_cookies() {
        cookie.push_str("; Secure");
    }

    HeaderValue::from_str(&cookie).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_is_normalized() {
        assert_eq!(
            normalize_email(Some("  Ana@Example.COM ".into())).unwrap(),
            "ana@example.com"
        );
        assert!(normalize_email(Some("no-at-sign".into())).is_err());
        assert!(normalize_email(Some("@domain".into())).is_err());
        assert!(normalize_email(None).is_err());
    }

    #[test]
    fn test_password_length() {
        assert!(validate_password(Some("short".into())).is_err());
        assert!(validate_password(Some("long enough".into())).is_ok());
    }

    #[test]
    fn test_cookie_uses_configured_lifetime() {
        let config = Config::for_tests();
        let cookie = auth_cookie_header("abc", &config).unwrap();
        assert!(cookie.to_str().unwrap().contains("Max-Age=3600"));
    }
}
