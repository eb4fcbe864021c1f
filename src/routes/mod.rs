mod admin;
mod auth;
mod feedback;
mod gamification;
mod groups;
mod health;
mod leaderboards;
mod sessions;
mod users;
mod vocabulary;

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Router};
use serde::de::DeserializeOwned;

use crate::middleware::auth::{require_admin, require_auth};
use crate::response::{json_error, AppError};
use crate::services::types::Module;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route(
            "/api/auth/register",
            post(auth::register).fallback(fallback_handler),
        )
        .route(
            "/api/auth/login",
            post(auth::login).fallback(fallback_handler),
        )
        .route(
            "/api/auth/logout",
            post(auth::logout).fallback(fallback_handler),
        )
        .nest("/health", health::router());

    let mut protected = Router::new()
        .route(
            "/api/auth/session",
            get(auth::session).fallback(fallback_handler),
        )
        .route(
            "/api/users/me",
            get(users::me)
                .put(users::update_me)
                .delete(users::delete_me)
                .fallback(fallback_handler),
        )
        .nest("/api/vocabulary", vocabulary::router())
        .nest("/api/gamification", gamification::router())
        .nest("/api/leaderboards", leaderboards::router())
        .nest("/api/groups", groups::router())
        .nest("/api/feedback", feedback::router())
        .nest(
            "/api/admin",
            admin::router().layer(middleware::from_fn(require_admin)),
        );

    for module in Module::ALL.into_iter().filter(|m| m.has_sessions()) {
        protected = protected.nest(
            &format!("/api/{}", module.as_str()),
            sessions::router().layer(Extension(module)),
        );
    }

    let protected = protected.layer(middleware::from_fn_with_state(state.clone(), require_auth));

    public
        .merge(protected)
        .fallback(fallback_handler)
        .with_state(state)
}

async fn fallback_handler() -> Response {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "Endpoint not found").into_response()
}

/// Decodes a JSON request body, answering 400 rather than axum's 422.
pub(crate) fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(AppError::validation("Request body is required"));
    }
    serde_json::from_slice(body).map_err(|err| AppError::validation(format!("Invalid request body: {err}")))
}

/// Like [`parse_json`] but an empty body yields the default value.
pub(crate) fn parse_json_or_default<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    parse_json(body)
}

/// Query-string extractor whose rejection is a JSON 400.
pub(crate) struct ApiQuery<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(ApiQuery(value)),
            Err(rejection) => Err(AppError::validation(format!(
                "Invalid query string: {}",
                rejection.body_text()
            ))),
        }
    }
}

/// Validated page request with a precomputed row offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PageRequest {
    pub page: i64,
    pub page_size: i64,
    pub offset: i64,
}

pub(crate) fn page_request(
    page: Option<i64>,
    page_size: Option<i64>,
    default_size: i64,
    max_size: i64,
) -> Result<PageRequest, AppError> {
    let page = page.unwrap_or(1);
    if page < 1 {
        return Err(AppError::validation("page must be at least 1"));
    }
    let page_size = page_size.unwrap_or(default_size);
    if !(1..=max_size).contains(&page_size) {
        return Err(AppError::validation(format!(
            "pageSize must be between 1 and {max_size}"
        )));
    }
    let offset = (page - 1)
        .checked_mul(page_size)
        .ok_or_else(|| AppError::validation("page is out of range"))?;
    Ok(PageRequest {
        page,
        page_size,
        offset,
    })
}

pub(crate) fn require_text(
    value: Option<String>,
    field: &str,
    min: usize,
    max: usize,
) -> Result<String, AppError> {
    let value = value.map(|v| v.trim().to_string()).unwrap_or_default();
    let len = value.chars().count();
    if len < min || len > max {
        return Err(AppError::validation(format!(
            "{field} must be between {min} and {max} characters"
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize)]
    struct Body {
        name: Option<String>,
    }

    #[test]
    fn test_parse_json_rejects_malformed_body() {
        let err = parse_json::<Body>(b"{not json").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_empty_body_defaults() {
        let body: Body = parse_json_or_default(b"  ").unwrap();
        assert!(body.name.is_none());
        assert!(parse_json::<Body>(b"").is_err());
    }

    #[test]
    fn test_require_text_bounds() {
        assert_eq!(require_text(Some("  ab ".into()), "name", 2, 4).unwrap(), "ab");
        assert!(require_text(Some("a".into()), "name", 2, 4).is_err());
        assert!(require_text(None, "name", 1, 4).is_err());
    }

    #[test]
    fn test_page_request_bounds() {
        let req = page_request(Some(3), Some(20), 10, 50).unwrap();
        assert_eq!(req.offset, 40);
        assert_eq!(page_request(None, None, 10, 50).unwrap().page_size, 10);

        assert!(page_request(Some(0), None, 10, 50).is_err());
        assert!(page_request(None, Some(51), 10, 50).is_err());
        let err = page_request(Some(i64::MAX), Some(50), 10, 50).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
