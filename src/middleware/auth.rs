use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::auth::{AuthError, AuthUser};
use crate::response::json_error;
use crate::state::AppState;

/// Expiry of the presented token's auth session, in epoch milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct SessionExpiry(pub i64);

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = crate::auth::extract_token(req.headers()) else {
        return json_error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Authentication token missing")
            .into_response();
    };

    let Some(secret) = state.config().jwt_secret.clone() else {
        return json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            "Authentication is not configured",
        )
        .into_response();
    };

    let proxy = state.db_proxy();
    let cache = state.cache();
    match crate::auth::verify_request_token_cached(proxy.as_ref(), &token, &secret, cache.as_deref()).await {
        Ok((user, expires_at)) => {
            req.extensions_mut().insert(user);
            req.extensions_mut().insert(SessionExpiry(expires_at));
            next.run(req).await
        }
        Err(AuthError::Database(err)) => {
            tracing::error!(error = %err, "auth session lookup failed");
            json_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                "Authentication service unavailable",
            )
            .into_response()
        }
        Err(_) => json_error(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            "Authentication failed, please sign in again",
        )
        .into_response(),
    }
}

/// Runs after `require_auth`.
pub async fn require_admin(req: Request<Body>, next: Next) -> Response {
    match req.extensions().get::<AuthUser>() {
        Some(user) if user.is_admin() => next.run(req).await,
        Some(_) => json_error(StatusCode::FORBIDDEN, "FORBIDDEN", "Administrator access required")
            .into_response(),
        None => json_error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Authentication token missing")
            .into_response(),
    }
}
