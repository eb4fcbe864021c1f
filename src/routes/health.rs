use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/info", get(info))
        .route("/live", get(live))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    database: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    database_latency_ms: Option<u64>,
    cache: &'static str,
    timestamp: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthInfoResponse {
    service: &'static str,
    version: &'static str,
    start_time: String,
    uptime: u64,
    llm_available: bool,
    speech_available: bool,
    workers_enabled: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LivenessResponse {
    status: &'static str,
    timestamp: String,
    uptime: u64,
}

async fn root(State(state): State<AppState>) -> Response {
    let ping = state.db_proxy().ping().await;
    let cache = match state.cache() {
        Some(cache) if cache.is_connected().await => "connected",
        Some(_) => "disconnected",
        None => "disabled",
    };

    let (status_code, response) = match ping {
        Ok(latency) => (
            StatusCode::OK,
            HealthResponse {
                status: "ok",
                database: "connected",
                database_latency_ms: Some(latency.as_millis() as u64),
                cache,
                timestamp: now_iso(),
            },
        ),
        Err(err) => {
            tracing::warn!(error = %err, "health check database ping failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                HealthResponse {
                    status: "degraded",
                    database: "disconnected",
                    database_latency_ms: None,
                    cache,
                    timestamp: now_iso(),
                },
            )
        }
    };

    (status_code, Json(response)).into_response()
}

async fn info(State(state): State<AppState>) -> Response {
    Json(HealthInfoResponse {
        service: "lingo-backend",
        version: env!("CARGO_PKG_VERSION"),
        start_time: system_time_iso(state.started_at_system()),
        uptime: state.uptime_seconds(),
        llm_available: state.llm().is_available(),
        speech_available: state.speech().is_available(),
        workers_enabled: state.config().workers_enabled,
    })
    .into_response()
}

async fn live(State(state): State<AppState>) -> Response {
    Json(LivenessResponse {
        status: "healthy",
        timestamp: now_iso(),
        uptime: state.uptime_seconds(),
    })
    .into_response()
}

fn system_time_iso(time: std::time::SystemTime) -> String {
    let datetime: chrono::DateTime<chrono::Utc> = time.into();
    datetime.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
