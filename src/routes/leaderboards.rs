use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::response::{ok, AppError, SuccessResponse};
use crate::routes::ApiQuery;
use crate::services::leaderboard::{self, LeaderboardEntry, LeaderboardKind, DEFAULT_LIMIT, MAX_ENTRIES};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/:kind", get(get_leaderboard))
}

#[derive(Debug, Deserialize)]
struct LeaderboardQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LeaderboardData {
    kind: String,
    entries: Vec<LeaderboardEntry>,
    me: Option<LeaderboardEntry>,
    computed_at: i64,
    expires_at: i64,
}

async fn get_leaderboard(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(kind): Path<String>,
    ApiQuery(query): ApiQuery<LeaderboardQuery>,
) -> Result<Json<SuccessResponse<LeaderboardData>>, AppError> {
    let kind = LeaderboardKind::parse(&kind).ok_or_else(|| {
        let known: Vec<String> = LeaderboardKind::all().iter().map(|k| k.to_string()).collect();
        AppError::validation(format!("kind must be one of {}", known.join(", ")))
    })?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_ENTRIES).contains(&limit) {
        return Err(AppError::validation(format!(
            "limit must be between 1 and {MAX_ENTRIES}"
        )));
    }

    let snapshot = leaderboard::get(state.db_proxy().as_ref(), kind, state.config().leaderboard_ttl).await?;
    let me = snapshot.entry_for(&user.id).cloned();
    let mut entries = snapshot.entries;
    entries.truncate(limit);

    Ok(ok(LeaderboardData {
        kind: snapshot.kind,
        entries,
        me,
        computed_at: snapshot.computed_at,
        expires_at: snapshot.expires_at,
    }))
}
