use axum::extract::State;
use axum::routing::get;
use axum::{Extension, Json, Router};

use crate::auth::AuthUser;
use crate::response::{ok, AppError, SuccessResponse};
use crate::services::gamification::{self, ProfileView};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/profile", get(profile))
}

async fn profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SuccessResponse<ProfileView>>, AppError> {
    Ok(ok(gamification::get_profile(state.db_proxy().as_ref(), &user.id).await?))
}
