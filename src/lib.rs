pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod logging;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;
pub mod workers;

use std::sync::Arc;

use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::cache::RedisCache;
use crate::config::Config;
use crate::db::{DatabaseProxy, DbInitError};
use crate::services::llm_provider::LLMProvider;
use crate::services::speech::SpeechAnalyzer;
use crate::state::AppState;

/// Connects the store and optional cache described by `config` and builds
/// the full application router. Workers are not started.
pub async fn create_app(config: Config) -> Result<axum::Router, DbInitError> {
    let state = build_state(config).await?;
    Ok(create_app_with_state(state))
}

pub fn create_app_with_state(state: AppState) -> axum::Router {
    routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn build_state(config: Config) -> Result<AppState, DbInitError> {
    let db_proxy = Arc::new(DatabaseProxy::connect(&config.database_url).await?);
    let cache = connect_cache(&config).await;
    Ok(AppState::new(
        config,
        db_proxy,
        cache,
        LLMProvider::from_env(),
        SpeechAnalyzer::from_env(),
    ))
}

/// Redis is optional; a failed connection falls back to database lookups.
async fn connect_cache(config: &Config) -> Option<Arc<RedisCache>> {
    let url = config.redis_url.as_deref()?;
    match RedisCache::connect(url).await {
        Ok(cache) => {
            tracing::info!("redis session cache connected");
            Some(Arc::new(cache))
        }
        Err(err) => {
            tracing::warn!(error = %err, "redis unavailable, auth sessions will not be cached");
            None
        }
    }
}
