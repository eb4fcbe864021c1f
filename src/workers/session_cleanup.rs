use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info};

use crate::db::operations::{delete_activity_before, delete_expired_auth_sessions};
use crate::db::DatabaseProxy;

/// Activity older than this no longer feeds any leaderboard.
const ACTIVITY_RETENTION_MS: i64 = 30 * 24 * 60 * 60 * 1000;

#[derive(Debug, Default)]
struct CleanupStats {
    expired_sessions: u64,
    stale_activity: u64,
    duration_secs: f64,
}

pub async fn cleanup_expired_sessions(db: Arc<DatabaseProxy>) -> Result<(), super::WorkerError> {
    let start = Instant::now();
    debug!("Starting session cleanup cycle");

    let now = Utc::now().timestamp_millis();
    let mut stats = CleanupStats {
        expired_sessions: delete_expired_auth_sessions(db.as_ref(), now).await?,
        ..CleanupStats::default()
    };
    stats.stale_activity = delete_activity_before(db.as_ref(), now - ACTIVITY_RETENTION_MS).await?;
    stats.duration_secs = start.elapsed().as_secs_f64();

    info!(
        expired_sessions = stats.expired_sessions,
        stale_activity = stats.stale_activity,
        duration_secs = format!("{:.2}", stats.duration_secs),
        "Session cleanup completed"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::operations::{find_auth_session, insert_auth_session, insert_user, ROLE_USER};

    #[tokio::test]
    async fn test_only_expired_sessions_are_removed() {
        let proxy = Arc::new(DatabaseProxy::connect("sqlite::memory:").await.unwrap());
        insert_user(&proxy, "u1", "u1@example.com", "learner", "hash", ROLE_USER)
            .await
            .unwrap();
        let now = Utc::now().timestamp_millis();
        insert_auth_session(&proxy, "u1", "expired", now - 1_000).await.unwrap();
        insert_auth_session(&proxy, "u1", "live", now + 60_000).await.unwrap();

        cleanup_expired_sessions(Arc::clone(&proxy)).await.unwrap();

        assert!(find_auth_session(&proxy, "expired").await.unwrap().is_none());
        assert!(find_auth_session(&proxy, "live").await.unwrap().is_some());
    }
}
