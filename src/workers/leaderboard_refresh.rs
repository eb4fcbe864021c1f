use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::db::DatabaseProxy;
use crate::services::leaderboard;

pub async fn refresh_leaderboards(db: Arc<DatabaseProxy>, ttl: Duration) -> Result<(), super::WorkerError> {
    let start = Instant::now();
    debug!("Starting leaderboard refresh cycle");

    let refreshed = leaderboard::refresh_all(db.as_ref(), ttl).await?;

    info!(
        leaderboards = refreshed,
        duration_secs = format!("{:.2}", start.elapsed().as_secs_f64()),
        "Leaderboard refresh completed"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::documents;
    use crate::db::Collection;
    use crate::services::leaderboard::{LeaderboardKind, LeaderboardSnapshot};

    #[tokio::test]
    async fn test_refresh_stores_every_kind() {
        let proxy = Arc::new(DatabaseProxy::connect("sqlite::memory:").await.unwrap());
        refresh_leaderboards(Arc::clone(&proxy), Duration::from_secs(60))
            .await
            .unwrap();

        for kind in LeaderboardKind::all() {
            let stored = documents::get::<LeaderboardSnapshot>(&proxy, Collection::Leaderboards, kind.as_str())
                .await
                .unwrap();
            assert!(stored.is_some(), "missing snapshot for {kind}");
        }
    }
}
