mod leaderboard_refresh;
mod session_cleanup;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db::{DatabaseProxy, StoreError};

pub use leaderboard_refresh::refresh_leaderboards;
pub use session_cleanup::cleanup_expired_sessions;

pub struct WorkerManager {
    scheduler: Mutex<JobScheduler>,
    shutdown_tx: broadcast::Sender<()>,
    db_proxy: Arc<DatabaseProxy>,
    leaderboard_schedule: String,
    session_cleanup_schedule: String,
    leaderboard_ttl: Duration,
}

impl WorkerManager {
    pub async fn new(db_proxy: Arc<DatabaseProxy>, config: &Config) -> Result<Self, WorkerError> {
        let scheduler = JobScheduler::new().await.map_err(WorkerError::Scheduler)?;
        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            scheduler: Mutex::new(scheduler),
            shutdown_tx,
            db_proxy,
            leaderboard_schedule: config.leaderboard_schedule.clone(),
            session_cleanup_schedule: config.session_cleanup_schedule.clone(),
            leaderboard_ttl: config.leaderboard_ttl,
        })
    }

    pub async fn start(&self) -> Result<(), WorkerError> {
        let scheduler = self.scheduler.lock().await;

        {
            let db = Arc::clone(&self.db_proxy);
            let ttl = self.leaderboard_ttl;
            let shutdown_rx = self.shutdown_tx.subscribe();
            let job = Job::new_async(self.leaderboard_schedule.as_str(), move |_uuid, _lock| {
                let db = Arc::clone(&db);
                let mut rx = shutdown_rx.resubscribe();
                Box::pin(async move {
                    tokio::select! {
                        _ = rx.recv() => {},
                        result = refresh_leaderboards(db, ttl) => {
                            if let Err(e) = result {
                                error!(error = %e, "Leaderboard refresh worker error");
                            }
                        }
                    }
                })
            })
            .map_err(WorkerError::Scheduler)?;
            scheduler.add(job).await.map_err(WorkerError::Scheduler)?;
            info!(schedule = %self.leaderboard_schedule, "Leaderboard refresh worker scheduled");
        }

        {
            let db = Arc::clone(&self.db_proxy);
            let shutdown_rx = self.shutdown_tx.subscribe();
            let job = Job::new_async(self.session_cleanup_schedule.as_str(), move |_uuid, _lock| {
                let db = Arc::clone(&db);
                let mut rx = shutdown_rx.resubscribe();
                Box::pin(async move {
                    tokio::select! {
                        _ = rx.recv() => {},
                        result = cleanup_expired_sessions(db) => {
                            if let Err(e) = result {
                                error!(error = %e, "Session cleanup worker error");
                            }
                        }
                    }
                })
            })
            .map_err(WorkerError::Scheduler)?;
            scheduler.add(job).await.map_err(WorkerError::Scheduler)?;
            info!(schedule = %self.session_cleanup_schedule, "Session cleanup worker scheduled");
        }

        scheduler.start().await.map_err(WorkerError::Scheduler)?;
        info!("All workers started");

        Ok(())
    }

    pub async fn stop(&self) {
        info!("Stopping workers...");
        let _ = self.shutdown_tx.send(());

        let mut scheduler = self.scheduler.lock().await;
        if let Err(e) = scheduler.shutdown().await {
            warn!(error = %e, "Error shutting down scheduler");
        }

        info!("Workers stopped");
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
