pub mod documents;
pub mod operations;
pub mod schema;

use std::str::FromStr;
use std::time::{Duration, Instant};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use thiserror::Error;

pub use documents::{Collection, DocFilter, Document};

#[derive(Debug, Error)]
pub enum DbInitError {
    #[error("invalid database url: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found")]
    NotFound,
    #[error("document belongs to another user")]
    Forbidden,
    #[error("write conflict")]
    Conflict,
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct DatabaseProxy {
    pool: SqlitePool,
    url: String,
}

impl DatabaseProxy {
    pub async fn connect(url: &str) -> Result<Self, DbInitError> {
        let in_memory = is_memory_url(url);

        let mut options = SqliteConnectOptions::from_str(url)
            .map_err(|e| DbInitError::Config(e.to_string()))?
            .create_if_missing(true)
            .foreign_keys(true);

        let mut pool_options = SqlitePoolOptions::new();

        if in_memory {
            // every connection to :memory: is a fresh database
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        } else {
            let filename = options.clone().get_filename().to_path_buf();
            if let Some(parent) = filename.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| DbInitError::Io(e.to_string()))?;
                }
            }
            options = options
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(Duration::from_secs(30));
            pool_options = pool_options
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(5));
        }

        let pool = pool_options.connect_with(options).await?;
        schema::run_migrations(&pool).await?;

        tracing::info!(in_memory, "document store ready");

        Ok(Self {
            pool,
            url: url.to_string(),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn connection_string(&self) -> &str {
        &self.url
    }

    pub async fn ping(&self) -> Result<Duration, sqlx::Error> {
        let start = Instant::now();
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(start.elapsed())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_memory_url() {
        assert!(is_memory_url("sqlite::memory:"));
        assert!(is_memory_url("sqlite:file:shared?mode=memory&cache=shared"));
        assert!(!is_memory_url("sqlite:/var/lib/lingo/lingo.db?mode=rwc"));
    }

    #[tokio::test]
    async fn test_file_backed_store_creates_parent_dir() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("nested").join("lingo.db");
        let url = format!("sqlite:{}?mode=rwc", path.display());

        let proxy = DatabaseProxy::connect(&url).await.expect("connect");
        assert!(proxy.ping().await.is_ok());
        assert!(path.exists());
        proxy.close().await;
    }
}
