use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_LEADERBOARD_TTL_SECS: u64 = 15 * 60;
const DEFAULT_EVALUATION_GUARD_TTL_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub database_url: String,
    pub jwt_secret: Option<String>,
    pub jwt_expires_in: String,
    pub redis_url: Option<String>,
    pub leaderboard_ttl: Duration,
    pub evaluation_guard_ttl: Duration,
    pub workers_enabled: bool,
    pub leaderboard_schedule: String,
    pub session_cleanup_schedule: String,
}

impl Config {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3000);

        let host = std::env::var("HOST")
            .ok()
            .and_then(|value| value.parse::<IpAddr>().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let database_url = env_string("DATABASE_URL").unwrap_or_else(default_database_url);

        Self {
            host,
            port,
            log_level,
            database_url,
            jwt_secret: env_string("JWT_SECRET"),
            jwt_expires_in: env_string("JWT_EXPIRES_IN").unwrap_or_else(|| "24h".to_string()),
            redis_url: env_string("REDIS_URL"),
            leaderboard_ttl: Duration::from_secs(
                env_u64("LEADERBOARD_TTL_SECS").unwrap_or(DEFAULT_LEADERBOARD_TTL_SECS),
            ),
            evaluation_guard_ttl: Duration::from_secs(
                env_u64("EVALUATION_GUARD_TTL_SECS").unwrap_or(DEFAULT_EVALUATION_GUARD_TTL_SECS),
            ),
            workers_enabled: env_bool("WORKERS_ENABLED").unwrap_or(true),
            leaderboard_schedule: env_string("LEADERBOARD_SCHEDULE")
                .unwrap_or_else(|| "0 */15 * * * *".to_string()),
            session_cleanup_schedule: env_string("SESSION_CLEANUP_SCHEDULE")
                .unwrap_or_else(|| "0 0 * * * *".to_string()),
        }
    }

    /// In-memory store, fixed secret, no workers.
    pub fn for_tests() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            log_level: "warn".to_string(),
            database_url: "sqlite::memory:".to_string(),
            jwt_secret: Some("test-secret-for-lingo-backend".to_string()),
            jwt_expires_in: "1h".to_string(),
            redis_url: None,
            leaderboard_ttl: Duration::from_secs(DEFAULT_LEADERBOARD_TTL_SECS),
            evaluation_guard_ttl: Duration::from_secs(DEFAULT_EVALUATION_GUARD_TTL_SECS),
            workers_enabled: false,
            leaderboard_schedule: "0 */15 * * * *".to_string(),
            session_cleanup_schedule: "0 0 * * * *".to_string(),
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

pub fn default_sqlite_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lingo-backend")
        .join("lingo.db")
}

fn default_database_url() -> String {
    format!("sqlite:{}?mode=rwc", default_sqlite_path().display())
}

pub(crate) fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub(crate) fn env_u64(key: &str) -> Option<u64> {
    env_string(key)?.parse().ok()
}

pub(crate) fn env_bool(key: &str) -> Option<bool> {
    let value = std::env::var(key).ok()?;
    let normalized = value.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return None;
    }
    match normalized.as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sqlite_path_file_name() {
        let path = default_sqlite_path();
        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("lingo.db"));
    }

    #[test]
    fn test_for_tests_uses_memory_store() {
        let config = Config::for_tests();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert!(config.jwt_secret.is_some());
        assert!(!config.workers_enabled);
    }
}
