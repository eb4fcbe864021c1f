use std::str::FromStr;

use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::env_bool;

pub struct FileLogGuard {
    _guard: WorkerGuard,
}

pub fn file_logging_enabled() -> bool {
    env_bool("ENABLE_FILE_LOGS").unwrap_or(false)
}

/// Dependencies that flood the log at debug level.
const NOISY_TARGETS: &[(&str, LevelFilter)] = &[
    ("sqlx", LevelFilter::WARN),
    ("hyper", LevelFilter::WARN),
    ("reqwest", LevelFilter::WARN),
    ("tokio_cron_scheduler", LevelFilter::WARN),
    ("tower_http", LevelFilter::INFO),
];

/// A bare level such as `debug` is expanded so the noisy targets stay capped;
/// explicit directives (`lingo_backend=trace,sqlx=debug`) pass through untouched.
pub fn filter_directives(log_level: &str) -> String {
    let raw = log_level.trim();
    if raw.contains('=') || raw.contains(',') {
        return raw.to_string();
    }
    let level = LevelFilter::from_str(raw).unwrap_or(LevelFilter::INFO);
    let mut directives = vec![level.to_string()];
    for (target, cap) in NOISY_TARGETS {
        directives.push(format!("{target}={}", level.min(*cap)));
    }
    directives.join(",")
}

pub fn init_tracing(log_level: &str) -> Option<FileLogGuard> {
    let env_filter = EnvFilter::try_new(filter_directives(log_level))
        .unwrap_or_else(|_| EnvFilter::new(filter_directives("info")));
    let stdout_layer = fmt::layer().with_target(true);

    if file_logging_enabled() {
        let log_dir = std::env::var("LOG_DIR").unwrap_or_else(|_| "./logs".to_string());
        if let Err(err) = std::fs::create_dir_all(&log_dir) {
            eprintln!("failed to create log directory {log_dir}: {err}");
        } else {
            let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "lingo.log");
            let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
            let file_layer = fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_target(true);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(stdout_layer)
                .with(file_layer)
                .init();

            return Some(FileLogGuard { _guard: guard });
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .init();

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_level_caps_noisy_targets() {
        let directives = filter_directives("debug");
        assert!(directives.starts_with("debug,"));
        assert!(directives.contains("sqlx=warn"));
        assert!(directives.contains("tower_http=info"));
    }

    #[test]
    fn test_quieter_level_wins_over_cap() {
        let directives = filter_directives("error");
        assert!(directives.contains("sqlx=error"));
        assert!(directives.contains("tower_http=error"));
    }

    #[test]
    fn test_explicit_directives_pass_through() {
        assert_eq!(filter_directives(" lingo_backend=trace "), "lingo_backend=trace");
        assert!(filter_directives("nonsense").starts_with("info,"));
        assert!(EnvFilter::try_new(filter_directives("warn")).is_ok());
    }
}
