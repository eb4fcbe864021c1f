use std::net::SocketAddr;
use std::sync::Arc;

use lingo_backend::config::Config;
use lingo_backend::logging::init_tracing;
use lingo_backend::workers::WorkerManager;
use lingo_backend::{build_state, create_app_with_state};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = init_tracing(&config.log_level);

    if config.jwt_secret.is_none() {
        tracing::warn!("JWT_SECRET is not set, authentication endpoints will answer 503");
    }

    let addr = config.bind_addr();
    let workers_enabled = config.workers_enabled;
    let worker_config = config.clone();

    let state = match build_state(config).await {
        Ok(state) => state,
        Err(err) => {
            tracing::error!(error = %err, "failed to open document store");
            std::process::exit(1);
        }
    };

    let worker_manager = if workers_enabled {
        match WorkerManager::new(state.db_proxy(), &worker_config).await {
            Ok(manager) => {
                if let Err(e) = manager.start().await {
                    tracing::error!(error = %e, "failed to start workers");
                }
                Some(Arc::new(manager))
            }
            Err(e) => {
                tracing::warn!(error = %e, "worker manager not initialized");
                None
            }
        }
    } else {
        tracing::info!("WORKERS_ENABLED is false, skipping worker startup");
        None
    };

    let db_proxy = state.db_proxy();
    let app = create_app_with_state(state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, %addr, "bind listener failed");
            std::process::exit(1);
        }
    };
    tracing::info!(%addr, "lingo-backend listening");

    let server = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal());

    if let Err(e) = server.await {
        tracing::error!(error = %e, "server error");
    }

    tracing::info!("HTTP server stopped, initiating graceful shutdown sequence");

    if let Some(ref manager) = worker_manager {
        manager.stop().await;
    }
    db_proxy.close().await;

    tracing::info!("Graceful shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
