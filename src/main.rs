//! GitLab Merge Alert server.
//!
//! Main entry point that wires all crates together and starts the server.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

use mergealert_api::{AppState, Stores, build_router};
use mergealert_core::config::AppConfig;
use mergealert_core::crypto::token_decryptor;
use mergealert_core::error::AppError;
use mergealert_database::connection::DatabasePool;
use mergealert_gitlab::GitLabClient;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

/// Load configuration for the environment named by `MERGE_ALERT_ENV`.
fn load_configuration() -> Result<AppConfig, AppError> {
    let env = std::env::var("MERGE_ALERT_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting GitLab Merge Alert");

    // ── Step 1: Database connection + migrations ─────────────────
    let db_pool = DatabasePool::connect(&config.database).await?;
    mergealert_database::migration::run_migrations(db_pool.pool()).await?;

    // ── Step 2: Stores, GitLab client, engines ───────────────────
    let stores = Stores::postgres(&db_pool);
    let gitlab = Arc::new(GitLabClient::new(Duration::from_secs(
        config.gitlab.request_timeout_seconds,
    )));
    if config.gitlab.access_token.is_none() {
        tracing::warn!("No GitLab access token configured; hook reconciliation is disabled");
    }
    let decryptor = token_decryptor(&config.gitlab)?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let grace = Duration::from_secs(config.server.shutdown_grace_seconds);

    let state = AppState::new(
        config,
        stores,
        gitlab,
        decryptor,
        Some(db_pool.clone()),
    );
    let app = build_router(state);

    // ── Step 3: Serve until a shutdown signal ────────────────────
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {addr}: {e}")))?;
    tracing::info!(addr = %addr, "GitLab Merge Alert listening");

    let server = axum::serve(listener, app).with_graceful_shutdown(async {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, starting graceful shutdown");
    });

    server
        .await
        .map_err(|e| AppError::internal(format!("Server error: {e}")))?;

    if tokio::time::timeout(grace, db_pool.close()).await.is_err() {
        tracing::warn!("Timed out closing the database pool");
    }

    tracing::info!("GitLab Merge Alert shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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
