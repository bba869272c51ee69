//! Route definitions for the Merge Alert HTTP API.
//!
//! Resource routes are mounted under `/api/v1`; health lives at
//! `/api/health`.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware;
use crate::state::AppState;

/// Build the complete Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let max_body = state.config.server.max_body_bytes;
    let cors = middleware::cors::build_cors_layer(&state.config.server.cors);

    let api_routes = Router::new()
        .merge(webhook_routes())
        .merge(project_routes())
        .merge(destination_routes())
        .merge(notification_routes());

    Router::new()
        .nest("/api/v1", api_routes)
        .merge(health_routes())
        .layer(DefaultBodyLimit::max(max_body))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(axum_middleware::from_fn(
            middleware::logging::request_logging,
        ))
        .with_state(state)
}

/// GitLab hook receiver
fn webhook_routes() -> Router<AppState> {
    Router::new().route(
        "/webhook/gitlab",
        post(handlers::webhook::receive_gitlab_event),
    )
}

/// Project listing and hook management
fn project_routes() -> Router<AppState> {
    Router::new()
        .route("/projects", get(handlers::project::list_projects))
        .route(
            "/projects/batch-check-webhook-status",
            post(handlers::project::batch_check),
        )
        .route(
            "/projects/{id}/gitlab-webhook-status",
            get(handlers::project::webhook_status),
        )
        .route(
            "/projects/{id}/sync-gitlab-webhook",
            post(handlers::project::sync_webhook).delete(handlers::project::delete_webhook),
        )
}

/// Destination test send
fn destination_routes() -> Router<AppState> {
    Router::new().route(
        "/webhooks/{id}/test",
        post(handlers::destination::test_destination),
    )
}

/// History and counters
fn notification_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/notifications",
            get(handlers::notification::list_notifications),
        )
        .route("/stats", get(handlers::notification::stats))
}

/// Health
fn health_routes() -> Router<AppState> {
    Router::new().route("/api/health", get(handlers::health::health))
}
