//! # mergealert-api
//!
//! HTTP API layer for Merge Alert built on Axum.
//!
//! Receives GitLab merge-request hooks, exposes project hook management
//! backed by the reconciler, notification history, stats and health, and
//! maps [`mergealert_core::AppError`] onto HTTP responses.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use error::ApiError;
pub use router::build_router;
pub use state::{AppState, Stores};
