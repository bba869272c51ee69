//! Request handlers grouped by resource.

pub mod destination;
pub mod health;
pub mod notification;
pub mod project;
pub mod webhook;

use tokio_util::sync::{CancellationToken, DropGuard};

/// Cancellation for the outbound calls made on behalf of one request.
///
/// The token fires when the guard drops, which happens when axum drops the
/// handler future after the client disconnects.
pub(crate) fn request_cancellation() -> (CancellationToken, DropGuard) {
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    (cancel, guard)
}
