//! Notification history and stats handlers.

use axum::Json;
use axum::extract::{Query, State};
use chrono::Utc;

use mergealert_entity::notification::{NotificationStats, NotificationWithProject};

use crate::dto::request::HistoryParams;
use crate::dto::response::ApiResponse;
use crate::error::ApiError;
use crate::state::AppState;

/// GET /api/v1/notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<ApiResponse<Vec<NotificationWithProject>>>, ApiError> {
    let records = state
        .stores
        .notifications
        .list_recent(params.effective_limit())
        .await?;
    Ok(Json(ApiResponse::ok(records)))
}

/// GET /api/v1/stats
pub async fn stats(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<NotificationStats>>, ApiError> {
    let stats = state.stores.notifications.stats(Utc::now()).await?;
    Ok(Json(ApiResponse::ok(stats)))
}
