//! Inbound GitLab hook receiver.

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use subtle::ConstantTimeEq;

use mergealert_core::error::AppError;
use mergealert_entity::event::{MERGE_REQUEST_KIND, MergeRequestEvent};
use mergealert_notify::DispatchOutcome;

use crate::dto::response::{ApiResponse, HookReceipt};
use crate::error::ApiError;
use crate::handlers::request_cancellation;
use crate::state::AppState;

/// Header GitLab uses to carry the hook secret.
pub const GITLAB_TOKEN_HEADER: &str = "x-gitlab-token";

/// POST /api/v1/webhook/gitlab
///
/// Answers 200 for every processed delivery, including unknown projects
/// and failed sends, so GitLab does not retry. Storage failures are 500.
pub async fn receive_gitlab_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<ApiResponse<HookReceipt>>, ApiError> {
    if let Some(secret) = state.config.gitlab.webhook_secret.as_deref() {
        let presented = headers
            .get(GITLAB_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !secret_matches(presented, secret) {
            tracing::warn!("Rejected GitLab hook with a bad token");
            return Err(AppError::authentication("Invalid X-Gitlab-Token").into());
        }
    }

    let kind = body
        .get("object_kind")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    if kind != MERGE_REQUEST_KIND {
        tracing::debug!(object_kind = kind, "Ignoring GitLab hook");
        return Ok(Json(ApiResponse::ok(HookReceipt::message("Event ignored"))));
    }

    let event: MergeRequestEvent = serde_json::from_value(body)
        .map_err(|e| AppError::validation(format!("Malformed merge request event: {e}")))?;

    let (cancel, _guard) = request_cancellation();
    let receipt = match state.dispatcher.process_with_cancel(&event, &cancel).await {
        Ok(DispatchOutcome::Ignored) => HookReceipt::message("Event ignored"),
        Ok(DispatchOutcome::Recorded(record)) => HookReceipt {
            message: if record.notification_sent {
                "Notification sent".to_string()
            } else {
                "Notification failed".to_string()
            },
            notification_id: Some(record.id),
            notification_sent: Some(record.notification_sent),
        },
        Err(e) if e.is_not_found() => {
            tracing::info!(gitlab_project_id = event.project.id, "Hook for unregistered project");
            HookReceipt::message("Project not registered")
        }
        Err(e) => return Err(e.into()),
    };

    Ok(Json(ApiResponse::ok(receipt)))
}

/// Compare the presented hook token with the configured secret in
/// constant time.
fn secret_matches(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}
