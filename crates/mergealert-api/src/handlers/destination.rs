//! Destination test send.

use axum::Json;
use axum::extract::{Path, State};

use mergealert_core::error::AppError;
use mergealert_entity::destination::Channel;
use mergealert_notify::MergeRequestPayload;

use crate::dto::response::{ApiResponse, TestSendResponse};
use crate::error::ApiError;
use crate::handlers::request_cancellation;
use crate::state::AppState;

fn sample_payload(state: &AppState) -> MergeRequestPayload {
    MergeRequestPayload {
        project_name: "Test Project".to_string(),
        source_branch: "feature/test".to_string(),
        target_branch: "main".to_string(),
        author_name: "GitLab Merge Alert".to_string(),
        title: "Test notification".to_string(),
        url: state.config.server.public_webhook_url.clone(),
        mentioned_mobiles: Vec::new(),
        mentioned_accounts: Vec::new(),
    }
}

/// POST /api/v1/webhooks/{id}/test
pub async fn test_destination(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<TestSendResponse>>, ApiError> {
    let destination = state.stores.destinations.find_by_id(id).await?;
    if !destination.is_active {
        return Err(AppError::validation(format!("Webhook {id} is not active")).into());
    }

    let sender = state.dispatcher.router().sender_for(&destination);
    let channel = sender.channel();
    if channel == Channel::Custom {
        return Ok(Json(ApiResponse::ok(TestSendResponse {
            message: "Custom webhooks are not sent test messages".to_string(),
            sent: false,
            channel: channel.to_string(),
        })));
    }

    let (cancel, _guard) = request_cancellation();
    sender
        .send(&cancel, &destination, &sample_payload(&state))
        .await
        .map_err(|e| {
            tracing::warn!(destination_id = id, channel = %channel, error = %e, "Test send failed");
            AppError::from(e)
        })?;

    Ok(Json(ApiResponse::ok(TestSendResponse {
        message: "Test message sent".to_string(),
        sent: true,
        channel: channel.to_string(),
    })))
}
