//! Project listing and GitLab hook management.

use axum::Json;
use axum::extract::{Path, State};

use mergealert_entity::project::WebhookState;

use crate::dto::response::{
    ApiResponse, BatchCheckResponse, BatchCheckRow, BatchCheckSummary, FailedRemoval,
    ProjectResponse, RemovalResponse, SyncResponse, WebhookStatusResponse,
};
use crate::error::ApiError;
use crate::handlers::request_cancellation;
use crate::state::AppState;

/// GET /api/v1/projects
///
/// Responds with the hook state observed on GitLab when a token is
/// configured. Changed rows are written in one batch after responding.
pub async fn list_projects(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<ProjectResponse>>>, ApiError> {
    let projects = state.stores.projects.list().await?;

    let token = match state.gitlab_token() {
        Ok(token) => token,
        Err(e) => {
            tracing::debug!(error = %e, "Listing projects without hook reconciliation");
            let rows = projects.iter().map(ProjectResponse::from).collect();
            return Ok(Json(ApiResponse::ok(rows)));
        }
    };

    let (cancel, _guard) = request_cancellation();
    let results = state
        .reconciler
        .reconcile_projects(&cancel, &token, &projects, state.config.gitlab.list_concurrency)
        .await;

    let rows = projects
        .iter()
        .zip(&results)
        .map(|(project, result)| ProjectResponse::with_state(project, result.observed))
        .collect();

    if results.iter().any(|r| r.changed()) {
        let reconciler = state.reconciler.clone();
        tokio::spawn(async move {
            if let Err(e) = reconciler.persist_batch(&results).await {
                tracing::error!(error = %e, "Failed to persist reconciled hook states");
            }
        });
    }

    Ok(Json(ApiResponse::ok(rows)))
}

/// POST /api/v1/projects/batch-check-webhook-status
pub async fn batch_check(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<BatchCheckResponse>>, ApiError> {
    let token = state.gitlab_token()?;
    let projects = state.stores.projects.list().await?;

    let (cancel, _guard) = request_cancellation();
    let mut results = state
        .reconciler
        .reconcile_projects(&cancel, &token, &projects, state.config.gitlab.batch_check_concurrency)
        .await;
    let written = state.reconciler.persist_each(&mut results).await;

    let rows: Vec<BatchCheckRow> = results.iter().map(BatchCheckRow::from).collect();
    let summary = BatchCheckSummary::tally(&rows);
    tracing::info!(
        total = summary.total,
        errors = summary.errors,
        changed = summary.status_changed,
        written,
        "Batch hook check finished"
    );

    Ok(Json(ApiResponse::ok(BatchCheckResponse {
        results: rows,
        summary,
    })))
}

/// GET /api/v1/projects/{id}/gitlab-webhook-status
///
/// Falls back to the stored state with `can_manage = false` when GitLab
/// cannot be reached.
pub async fn webhook_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<WebhookStatusResponse>>, ApiError> {
    let project = state.stores.projects.find_by_id(id).await?;
    let webhook_url = state.reconciler.callback_url().to_string();

    let stored = |can_manage: bool| WebhookStatusResponse {
        project_id: project.id,
        webhook_synced: project.webhook_synced,
        gitlab_webhook_id: project.gitlab_webhook_id,
        webhook_url: webhook_url.clone(),
        last_sync_at: project.last_sync_at,
        can_manage,
    };

    let Ok(token) = state.gitlab_token() else {
        return Ok(Json(ApiResponse::ok(stored(false))));
    };

    let (cancel, _guard) = request_cancellation();
    let mut results = state
        .reconciler
        .reconcile_projects(&cancel, &token, std::slice::from_ref(&project), 1)
        .await;
    let Some(result) = results.first().filter(|r| r.succeeded()).cloned() else {
        return Ok(Json(ApiResponse::ok(stored(false))));
    };

    if result.changed() {
        state.reconciler.persist_each(&mut results).await;
    }
    let last_sync_at = state
        .stores
        .projects
        .find_by_id(id)
        .await
        .map(|p| p.last_sync_at)
        .unwrap_or(project.last_sync_at);
    let can_manage = state.reconciler.can_manage(&cancel, &token, &project).await;

    Ok(Json(ApiResponse::ok(WebhookStatusResponse {
        project_id: project.id,
        webhook_synced: result.observed.synced,
        gitlab_webhook_id: result.observed.gitlab_webhook_id,
        webhook_url,
        last_sync_at,
        can_manage,
    })))
}

/// POST /api/v1/projects/{id}/sync-gitlab-webhook
pub async fn sync_webhook(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<SyncResponse>>, ApiError> {
    let token = state.gitlab_token()?;
    let project = state.stores.projects.find_by_id(id).await?;

    let (cancel, _guard) = request_cancellation();
    let (hook_state, created): (WebhookState, bool) =
        state.reconciler.sync_hook(&cancel, &token, &project).await?;
    tracing::info!(
        project_id = project.id,
        gitlab_webhook_id = hook_state.gitlab_webhook_id,
        created,
        "Synced GitLab hook"
    );

    Ok(Json(ApiResponse::ok(SyncResponse {
        message: if created {
            "GitLab webhook created".to_string()
        } else {
            "GitLab webhook already configured".to_string()
        },
        gitlab_webhook_id: hook_state.gitlab_webhook_id,
        webhook_url: state.reconciler.callback_url().to_string(),
        created,
    })))
}

/// DELETE /api/v1/projects/{id}/sync-gitlab-webhook
pub async fn delete_webhook(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<RemovalResponse>>, ApiError> {
    let token = state.gitlab_token()?;
    let project = state.stores.projects.find_by_id(id).await?;

    let (cancel, _guard) = request_cancellation();
    let removal = state.reconciler.remove_hooks(&cancel, &token, &project).await?;
    let message = if let Some(error) = &removal.list_error {
        format!("Could not list GitLab webhooks: {error}")
    } else if removal.is_complete() {
        format!("Deleted {} GitLab webhook(s)", removal.deleted.len())
    } else {
        format!(
            "Deleted {} GitLab webhook(s), {} failed",
            removal.deleted.len(),
            removal.failed.len()
        )
    };
    tracing::info!(
        project_id = project.id,
        deleted = removal.deleted.len(),
        failed = removal.failed.len(),
        listed = removal.list_error.is_none(),
        "Removed GitLab hooks"
    );

    Ok(Json(ApiResponse::ok(RemovalResponse {
        message,
        deleted_count: removal.deleted.len(),
        list_error: removal.list_error,
        failed: removal
            .failed
            .into_iter()
            .map(|(hook_id, error)| FailedRemoval { hook_id, error })
            .collect(),
    })))
}
