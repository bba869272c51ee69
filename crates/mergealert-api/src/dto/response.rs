//! Response DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mergealert_entity::project::{Project, WebhookState};
use mergealert_gitlab::{ReconcileResult, ReconcileStatus};

/// Standard success response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    /// Whether the request was successful.
    pub success: bool,
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Creates a successful response.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Simple message response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Message.
    pub message: String,
}

impl MessageResponse {
    /// Wrap a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Result of one inbound GitLab hook delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookReceipt {
    /// What happened to the event.
    pub message: String,
    /// Stored history record, when one was written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<i64>,
    /// Whether every destination accepted the message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_sent: Option<bool>,
}

impl HookReceipt {
    /// A receipt with no history record.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            notification_id: None,
            notification_sent: None,
        }
    }
}

/// A project with its best known hook state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectResponse {
    /// Local id.
    pub id: i64,
    /// GitLab project id.
    pub gitlab_project_id: i64,
    /// Name.
    pub name: String,
    /// Web URL.
    pub url: String,
    /// Description.
    pub description: Option<String>,
    /// Remote hook id.
    pub gitlab_webhook_id: Option<i64>,
    /// Whether the hook exists.
    pub webhook_synced: bool,
    /// Last observation time.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Created at.
    pub created_at: DateTime<Utc>,
    /// Updated at.
    pub updated_at: DateTime<Utc>,
}

impl ProjectResponse {
    /// Render `project` with `state` in place of the cached hook state.
    pub fn with_state(project: &Project, state: WebhookState) -> Self {
        Self {
            id: project.id,
            gitlab_project_id: project.gitlab_project_id,
            name: project.name.clone(),
            url: project.url.clone(),
            description: project.description.clone(),
            gitlab_webhook_id: state.gitlab_webhook_id,
            webhook_synced: state.synced,
            last_sync_at: project.last_sync_at,
            created_at: project.created_at,
            updated_at: project.updated_at,
        }
    }
}

impl From<&Project> for ProjectResponse {
    fn from(project: &Project) -> Self {
        Self::with_state(project, project.webhook_state())
    }
}

/// One row of a batch hook check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchCheckRow {
    /// Local project id.
    pub project_id: i64,
    /// Project name.
    pub project_name: String,
    /// Hook presence after the check.
    pub webhook_synced: bool,
    /// Hook presence before the check.
    pub previous_status: bool,
    /// Whether the stored state was rewritten.
    pub status_changed: bool,
    /// Remote hook id after the check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gitlab_webhook_id: Option<i64>,
    /// Failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&ReconcileResult> for BatchCheckRow {
    fn from(result: &ReconcileResult) -> Self {
        Self {
            project_id: result.project_id,
            project_name: result.project_name.clone(),
            webhook_synced: result.observed.synced,
            previous_status: result.previous.synced,
            status_changed: result.status == ReconcileStatus::Changed,
            gitlab_webhook_id: result.observed.gitlab_webhook_id,
            error: result.error.clone(),
        }
    }
}

/// Totals of a batch hook check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCheckSummary {
    /// Projects checked.
    pub total: usize,
    /// Checks that completed.
    pub success: usize,
    /// Checks that failed or were skipped.
    pub errors: usize,
    /// Projects whose stored state changed.
    pub status_changed: usize,
}

impl BatchCheckSummary {
    /// Count `rows`.
    pub fn tally(rows: &[BatchCheckRow]) -> Self {
        rows.iter().fold(Self::default(), |mut acc, row| {
            acc.total += 1;
            if row.error.is_some() {
                acc.errors += 1;
            } else {
                acc.success += 1;
            }
            if row.status_changed {
                acc.status_changed += 1;
            }
            acc
        })
    }
}

/// Batch hook check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchCheckResponse {
    /// Per-project rows in project order.
    pub results: Vec<BatchCheckRow>,
    /// Totals.
    pub summary: BatchCheckSummary,
}

/// Hook status of one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookStatusResponse {
    /// Local project id.
    pub project_id: i64,
    /// Whether the hook exists.
    pub webhook_synced: bool,
    /// Remote hook id.
    pub gitlab_webhook_id: Option<i64>,
    /// Callback URL the hook should point at.
    pub webhook_url: String,
    /// Last observation time.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Whether the configured token can reach the project's GitLab.
    pub can_manage: bool,
}

/// Result of an explicit hook sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    /// Message.
    pub message: String,
    /// Remote hook id.
    pub gitlab_webhook_id: Option<i64>,
    /// Callback URL.
    pub webhook_url: String,
    /// Whether a new hook was created.
    pub created: bool,
}

/// A hook that could not be deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedRemoval {
    /// Remote hook id.
    pub hook_id: i64,
    /// Reason.
    pub error: String,
}

/// Result of removing a project's hooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemovalResponse {
    /// Message.
    pub message: String,
    /// Number of hooks deleted.
    pub deleted_count: usize,
    /// Hooks left behind.
    pub failed: Vec<FailedRemoval>,
    /// Set when the project's hooks could not be listed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_error: Option<String>,
}

/// Result of a test send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSendResponse {
    /// Message.
    pub message: String,
    /// Whether a message went out.
    pub sent: bool,
    /// Channel the destination resolved to.
    pub channel: String,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status.
    pub status: String,
    /// Version.
    pub version: String,
    /// Database status.
    pub database: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(error: Option<&str>, changed: bool) -> BatchCheckRow {
        BatchCheckRow {
            project_id: 1,
            project_name: "app".to_string(),
            webhook_synced: false,
            previous_status: false,
            status_changed: changed,
            gitlab_webhook_id: None,
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn test_summary_tally() {
        let rows = [row(None, true), row(Some("boom"), false), row(None, false)];
        assert_eq!(
            BatchCheckSummary::tally(&rows),
            BatchCheckSummary {
                total: 3,
                success: 2,
                errors: 1,
                status_changed: 1,
            }
        );
    }

    #[test]
    fn test_row_serialization_skips_empty_fields() {
        let json = serde_json::to_value(row(None, false)).unwrap();
        assert!(json.get("error").is_none());
        assert!(json.get("gitlab_webhook_id").is_none());
        assert_eq!(json["previous_status"], false);
    }
}
