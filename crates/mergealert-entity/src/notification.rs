//! Persisted outcome of one merge-request dispatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Audit record written once per processed merge-request event.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NotificationRecord {
    /// Local identifier.
    pub id: i64,
    /// Local project id.
    pub project_id: i64,
    /// Merge request IID within the project.
    pub merge_request_id: i64,
    /// Merge request title.
    pub title: String,
    /// Source branch.
    pub source_branch: String,
    /// Target branch.
    pub target_branch: String,
    /// Author email, or display name when GitLab redacted it.
    pub author_email: String,
    /// Mentioned assignee accounts.
    #[sqlx(json)]
    pub assignee_emails: Vec<String>,
    /// Merge request state at dispatch time.
    pub status: String,
    /// Whether every destination accepted the message.
    pub notification_sent: bool,
    /// First delivery error, when `notification_sent` is false.
    pub error_message: Option<String>,
    /// When the event was processed.
    pub created_at: DateTime<Utc>,
}

/// Insert payload for [`NotificationRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNotification {
    /// Local project id.
    pub project_id: i64,
    /// Merge request IID.
    pub merge_request_id: i64,
    /// Merge request title.
    pub title: String,
    /// Source branch.
    pub source_branch: String,
    /// Target branch.
    pub target_branch: String,
    /// Author email or name.
    pub author_email: String,
    /// Mentioned assignee accounts.
    pub assignee_emails: Vec<String>,
    /// Merge request state.
    pub status: String,
    /// Delivery outcome.
    pub notification_sent: bool,
    /// First delivery error.
    pub error_message: Option<String>,
}

/// A notification joined with its project's name for history views.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NotificationWithProject {
    /// The stored record.
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub record: NotificationRecord,
    /// Project display name, absent if the project was removed.
    pub project_name: Option<String>,
}

/// Dashboard counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationStats {
    /// All records.
    pub total: i64,
    /// Records with `notification_sent = true`.
    pub success: i64,
    /// Records with `notification_sent = false`.
    pub failure: i64,
    /// Records created since UTC midnight.
    pub today: i64,
}
