//! Project entity and its cached view of the GitLab hook.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A GitLab project registered for merge-request alerts.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Project {
    /// Local identifier.
    pub id: i64,
    /// Numeric project id on the GitLab server.
    pub gitlab_project_id: i64,
    /// Display name.
    pub name: String,
    /// Web URL of the project (`https://gitlab.example.com/group/app`).
    pub url: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Id of the hook pointing at this service, when known.
    pub gitlab_webhook_id: Option<i64>,
    /// Whether the hook was present at the last check.
    pub webhook_synced: bool,
    /// When the hook state was last observed or changed.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// The locally cached hook state.
    pub fn webhook_state(&self) -> WebhookState {
        WebhookState {
            gitlab_webhook_id: self.gitlab_webhook_id,
            synced: self.webhook_synced,
        }
    }

    /// Overwrite the cached hook state in memory.
    pub fn apply_webhook_state(&mut self, state: WebhookState, synced_at: DateTime<Utc>) {
        self.gitlab_webhook_id = state.gitlab_webhook_id;
        self.webhook_synced = state.synced;
        self.last_sync_at = Some(synced_at);
    }
}

/// Presence and identity of the service's hook on a GitLab project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WebhookState {
    /// Remote hook id.
    pub gitlab_webhook_id: Option<i64>,
    /// Whether the hook exists.
    pub synced: bool,
}

impl WebhookState {
    /// No hook configured.
    pub fn absent() -> Self {
        Self::default()
    }

    /// Hook configured with the given remote id.
    pub fn present(hook_id: i64) -> Self {
        Self {
            gitlab_webhook_id: Some(hook_id),
            synced: true,
        }
    }
}

/// A pending write of one project's hook state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookStateUpdate {
    /// Local project id.
    pub project_id: i64,
    /// New state.
    pub state: WebhookState,
    /// Observation time written to `last_sync_at`.
    pub synced_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_equality_covers_id_and_flag() {
        assert_eq!(WebhookState::present(4), WebhookState::present(4));
        assert_ne!(WebhookState::present(4), WebhookState::present(5));
        assert_ne!(WebhookState::present(4), WebhookState::absent());
        let stale = WebhookState {
            gitlab_webhook_id: Some(4),
            synced: false,
        };
        assert_ne!(stale, WebhookState::absent());
    }
}
