//! GitLab merge-request hook payload.
//!
//! Only the fields the dispatcher reads are modelled; everything else in
//! the GitLab payload is ignored during decoding.

use serde::{Deserialize, Serialize};

/// Value GitLab substitutes for email addresses hidden by privacy settings.
pub const REDACTED_EMAIL: &str = "[REDACTED]";

/// `object_kind` of merge-request hooks.
pub const MERGE_REQUEST_KIND: &str = "merge_request";

/// State of merge requests that trigger alerts.
pub const OPENED_STATE: &str = "opened";

/// A merge-request hook delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequestEvent {
    /// Hook kind, `merge_request` for this payload.
    pub object_kind: String,
    /// The user who triggered the event (the MR author for `open`).
    #[serde(default)]
    pub user: EventUser,
    /// Source project.
    pub project: EventProject,
    /// Merge request attributes.
    pub object_attributes: MergeRequestAttributes,
    /// Current assignees.
    #[serde(default)]
    pub assignees: Vec<EventUser>,
}

impl MergeRequestEvent {
    /// Whether this is a merge-request hook.
    pub fn is_merge_request(&self) -> bool {
        self.object_kind == MERGE_REQUEST_KIND
    }

    /// Whether the merge request is open.
    pub fn is_opened(&self) -> bool {
        self.object_attributes.state == OPENED_STATE
    }
}

/// A GitLab user as embedded in hook payloads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventUser {
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Login name.
    #[serde(default)]
    pub username: String,
    /// Email, possibly [`REDACTED_EMAIL`].
    #[serde(default)]
    pub email: String,
}

impl EventUser {
    /// The email if it is present and not redacted.
    pub fn usable_email(&self) -> Option<&str> {
        let email = self.email.trim();
        (!email.is_empty() && email != REDACTED_EMAIL).then_some(email)
    }

    /// Identifier shown in mentions and history: the email, or the
    /// display name when the email is redacted.
    pub fn display_account(&self) -> &str {
        if self.email == REDACTED_EMAIL {
            &self.name
        } else {
            &self.email
        }
    }
}

/// Project block of the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventProject {
    /// GitLab project id.
    pub id: i64,
    /// Project name.
    #[serde(default)]
    pub name: String,
}

/// `object_attributes` block of the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequestAttributes {
    /// Project-scoped merge request number.
    pub iid: i64,
    /// Title.
    #[serde(default)]
    pub title: String,
    /// State (`opened`, `closed`, `merged`, `locked`).
    #[serde(default)]
    pub state: String,
    /// Source branch.
    #[serde(default)]
    pub source_branch: String,
    /// Target branch.
    #[serde(default)]
    pub target_branch: String,
    /// Web URL of the merge request.
    #[serde(default)]
    pub url: String,
}
