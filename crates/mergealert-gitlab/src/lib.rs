//! # mergealert-gitlab
//!
//! GitLab REST access for Merge Alert: project URL parsing, the hook API
//! client, and the reconciler that keeps each project's cached
//! "hook configured" state in line with GitLab.

pub mod client;
pub mod error;
pub mod project_url;
pub mod reconciler;

pub use client::{GitLabApi, GitLabClient, GitLabEndpoint, ProjectHook};
pub use error::GitLabError;
pub use project_url::ParsedProjectUrl;
pub use reconciler::{HookRemoval, ReconcileResult, ReconcileStatus, WebhookReconciler};

/// Path GitLab posts merge-request hooks to.
pub const WEBHOOK_CALLBACK_PATH: &str = "/api/v1/webhook/gitlab";

/// Callback URL registered on GitLab projects, derived from the public
/// base URL of this service.
pub fn webhook_callback_url(public_base_url: &str) -> String {
    format!(
        "{}{WEBHOOK_CALLBACK_PATH}",
        public_base_url.trim().trim_end_matches('/')
    )
}
