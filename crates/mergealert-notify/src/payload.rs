//! Channel-neutral message input built once per merge-request event.

use serde::{Deserialize, Serialize};

/// Everything a sender needs to render one merge-request alert.
///
/// Built by the dispatcher and shared read-only across all destinations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequestPayload {
    /// Project name.
    pub project_name: String,
    /// Source branch.
    pub source_branch: String,
    /// Target branch.
    pub target_branch: String,
    /// Author display name.
    pub author_name: String,
    /// Merge request title.
    pub title: String,
    /// Merge request URL.
    pub url: String,
    /// Phone numbers to @-mention, deduplicated.
    pub mentioned_mobiles: Vec<String>,
    /// Account identifiers rendered as `@account` in the text.
    pub mentioned_accounts: Vec<String>,
}
