//! Plain-text rendering of merge-request alerts.

use crate::payload::MergeRequestPayload;

/// Formats merge-request payloads into chat message text.
pub struct MessageFormatter;

impl MessageFormatter {
    /// Render the alert, followed by an `@account` line when the payload
    /// names accounts to mention.
    pub fn format_text(payload: &MergeRequestPayload) -> String {
        let mut content = Self::format_text_without_mentions(payload);

        let mentions = payload
            .mentioned_accounts
            .iter()
            .map(|account| account.trim())
            .filter(|account| !account.is_empty())
            .map(|account| format!("@{account}"))
            .collect::<Vec<_>>();

        if !mentions.is_empty() {
            content.push('\n');
            content.push_str(&mentions.join(" "));
        }

        content
    }

    /// Render the alert body only. Used by channels that mention people
    /// through a separate field.
    pub fn format_text_without_mentions(payload: &MergeRequestPayload) -> String {
        let divider = format!("{0} Merge Request {0}", "=".repeat(32));
        format!(
            "{divider}\nProject: {}\n   From: {} -> {} ({})\nMR Info: {}\nClick -> {}",
            payload.project_name,
            payload.source_branch,
            payload.target_branch,
            payload.author_name,
            payload.title,
            payload.url,
        )
    }
}
