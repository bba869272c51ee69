//! GitLab API configuration.

use serde::{Deserialize, Serialize};

/// GitLab access and reconciliation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabConfig {
    /// Access token (personal, project or CI token). May be stored
    /// encrypted; it is passed through the configured token decryptor.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Key the stored access token was encrypted with. When set, the
    /// token is decrypted with AES-256-GCM before use.
    #[serde(default)]
    pub encryption_key: Option<String>,
    /// When set, inbound hook deliveries must carry this value in
    /// `X-Gitlab-Token`.
    #[serde(default)]
    pub webhook_secret: Option<String>,
    /// Per-call timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Concurrent GitLab calls when refreshing the project listing.
    #[serde(default = "default_list_concurrency")]
    pub list_concurrency: usize,
    /// Concurrent GitLab calls for the user-triggered batch check.
    #[serde(default = "default_batch_check_concurrency")]
    pub batch_check_concurrency: usize,
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            encryption_key: None,
            webhook_secret: None,
            request_timeout_seconds: default_request_timeout(),
            list_concurrency: default_list_concurrency(),
            batch_check_concurrency: default_batch_check_concurrency(),
        }
    }
}

fn default_request_timeout() -> u64 {
    30
}

fn default_list_concurrency() -> usize {
    50
}

fn default_batch_check_concurrency() -> usize {
    10
}
