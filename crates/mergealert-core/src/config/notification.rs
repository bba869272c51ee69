//! Outbound chat channel configuration.

use serde::{Deserialize, Serialize};

/// Settings for every chat channel the dispatcher can deliver to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// DingTalk robot settings.
    #[serde(default)]
    pub dingtalk: DingTalkConfig,
    /// WeCom (WeChat Work) robot settings.
    #[serde(default)]
    pub wecom: WeComConfig,
}

/// DingTalk throttling and quota configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DingTalkConfig {
    /// Token bucket size and refill per minute. Values below 1 are raised to 1.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,
    /// Successful sends allowed per destination per calendar month.
    /// `0` disables the cap.
    #[serde(default)]
    pub monthly_quota: u32,
    /// Per-request timeout in seconds.
    #[serde(default = "default_dingtalk_timeout")]
    pub request_timeout_seconds: u64,
}

impl DingTalkConfig {
    /// Rate limit with the lower bound applied.
    pub fn effective_rate_limit(&self) -> u32 {
        self.rate_limit_per_minute.max(1)
    }
}

impl Default for DingTalkConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_minute: default_rate_limit(),
            monthly_quota: 0,
            request_timeout_seconds: default_dingtalk_timeout(),
        }
    }
}

/// WeCom configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeComConfig {
    /// Per-request timeout in seconds.
    #[serde(default = "default_wecom_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for WeComConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: default_wecom_timeout(),
        }
    }
}

fn default_rate_limit() -> u32 {
    20
}

fn default_dingtalk_timeout() -> u64 {
    5
}

fn default_wecom_timeout() -> u64 {
    10
}
