//! Chat destinations ("webhooks" in the admin UI) and their channel settings.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Signature method stored when none is configured.
pub const DEFAULT_SIGNATURE_METHOD: &str = "hmac_sha256";

/// Chat platform family a destination belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// WeCom (WeChat Work) group robot.
    WeCom,
    /// DingTalk group robot.
    DingTalk,
    /// Endpoint configured directly as a GitLab integration; no outbound call.
    Custom,
}

impl Channel {
    /// Lowercase name stored in delivery records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WeCom => "wecom",
            Self::DingTalk => "dingtalk",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Channel type as declared on the destination row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclaredType {
    /// An explicit channel.
    Explicit(Channel),
    /// Sniff the channel from the destination URL.
    Auto,
}

impl DeclaredType {
    /// Interpret a stored type string.
    ///
    /// `"auto"` requests URL sniffing. `"wechat"` is the legacy spelling of
    /// WeCom. Empty and unrecognised values fall back to WeCom, which is
    /// what rows created before multi-channel support rely on.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "auto" => Self::Auto,
            "dingtalk" => Self::Explicit(Channel::DingTalk),
            "custom" => Self::Explicit(Channel::Custom),
            _ => Self::Explicit(Channel::WeCom),
        }
    }
}

/// Guess the channel from a destination URL's host.
///
/// Unparseable URLs and unknown hosts are treated as custom endpoints.
pub fn detect_channel(raw_url: &str) -> Channel {
    let Ok(parsed) = url::Url::parse(raw_url.trim()) else {
        return Channel::Custom;
    };
    let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();

    if host.contains("dingtalk.com") || host.contains("ding") {
        Channel::DingTalk
    } else if host.contains("qyapi.weixin.qq.com") || host.contains("work.weixin.qq.com") {
        Channel::WeCom
    } else {
        Channel::Custom
    }
}

/// A configured chat endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Destination {
    /// Local identifier.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Robot URL messages are posted to.
    pub url: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Declared channel type (`wecom`, `wechat`, `dingtalk`, `custom`, `auto`).
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub channel_type: String,
    /// Inactive destinations are skipped by dispatch.
    pub is_active: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
    /// Per-channel settings, loaded alongside the row.
    #[sqlx(skip)]
    #[serde(default)]
    pub settings: Option<DestinationSettings>,
}

impl Destination {
    /// Parsed declared type.
    pub fn declared_type(&self) -> DeclaredType {
        DeclaredType::parse(&self.channel_type)
    }

    /// Channel this destination resolves to.
    pub fn channel(&self) -> Channel {
        match self.declared_type() {
            DeclaredType::Explicit(channel) => channel,
            DeclaredType::Auto => detect_channel(&self.url),
        }
    }

    /// Shared signing secret, if one is configured and non-empty.
    pub fn secret(&self) -> Option<&str> {
        self.settings
            .as_ref()
            .and_then(|s| s.secret.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Extra headers to attach to outbound posts.
    pub fn custom_headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.settings
            .iter()
            .flat_map(|s| s.custom_headers.iter())
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Per-destination channel settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationSettings {
    /// Signature algorithm name. Only `hmac_sha256` is defined.
    #[serde(default = "default_signature_method")]
    pub signature_method: String,
    /// Signing secret (DingTalk "加签").
    #[serde(default, skip_serializing)]
    pub secret: Option<String>,
    /// Keyword allow-list configured on the robot.
    #[serde(default)]
    pub security_keywords: Vec<String>,
    /// Headers attached to every outbound request.
    #[serde(default)]
    pub custom_headers: BTreeMap<String, String>,
}

impl Default for DestinationSettings {
    fn default() -> Self {
        Self {
            signature_method: default_signature_method(),
            secret: None,
            security_keywords: Vec::new(),
            custom_headers: BTreeMap::new(),
        }
    }
}

fn default_signature_method() -> String {
    DEFAULT_SIGNATURE_METHOD.to_string()
}
