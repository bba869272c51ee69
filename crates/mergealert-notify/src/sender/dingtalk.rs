//! DingTalk group robot sender with "加签" request signing, throttling, and
//! monthly quotas.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio_util::sync::CancellationToken;
use url::Url;

use mergealert_core::config::notification::DingTalkConfig;
use mergealert_database::store::DeliveryQuotaStore;
use mergealert_entity::destination::{Channel, Destination};

use super::{ChannelSender, SendError, http_client, post_json};
use crate::formatter::MessageFormatter;
use crate::payload::MergeRequestPayload;
use crate::quota::QuotaTracker;
use crate::ratelimit::RateLimiter;

type HmacSha256 = Hmac<Sha256>;

/// Characters left unescaped in the `sign` query value.
const SIGN_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Posts text messages to DingTalk robots.
///
/// Every send checks the monthly quota first, then the shared token
/// bucket; either refusal returns without touching the network.
#[derive(Debug, Clone)]
pub struct DingTalkSender {
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
    quota: QuotaTracker,
}

#[derive(Debug, Serialize)]
struct DingTalkMessage<'a> {
    msgtype: &'static str,
    text: DingTalkText,
    at: DingTalkAt<'a>,
}

#[derive(Debug, Serialize)]
struct DingTalkText {
    content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DingTalkAt<'a> {
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    at_mobiles: &'a [String],
    is_at_all: bool,
}

#[derive(Debug, Deserialize)]
struct DingTalkReply {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

impl DingTalkSender {
    /// Create a sender from its parts.
    pub fn new(timeout: Duration, limiter: Arc<RateLimiter>, quota: QuotaTracker) -> Self {
        Self {
            client: http_client(timeout),
            limiter,
            quota,
        }
    }

    /// Create a sender from configuration, counting deliveries in `store`.
    pub fn from_config(config: &DingTalkConfig, store: Arc<dyn DeliveryQuotaStore>) -> Self {
        Self::new(
            Duration::from_secs(config.request_timeout_seconds),
            Arc::new(RateLimiter::per_minute(config.effective_rate_limit())),
            QuotaTracker::new(store, config.monthly_quota, Channel::DingTalk),
        )
    }

    /// The shared token bucket.
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Send as of `now`, which picks the quota month and the signing
    /// timestamp.
    pub async fn send_at(
        &self,
        cancel: &CancellationToken,
        destination: &Destination,
        payload: &MergeRequestPayload,
        now: DateTime<Utc>,
    ) -> Result<(), SendError> {
        if self.quota.is_enabled() {
            let (exceeded, current) = self.quota.is_exceeded_at(destination, now).await?;
            if exceeded {
                tracing::warn!(
                    destination_id = destination.id,
                    current,
                    quota = self.quota.monthly_quota(),
                    "DingTalk monthly quota exhausted"
                );
                return Err(SendError::QuotaExceeded {
                    current,
                    quota: self.quota.monthly_quota(),
                });
            }
        }

        if !self.limiter.allow() {
            tracing::warn!(destination_id = destination.id, "DingTalk rate limit reached");
            return Err(SendError::RateLimited(Channel::DingTalk));
        }

        let url = match destination.secret() {
            Some(secret) => signed_url(&destination.url, secret, now.timestamp_millis())?,
            None => destination.url.clone(),
        };

        let message = DingTalkMessage {
            msgtype: "text",
            text: DingTalkText {
                content: MessageFormatter::format_text(payload),
            },
            at: DingTalkAt {
                at_mobiles: &payload.mentioned_mobiles,
                is_at_all: false,
            },
        };

        tracing::info!(
            destination_id = destination.id,
            signed = destination.secret().is_some(),
            mentions = payload.mentioned_mobiles.len(),
            "Sending DingTalk message"
        );

        let response = post_json(&self.client, cancel, &url, destination, &message).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SendError::Status {
                channel: Channel::DingTalk,
                status: status.as_u16(),
            });
        }

        let reply: DingTalkReply = response
            .json()
            .await
            .map_err(|e| SendError::Transport(format!("decode DingTalk response: {e}")))?;
        if reply.errcode != 0 {
            return Err(SendError::Platform {
                code: reply.errcode,
                message: reply.errmsg,
            });
        }

        self.quota.increment_at(destination, now).await?;
        Ok(())
    }
}

#[async_trait]
impl ChannelSender for DingTalkSender {
    fn channel(&self) -> Channel {
        Channel::DingTalk
    }

    async fn send(
        &self,
        cancel: &CancellationToken,
        destination: &Destination,
        payload: &MergeRequestPayload,
    ) -> Result<(), SendError> {
        self.send_at(cancel, destination, payload, Utc::now()).await
    }
}

/// DingTalk request signature for `timestamp_ms`, already URL-escaped.
///
/// `base64(HMAC-SHA256(secret, "{timestamp}\n{secret}"))`.
pub fn sign(secret: &str, timestamp_ms: i64) -> Result<String, SendError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| SendError::Config(format!("invalid signing secret: {e}")))?;
    mac.update(format!("{timestamp_ms}\n{secret}").as_bytes());
    let digest = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());
    Ok(utf8_percent_encode(&digest, SIGN_ESCAPE).to_string())
}

/// Append `timestamp` and `sign` to `raw_url`, replacing any existing
/// values and keeping other query parameters in place.
pub fn signed_url(raw_url: &str, secret: &str, timestamp_ms: i64) -> Result<String, SendError> {
    let mut url = Url::parse(raw_url.trim())
        .map_err(|e| SendError::Config(format!("invalid DingTalk URL: {e}")))?;
    let signature = sign(secret, timestamp_ms)?;

    let mut pairs: Vec<String> = url
        .query()
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            let key = pair.split('=').next().unwrap_or_default();
            key != "timestamp" && key != "sign"
        })
        .map(str::to_string)
        .collect();
    pairs.push(format!("timestamp={timestamp_ms}"));
    pairs.push(format!("sign={signature}"));

    url.set_query(Some(&pairs.join("&")));
    Ok(url.to_string())
}
