//! WeCom (WeChat Work) group robot sender.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use mergealert_entity::destination::{Channel, Destination};

use super::{ChannelSender, SendError, http_client, post_json};
use crate::formatter::MessageFormatter;
use crate::payload::MergeRequestPayload;

/// Posts plain-text messages to WeCom robots. Mentions travel in
/// `mentioned_mobile_list`, so the text carries no `@account` line.
#[derive(Debug, Clone)]
pub struct WeComSender {
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct WeComMessage<'a> {
    msgtype: &'static str,
    text: WeComText<'a>,
}

#[derive(Debug, Serialize)]
struct WeComText<'a> {
    content: String,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    mentioned_mobile_list: &'a [String],
}

impl WeComSender {
    /// Create a sender with the given request timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
        }
    }
}

#[async_trait]
impl ChannelSender for WeComSender {
    fn channel(&self) -> Channel {
        Channel::WeCom
    }

    async fn send(
        &self,
        cancel: &CancellationToken,
        destination: &Destination,
        payload: &MergeRequestPayload,
    ) -> Result<(), SendError> {
        let message = WeComMessage {
            msgtype: "text",
            text: WeComText {
                content: MessageFormatter::format_text_without_mentions(payload),
                mentioned_mobile_list: &payload.mentioned_mobiles,
            },
        };

        tracing::info!(
            destination_id = destination.id,
            mentions = payload.mentioned_mobiles.len(),
            "Sending WeCom message"
        );

        let response = post_json(&self.client, cancel, &destination.url, destination, &message).await?;
        let status = response.status();
        if status != StatusCode::OK {
            tracing::warn!(destination_id = destination.id, status = status.as_u16(), "WeCom rejected message");
            return Err(SendError::Status {
                channel: Channel::WeCom,
                status: status.as_u16(),
            });
        }

        Ok(())
    }
}
