//! Sender selection per destination.

use std::sync::Arc;
use std::time::Duration;

use mergealert_core::config::notification::NotificationConfig;
use mergealert_database::store::DeliveryQuotaStore;
use mergealert_entity::destination::{Channel, Destination};

use crate::sender::{ChannelSender, CustomSender, DingTalkSender, WeComSender};

/// Maps destinations to the sender for their channel.
///
/// Senders are long-lived so that rate-limit state is shared by every
/// dispatch going through the same router.
#[derive(Debug, Clone)]
pub struct SenderRouter {
    wecom: Arc<dyn ChannelSender>,
    dingtalk: Arc<dyn ChannelSender>,
    custom: Arc<dyn ChannelSender>,
}

impl SenderRouter {
    /// Create a router over explicit senders.
    pub fn new(
        wecom: Arc<dyn ChannelSender>,
        dingtalk: Arc<dyn ChannelSender>,
        custom: Arc<dyn ChannelSender>,
    ) -> Self {
        Self {
            wecom,
            dingtalk,
            custom,
        }
    }

    /// Build the production senders from configuration.
    pub fn from_config(config: &NotificationConfig, quota_store: Arc<dyn DeliveryQuotaStore>) -> Self {
        tracing::info!(
            dingtalk_rate_limit = config.dingtalk.effective_rate_limit(),
            dingtalk_monthly_quota = config.dingtalk.monthly_quota,
            "Initializing channel senders"
        );

        Self::new(
            Arc::new(WeComSender::new(Duration::from_secs(
                config.wecom.request_timeout_seconds,
            ))),
            Arc::new(DingTalkSender::from_config(&config.dingtalk, quota_store)),
            Arc::new(CustomSender),
        )
    }

    /// Sender for `channel`.
    pub fn sender_for_channel(&self, channel: Channel) -> Arc<dyn ChannelSender> {
        match channel {
            Channel::WeCom => Arc::clone(&self.wecom),
            Channel::DingTalk => Arc::clone(&self.dingtalk),
            Channel::Custom => Arc::clone(&self.custom),
        }
    }

    /// Sender for a destination: its declared type when explicit,
    /// otherwise sniffed from the URL. Empty or unknown types get WeCom.
    pub fn sender_for(&self, destination: &Destination) -> Arc<dyn ChannelSender> {
        self.sender_for_channel(destination.channel())
    }
}
