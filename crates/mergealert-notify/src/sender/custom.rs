//! Custom destinations: configured as native GitLab integrations, so no
//! outbound call is made here.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use mergealert_entity::destination::{Channel, Destination};

use super::{ChannelSender, SendError};
use crate::payload::MergeRequestPayload;

/// No-op sender for custom endpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct CustomSender;

#[async_trait]
impl ChannelSender for CustomSender {
    fn channel(&self) -> Channel {
        Channel::Custom
    }

    async fn send(
        &self,
        _cancel: &CancellationToken,
        destination: &Destination,
        _payload: &MergeRequestPayload,
    ) -> Result<(), SendError> {
        tracing::info!(
            destination_id = destination.id,
            url = %destination.url,
            "Custom destination relies on GitLab's own integration; nothing to send"
        );
        Ok(())
    }
}
