use std::sync::Arc;

use {async_trait::async_trait, tracing::debug};

use handover_routing::{ConversationCreator, MessageTransport, Participant, Payload};

use crate::{Error, Result, outbound::ChannelOutbound, registry::ChannelRegistry};

/// Delivers routing payloads through the outbound registered for the
/// target participant's channel.
///
/// Also opens dedicated conversations on channels that support it.
pub struct ChannelTransport {
    registry: Arc<ChannelRegistry>,
}

impl ChannelTransport {
    pub fn new(registry: Arc<ChannelRegistry>) -> Self {
        Self { registry }
    }

    fn resolve(&self, channel_id: &str) -> Result<&dyn ChannelOutbound> {
        self.registry
            .get(channel_id)
            .map(|o| o.as_ref())
            .ok_or_else(|| Error::unknown_channel(channel_id))
    }
}

#[async_trait]
impl MessageTransport for ChannelTransport {
    async fn deliver(&self, target: &Participant, payload: &Payload) -> anyhow::Result<()> {
        let outbound = self.resolve(&target.channel_id)?;
        match payload {
            Payload::Text(text) => {
                outbound
                    .send_text(&target.service_endpoint, &target.conversation_id, text)
                    .await?
            },
            Payload::Structured(body) => {
                outbound
                    .send_structured(&target.service_endpoint, &target.conversation_id, body)
                    .await?
            },
        }
        debug!(
            channel_id = %target.channel_id,
            conversation_id = %target.conversation_id,
            "payload delivered"
        );
        Ok(())
    }
}

#[async_trait]
impl ConversationCreator for ChannelTransport {
    async fn create_conversation(
        &self,
        operator: &Participant,
        _client: &Participant,
    ) -> anyhow::Result<Participant> {
        let Some(account_id) = operator.account_id.as_deref() else {
            return Err(Error::invalid_input("operator has no account").into());
        };
        let conversation_id = self
            .resolve(&operator.channel_id)?
            .create_conversation(&operator.service_endpoint, account_id)
            .await?;
        Ok(operator.in_conversation(conversation_id))
    }
}
