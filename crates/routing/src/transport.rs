//! Delivery seams the engine calls after a state change has committed.

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
};

use crate::model::{Participant, PendingRequest};

/// Opaque message body. The engine never inspects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum Payload {
    Text(String),
    Structured(serde_json::Value),
}

impl Payload {
    /// Broadcast body announcing a new pending request to aggregation
    /// endpoints.
    pub fn connection_request(request: &PendingRequest) -> Self {
        Self::Structured(serde_json::json!({
            "event": "connection_request",
            "requester": request.requester,
            "enqueued_at": request.enqueued_at,
        }))
    }
}

/// Sends a payload to a participant on its channel.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn deliver(&self, target: &Participant, payload: &Payload) -> anyhow::Result<()>;
}

/// Opens a dedicated conversation between an operator and a client.
#[async_trait]
pub trait ConversationCreator: Send + Sync {
    /// Returns the operator re-keyed to the new conversation. The returned
    /// participant must keep the operator's channel and account.
    async fn create_conversation(
        &self,
        operator: &Participant,
        client: &Participant,
    ) -> anyhow::Result<Participant>;
}

/// Transport used until the host wires a real one in.
pub struct NoopTransport;

#[async_trait]
impl MessageTransport for NoopTransport {
    async fn deliver(&self, _target: &Participant, _payload: &Payload) -> anyhow::Result<()> {
        anyhow::bail!("message transport not configured")
    }
}
