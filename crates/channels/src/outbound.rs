use {async_trait::async_trait, serde_json::Value};

use crate::{Error, Result};

/// Send messages on one chat platform.
///
/// `service_endpoint` is the platform endpoint the conversation lives on and
/// `conversation_id` the platform's conversation handle; both are opaque.
#[async_trait]
pub trait ChannelOutbound: Send + Sync {
    async fn send_text(
        &self,
        service_endpoint: &str,
        conversation_id: &str,
        text: &str,
    ) -> Result<()>;

    /// Send a structured body. Platforms without rich messages get the JSON
    /// as text.
    async fn send_structured(
        &self,
        service_endpoint: &str,
        conversation_id: &str,
        body: &Value,
    ) -> Result<()> {
        let text = serde_json::to_string_pretty(body)?;
        self.send_text(service_endpoint, conversation_id, &text)
            .await
    }

    /// Open a one-to-one conversation with `account_id` and return its
    /// conversation id. Unsupported by default.
    async fn create_conversation(
        &self,
        _service_endpoint: &str,
        _account_id: &str,
    ) -> Result<String> {
        Err(Error::unavailable("creating conversations"))
    }
}
