use std::{collections::HashMap, sync::Arc};

use crate::outbound::ChannelOutbound;

/// Outbound senders keyed by channel id (`msteams`, `slack`, ...).
#[derive(Default)]
pub struct ChannelRegistry {
    outbounds: HashMap<String, Arc<dyn ChannelOutbound>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `outbound` for `channel_id`, replacing any previous one.
    pub fn register(&mut self, channel_id: impl Into<String>, outbound: Arc<dyn ChannelOutbound>) {
        self.outbounds.insert(channel_id.into(), outbound);
    }

    pub fn get(&self, channel_id: &str) -> Option<&Arc<dyn ChannelOutbound>> {
        self.outbounds.get(channel_id)
    }

    /// Registered channel ids, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.outbounds.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.outbounds.is_empty()
    }
}
