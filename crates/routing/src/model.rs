//! Participant identities and the routing state they index.

use std::{collections::VecDeque, fmt};

use serde::{Deserialize, Serialize};

use handover_common::now_ms;

use crate::{Error, Result};

/// An actor in a specific channel-and-conversation context.
///
/// A participant without `account_id` stands for the whole conversation,
/// which is how aggregation endpoints are represented. `display_name` is
/// informational and never takes part in matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Participant {
    pub service_endpoint: String,
    pub channel_id: String,
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Participant {
    pub fn new(
        service_endpoint: impl Into<String>,
        channel_id: impl Into<String>,
        conversation_id: impl Into<String>,
    ) -> Self {
        Self {
            service_endpoint: service_endpoint.into(),
            channel_id: channel_id.into(),
            conversation_id: conversation_id.into(),
            account_id: None,
            display_name: None,
        }
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Same actor, different conversation.
    pub fn in_conversation(&self, conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            ..self.clone()
        }
    }

    /// The conversation this participant is in, without the account.
    pub fn conversation_scope(&self) -> Self {
        Self::new(
            self.service_endpoint.clone(),
            self.channel_id.clone(),
            self.conversation_id.clone(),
        )
    }

    pub fn is_conversation(&self) -> bool {
        self.account_id.is_none()
    }

    pub fn same_conversation(&self, other: &Participant) -> bool {
        self.service_endpoint == other.service_endpoint
            && self.channel_id == other.channel_id
            && self.conversation_id == other.conversation_id
    }

    pub fn same_identity(&self, other: &Participant) -> bool {
        self.same_conversation(other) && self.account_id == other.account_id
    }

    /// Stable key for pending-request and connection lookups.
    pub fn logical_key(&self) -> LogicalKey {
        match &self.account_id {
            Some(account_id) => LogicalKey::Account {
                channel_id: self.channel_id.clone(),
                account_id: account_id.clone(),
            },
            None => LogicalKey::Conversation {
                service_endpoint: self.service_endpoint.clone(),
                channel_id: self.channel_id.clone(),
                conversation_id: self.conversation_id.clone(),
            },
        }
    }

    /// Reject participants missing any part of their identity.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("service_endpoint", &self.service_endpoint),
            ("channel_id", &self.channel_id),
            ("conversation_id", &self.conversation_id),
        ];
        if let Some((field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(Error::invalid_argument(format!(
                "participant {field} must not be empty"
            )));
        }
        if self.account_id.as_deref().is_some_and(|a| a.trim().is_empty()) {
            return Err(Error::invalid_argument(
                "participant account_id must be absent or non-empty",
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let who = self
            .display_name
            .as_deref()
            .or(self.account_id.as_deref())
            .unwrap_or("(conversation)");
        write!(f, "{who} @ {}/{}", self.channel_id, self.conversation_id)
    }
}

/// The stable identity of an actor.
///
/// An account keeps its key when it moves to another conversation (e.g. a
/// dedicated conversation opened at accept time), so lookups keyed on it
/// survive the move. Conversation-only participants are keyed by their
/// conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum LogicalKey {
    Account {
        channel_id: String,
        account_id: String,
    },
    Conversation {
        service_endpoint: String,
        channel_id: String,
        conversation_id: String,
    },
}

fn escape(part: &str) -> String {
    part.replace('%', "%25").replace('/', "%2F")
}

/// Unambiguous string form, used as a storage key.
impl fmt::Display for LogicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Account {
                channel_id,
                account_id,
            } => write!(f, "account/{}/{}", escape(channel_id), escape(account_id)),
            Self::Conversation {
                service_endpoint,
                channel_id,
                conversation_id,
            } => write!(
                f,
                "conversation/{}/{}/{}",
                escape(service_endpoint),
                escape(channel_id),
                escape(conversation_id)
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantKind {
    /// The bot's own identity on a channel.
    Bot,
    User,
}

impl ParticipantKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bot => "bot",
            Self::User => "user",
        }
    }
}

/// A conversation registered to receive pending-request broadcasts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregationEndpoint(Participant);

impl AggregationEndpoint {
    /// Registers the conversation `participant` is in; any account is dropped.
    pub fn new(participant: &Participant) -> Self {
        Self(participant.conversation_scope())
    }

    pub fn participant(&self) -> &Participant {
        &self.0
    }

    /// Whether `participant` is in this conversation.
    pub fn contains(&self, participant: &Participant) -> bool {
        self.0.same_conversation(participant)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub requester: Participant,
    /// Unix milliseconds.
    pub enqueued_at: i64,
}

impl PendingRequest {
    pub fn new(requester: Participant) -> Self {
        Self {
            requester,
            enqueued_at: now_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub operator: Participant,
    pub client: Participant,
    /// Unix milliseconds.
    pub connected_at: i64,
}

impl Connection {
    pub fn new(operator: Participant, client: Participant) -> Self {
        Self {
            operator,
            client,
            connected_at: now_ms(),
        }
    }

    pub fn involves(&self, key: &LogicalKey) -> bool {
        self.operator.logical_key() == *key || self.client.logical_key() == *key
    }

    /// The other side of the connection from `key`.
    pub fn counterpart(&self, key: &LogicalKey) -> Option<&Participant> {
        if self.operator.logical_key() == *key {
            Some(&self.client)
        } else if self.client.logical_key() == *key {
            Some(&self.operator)
        } else {
            None
        }
    }
}

/// Everything the engine knows: tracked identities, aggregation endpoints,
/// the FIFO request queue and open connections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingState {
    pub bot_participants: Vec<Participant>,
    pub user_participants: Vec<Participant>,
    pub aggregation_endpoints: Vec<AggregationEndpoint>,
    pub pending_requests: VecDeque<PendingRequest>,
    pub connections: Vec<Connection>,
}

impl RoutingState {
    pub fn participants(&self, kind: ParticipantKind) -> &[Participant] {
        match kind {
            ParticipantKind::Bot => &self.bot_participants,
            ParticipantKind::User => &self.user_participants,
        }
    }

    pub fn participants_mut(&mut self, kind: ParticipantKind) -> &mut Vec<Participant> {
        match kind {
            ParticipantKind::Bot => &mut self.bot_participants,
            ParticipantKind::User => &mut self.user_participants,
        }
    }

    pub fn pending_index(&self, key: &LogicalKey) -> Option<usize> {
        self.pending_requests
            .iter()
            .position(|r| r.requester.logical_key() == *key)
    }

    pub fn connection_index(&self, key: &LogicalKey) -> Option<usize> {
        self.connections.iter().position(|c| c.involves(key))
    }

    pub fn connection_for(&self, key: &LogicalKey) -> Option<&Connection> {
        self.connections.iter().find(|c| c.involves(key))
    }

    pub fn is_associated_with_aggregation(&self, participant: &Participant) -> bool {
        self.aggregation_endpoints
            .iter()
            .any(|e| e.contains(participant))
    }

    pub fn is_empty(&self) -> bool {
        self.bot_participants.is_empty()
            && self.user_participants.is_empty()
            && self.aggregation_endpoints.is_empty()
            && self.pending_requests.is_empty()
            && self.connections.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
