//! Outcomes reported by the routing engine.
//!
//! The engine never talks to users; it returns one of these and leaves the
//! wording and delivery to the result handler. Matching on [`Outcome`] is
//! exhaustive, so a new variant breaks every handler until it is covered.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::Participant;

/// Reference to the inbound activity that triggered a result, so the
/// handler can reply in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyContext {
    pub activity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<Participant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    NoActionTaken {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        participant: Option<Participant>,
    },
    /// A message was relayed.
    Ok {
        sender: Participant,
        target: Participant,
    },
    ConnectionRequested {
        requester: Participant,
    },
    ConnectionAlreadyRequested {
        requester: Participant,
    },
    ConnectionRejected {
        requester: Participant,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rejecter: Option<Participant>,
    },
    Connected {
        operator: Participant,
        client: Participant,
    },
    Disconnected {
        operator: Participant,
        client: Participant,
    },
    NoAggregationChannel {
        requester: Participant,
    },
    NoAgentsAvailable {
        requester: Participant,
    },
    FailedToForwardMessage {
        sender: Participant,
        target: Participant,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        participant: Option<Participant>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        counterpart: Option<Participant>,
    },
}

/// Fieldless discriminant of [`Outcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    NoActionTaken,
    Ok,
    ConnectionRequested,
    ConnectionAlreadyRequested,
    ConnectionRejected,
    Connected,
    Disconnected,
    NoAggregationChannel,
    NoAgentsAvailable,
    FailedToForwardMessage,
    Error,
}

impl ResultKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoActionTaken => "no_action_taken",
            Self::Ok => "ok",
            Self::ConnectionRequested => "connection_requested",
            Self::ConnectionAlreadyRequested => "connection_already_requested",
            Self::ConnectionRejected => "connection_rejected",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::NoAggregationChannel => "no_aggregation_channel",
            Self::NoAgentsAvailable => "no_agents_available",
            Self::FailedToForwardMessage => "failed_to_forward_message",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Outcome {
    pub fn kind(&self) -> ResultKind {
        match self {
            Self::NoActionTaken { .. } => ResultKind::NoActionTaken,
            Self::Ok { .. } => ResultKind::Ok,
            Self::ConnectionRequested { .. } => ResultKind::ConnectionRequested,
            Self::ConnectionAlreadyRequested { .. } => ResultKind::ConnectionAlreadyRequested,
            Self::ConnectionRejected { .. } => ResultKind::ConnectionRejected,
            Self::Connected { .. } => ResultKind::Connected,
            Self::Disconnected { .. } => ResultKind::Disconnected,
            Self::NoAggregationChannel { .. } => ResultKind::NoAggregationChannel,
            Self::NoAgentsAvailable { .. } => ResultKind::NoAgentsAvailable,
            Self::FailedToForwardMessage { .. } => ResultKind::FailedToForwardMessage,
            Self::Error { .. } => ResultKind::Error,
        }
    }

    /// The zero to two participants this outcome concerns.
    pub fn participants(&self) -> Vec<&Participant> {
        match self {
            Self::NoActionTaken { participant } => participant.iter().collect(),
            Self::Ok { sender, target } | Self::FailedToForwardMessage { sender, target } => {
                vec![sender, target]
            },
            Self::ConnectionRequested { requester }
            | Self::ConnectionAlreadyRequested { requester }
            | Self::NoAggregationChannel { requester }
            | Self::NoAgentsAvailable { requester } => vec![requester],
            Self::ConnectionRejected {
                requester,
                rejecter,
            } => std::iter::once(requester).chain(rejecter.iter()).collect(),
            Self::Connected { operator, client } | Self::Disconnected { operator, client } => {
                vec![operator, client]
            },
            Self::Error {
                participant,
                counterpart,
            } => participant.iter().chain(counterpart.iter()).collect(),
        }
    }
}

/// One engine outcome plus optional detail and reply context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingResult {
    #[serde(flatten)]
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ReplyContext>,
}

impl RoutingResult {
    pub fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            detail: None,
            context: None,
        }
    }

    pub fn no_action(participant: Option<&Participant>, detail: impl Into<String>) -> Self {
        Self::new(Outcome::NoActionTaken {
            participant: participant.cloned(),
        })
        .with_detail(detail)
    }

    pub fn error(
        participant: Option<&Participant>,
        counterpart: Option<&Participant>,
        detail: impl Into<String>,
    ) -> Self {
        Self::new(Outcome::Error {
            participant: participant.cloned(),
            counterpart: counterpart.cloned(),
        })
        .with_detail(detail)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_context(mut self, context: ReplyContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn kind(&self) -> ResultKind {
        self.outcome.kind()
    }

    pub fn participants(&self) -> Vec<&Participant> {
        self.outcome.participants()
    }
}
