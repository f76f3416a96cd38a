//! Human handover routing.
//!
//! Tracks who is talking to the bot, queues users asking for a human
//! operator, pairs them with an operator and relays messages between the
//! two. All state lives in [`RoutingEngine`]; persistence and delivery are
//! behind the [`RoutingStore`] and [`MessageTransport`] seams.
//!
//! Matching rules:
//! - aggregation membership uses [`Participant::same_conversation`]
//! - participant tracking uses [`Participant::same_identity`]
//! - pending requests and connections use [`Participant::logical_key`], so a
//!   connection survives the operator moving into a dedicated conversation

pub mod engine;
pub mod error;
pub mod model;
pub mod policy;
pub mod result;
pub mod store;
pub mod transport;

pub use {
    engine::{RejectTarget, RoutingEngine},
    error::{Error, Result},
    model::{
        AggregationEndpoint, Connection, LogicalKey, Participant, ParticipantKind,
        PendingRequest, RoutingState,
    },
    policy::{AggregationOnly, OperatorAllowlist, OperatorPolicy},
    result::{Outcome, ReplyContext, ResultKind, RoutingResult},
    store::{InMemoryRoutingStore, RoutingStore},
    transport::{ConversationCreator, MessageTransport, NoopTransport, Payload},
};
