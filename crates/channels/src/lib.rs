//! Channel delivery for the routing engine.
//!
//! Each chat platform implements [`ChannelOutbound`]; [`ChannelTransport`]
//! picks the outbound registered for a participant's channel id and plugs
//! into the engine as its message transport and conversation creator.

pub mod error;
pub mod outbound;
pub mod registry;
pub mod transport;

pub use {
    error::{Error, Result},
    outbound::ChannelOutbound,
    registry::ChannelRegistry,
    transport::ChannelTransport,
};
