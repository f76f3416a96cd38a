//! Shared error plumbing and small utilities used across the handover crates.

pub mod error;
pub mod time;

pub use {error::FromMessage, time::now_ms};
