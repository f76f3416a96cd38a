//! Metric names for the handover crates.
//!
//! Recording goes through the `metrics` facade, so nothing is collected until
//! the host process installs a recorder.
//!
//! ```rust,ignore
//! use handover_metrics::{counter, routing};
//!
//! counter!(routing::REQUESTS_TOTAL).increment(1);
//! ```

mod definitions;

pub use definitions::*;

pub use metrics::{counter, gauge};
