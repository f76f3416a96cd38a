//! Metric name and label definitions.

/// Routing engine metrics
pub mod routing {
    /// Connection requests enqueued
    pub const REQUESTS_TOTAL: &str = "handover_routing_requests_total";
    /// Connection requests refused, labelled by `reason`
    pub const REQUESTS_REFUSED_TOTAL: &str = "handover_routing_requests_refused_total";
    /// Requests currently waiting for an operator
    pub const PENDING: &str = "handover_routing_pending";
    /// Connections established
    pub const CONNECTIONS_TOTAL: &str = "handover_routing_connections_total";
    /// Connections currently open
    pub const CONNECTIONS_ACTIVE: &str = "handover_routing_connections_active";
    /// Pending requests rejected or dropped
    pub const REJECTIONS_TOTAL: &str = "handover_routing_rejections_total";
    /// Connections closed
    pub const DISCONNECTIONS_TOTAL: &str = "handover_routing_disconnections_total";
    /// Messages relayed between connected participants
    pub const MESSAGES_FORWARDED_TOTAL: &str = "handover_routing_messages_forwarded_total";
    /// Relays the transport failed to deliver
    pub const FORWARD_FAILURES_TOTAL: &str = "handover_routing_forward_failures_total";
    /// Aggregation broadcasts the transport failed to deliver
    pub const BROADCAST_FAILURES_TOTAL: &str = "handover_routing_broadcast_failures_total";
}

/// Common label keys
pub mod labels {
    pub const CHANNEL: &str = "channel";
    pub const REASON: &str = "reason";
}
