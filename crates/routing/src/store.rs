use std::sync::Mutex;

use {anyhow::Result, async_trait::async_trait};

use crate::model::{
    AggregationEndpoint, Connection, Participant, ParticipantKind, PendingRequest, RoutingState,
};

/// Durable backing for [`RoutingState`].
///
/// Each method is a single atomic write keyed as follows: participants by
/// same-identity, aggregation endpoints by conversation, pending requests by
/// the requester's logical key, connections by the operator's logical key.
/// The engine serializes all writers; a store shared between several engine
/// processes must provide that guarantee itself.
#[async_trait]
pub trait RoutingStore: Send + Sync {
    async fn load(&self) -> Result<RoutingState>;
    async fn upsert_participant(
        &self,
        participant: &Participant,
        kind: ParticipantKind,
    ) -> Result<()>;
    async fn remove_participant(
        &self,
        participant: &Participant,
        kind: ParticipantKind,
    ) -> Result<()>;
    async fn upsert_aggregation_endpoint(&self, endpoint: &AggregationEndpoint) -> Result<()>;
    async fn remove_aggregation_endpoint(&self, endpoint: &AggregationEndpoint) -> Result<()>;
    async fn upsert_pending_request(&self, request: &PendingRequest) -> Result<()>;
    async fn remove_pending_request(&self, requester: &Participant) -> Result<()>;
    async fn upsert_connection(&self, connection: &Connection) -> Result<()>;
    async fn remove_connection(&self, connection: &Connection) -> Result<()>;
    async fn delete_all(&self) -> Result<()>;
}

/// Process-local store. State is lost when the process exits and is not
/// shared between engine instances.
#[derive(Default)]
pub struct InMemoryRoutingStore {
    state: Mutex<RoutingState>,
}

impl InMemoryRoutingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing state, e.g. a fixture.
    pub fn with_state(state: RoutingState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut RoutingState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }
}

#[async_trait]
impl RoutingStore for InMemoryRoutingStore {
    async fn load(&self) -> Result<RoutingState> {
        Ok(self.with(|s| s.clone()))
    }

    async fn upsert_participant(
        &self,
        participant: &Participant,
        kind: ParticipantKind,
    ) -> Result<()> {
        self.with(|s| {
            let list = s.participants_mut(kind);
            match list.iter_mut().find(|p| p.same_identity(participant)) {
                Some(existing) => *existing = participant.clone(),
                None => list.push(participant.clone()),
            }
        });
        Ok(())
    }

    async fn remove_participant(
        &self,
        participant: &Participant,
        kind: ParticipantKind,
    ) -> Result<()> {
        self.with(|s| {
            s.participants_mut(kind)
                .retain(|p| !p.same_identity(participant))
        });
        Ok(())
    }

    async fn upsert_aggregation_endpoint(&self, endpoint: &AggregationEndpoint) -> Result<()> {
        self.with(|s| {
            if !s
                .aggregation_endpoints
                .iter()
                .any(|e| e.contains(endpoint.participant()))
            {
                s.aggregation_endpoints.push(endpoint.clone());
            }
        });
        Ok(())
    }

    async fn remove_aggregation_endpoint(&self, endpoint: &AggregationEndpoint) -> Result<()> {
        self.with(|s| {
            s.aggregation_endpoints
                .retain(|e| !e.contains(endpoint.participant()))
        });
        Ok(())
    }

    async fn upsert_pending_request(&self, request: &PendingRequest) -> Result<()> {
        self.with(|s| match s.pending_index(&request.requester.logical_key()) {
            Some(idx) => s.pending_requests[idx] = request.clone(),
            None => s.pending_requests.push_back(request.clone()),
        });
        Ok(())
    }

    async fn remove_pending_request(&self, requester: &Participant) -> Result<()> {
        let key = requester.logical_key();
        self.with(|s| {
            s.pending_requests
                .retain(|r| r.requester.logical_key() != key)
        });
        Ok(())
    }

    async fn upsert_connection(&self, connection: &Connection) -> Result<()> {
        let key = connection.operator.logical_key();
        self.with(|s| {
            match s
                .connections
                .iter_mut()
                .find(|c| c.operator.logical_key() == key)
            {
                Some(existing) => *existing = connection.clone(),
                None => s.connections.push(connection.clone()),
            }
        });
        Ok(())
    }

    async fn remove_connection(&self, connection: &Connection) -> Result<()> {
        let key = connection.operator.logical_key();
        self.with(|s| s.connections.retain(|c| c.operator.logical_key() != key));
        Ok(())
    }

    async fn delete_all(&self) -> Result<()> {
        self.with(RoutingState::clear);
        Ok(())
    }
}
