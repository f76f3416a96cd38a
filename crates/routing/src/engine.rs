//! The routing engine: owns [`RoutingState`] and runs every operation
//! against it under one writer lock.
//!
//! Mutations are check-then-act sequences across several collections, so
//! each one holds the write guard from the first check until the store has
//! accepted the last write. Anything that talks to the network (broadcasts,
//! relays, opening a dedicated conversation) happens with the guard
//! released, and its failure never rolls back committed state.

use std::sync::Arc;

use {
    futures::future::join_all,
    tokio::sync::RwLock,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use handover_metrics::{counter, gauge, labels, routing as routing_metrics};

use handover_config::RoutingConfig;

use crate::{
    Result,
    error::StoreContext,
    model::{
        AggregationEndpoint, Connection, Participant, ParticipantKind, PendingRequest,
        RoutingState,
    },
    policy::{AggregationOnly, OperatorAllowlist, OperatorPolicy},
    result::{Outcome, RoutingResult},
    store::RoutingStore,
    transport::{ConversationCreator, MessageTransport, NoopTransport, Payload},
};

/// Which pending requests a rejection applies to.
#[derive(Debug, Clone)]
pub enum RejectTarget {
    Requester(Participant),
    All,
}

pub struct RoutingEngine {
    state: RwLock<RoutingState>,
    store: Arc<dyn RoutingStore>,
    transport: Arc<dyn MessageTransport>,
    conversations: Option<Arc<dyn ConversationCreator>>,
    policy: Arc<dyn OperatorPolicy>,
    config: RoutingConfig,
}

impl RoutingEngine {
    /// Engine with empty state. Use [`Self::load`] to resume from a store.
    pub fn new(store: Arc<dyn RoutingStore>) -> Self {
        Self::with_state(store, RoutingState::default())
    }

    /// Engine hydrated from whatever `store` already holds.
    pub async fn load(store: Arc<dyn RoutingStore>) -> Result<Self> {
        let state = store.load().await.store_context("load routing state")?;
        info!(
            aggregation_endpoints = state.aggregation_endpoints.len(),
            pending = state.pending_requests.len(),
            connections = state.connections.len(),
            "routing state loaded"
        );
        Ok(Self::with_state(store, state))
    }

    fn with_state(store: Arc<dyn RoutingStore>, state: RoutingState) -> Self {
        Self {
            state: RwLock::new(state),
            store,
            transport: Arc::new(NoopTransport),
            conversations: None,
            policy: Arc::new(AggregationOnly),
            config: RoutingConfig::default(),
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn MessageTransport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_conversation_creator(mut self, creator: Arc<dyn ConversationCreator>) -> Self {
        self.conversations = Some(creator);
        self
    }

    pub fn with_operator_policy(mut self, policy: Arc<dyn OperatorPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Install `config`. Its operator allowlist (when non-empty) replaces the
    /// operator policy; the remaining flags drive [`Self::submit_request`] and
    /// [`Self::accept_request`].
    pub fn with_config(mut self, config: RoutingConfig) -> Self {
        let allowlist = OperatorAllowlist::from_config(&config);
        if !allowlist.is_empty() {
            self.policy = Arc::new(allowlist);
        }
        self.config = config;
        self
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    // ── Participants ────────────────────────────────────────────────────────

    /// Record a participant the first time it is seen. Returns whether a new
    /// entry was added; a known participant only has its display name
    /// refreshed.
    pub async fn track_participant(
        &self,
        participant: &Participant,
        kind: ParticipantKind,
    ) -> Result<bool> {
        participant.validate()?;
        let mut state = self.state.write().await;
        self.track_locked(&mut state, participant, kind).await
    }

    async fn track_locked(
        &self,
        state: &mut RoutingState,
        participant: &Participant,
        kind: ParticipantKind,
    ) -> Result<bool> {
        let list = state.participants_mut(kind);
        if let Some(existing) = list.iter_mut().find(|p| p.same_identity(participant)) {
            if participant.display_name.is_some()
                && existing.display_name != participant.display_name
            {
                self.store
                    .upsert_participant(participant, kind)
                    .await
                    .store_context("update participant")?;
                existing.display_name = participant.display_name.clone();
            }
            return Ok(false);
        }

        self.store
            .upsert_participant(participant, kind)
            .await
            .store_context("add participant")?;
        list.push(participant.clone());
        debug!(
            kind = kind.as_str(),
            channel_id = %participant.channel_id,
            conversation_id = %participant.conversation_id,
            "participant tracked"
        );
        Ok(true)
    }

    /// Forget a participant and everything hanging off it: its pending
    /// request, its connection, and the aggregation registration when the
    /// participant is a whole conversation.
    pub async fn remove_participant(
        &self,
        participant: &Participant,
    ) -> Result<Vec<RoutingResult>> {
        participant.validate()?;
        let key = participant.logical_key();
        let mut results = Vec::new();
        let mut state = self.state.write().await;

        if let Some(idx) = state.pending_index(&key) {
            let requester = state.pending_requests[idx].requester.clone();
            self.store
                .remove_pending_request(&requester)
                .await
                .store_context("remove pending request")?;
            state.pending_requests.remove(idx);
            results.push(
                RoutingResult::new(Outcome::ConnectionRejected {
                    requester,
                    rejecter: None,
                })
                .with_detail("participant removed"),
            );
        }

        if let Some(idx) = state.connection_index(&key) {
            let connection = state.connections[idx].clone();
            self.store
                .remove_connection(&connection)
                .await
                .store_context("remove connection")?;
            state.connections.remove(idx);
            results.push(
                RoutingResult::new(Outcome::Disconnected {
                    operator: connection.operator,
                    client: connection.client,
                })
                .with_detail("participant removed"),
            );
        }

        if participant.is_conversation() {
            let endpoints: Vec<_> = state
                .aggregation_endpoints
                .iter()
                .filter(|e| e.contains(participant))
                .cloned()
                .collect();
            for endpoint in &endpoints {
                self.store
                    .remove_aggregation_endpoint(endpoint)
                    .await
                    .store_context("remove aggregation endpoint")?;
            }
            state
                .aggregation_endpoints
                .retain(|e| !e.contains(participant));
        }

        for kind in [ParticipantKind::Bot, ParticipantKind::User] {
            let matching: Vec<_> = state
                .participants(kind)
                .iter()
                .filter(|p| p.logical_key() == key)
                .cloned()
                .collect();
            for p in &matching {
                self.store
                    .remove_participant(p, kind)
                    .await
                    .store_context("remove participant")?;
            }
            state
                .participants_mut(kind)
                .retain(|p| p.logical_key() != key);
        }

        info!(
            channel_id = %participant.channel_id,
            conversation_id = %participant.conversation_id,
            cascaded = results.len(),
            "participant removed"
        );
        #[cfg(feature = "metrics")]
        record_gauges(&state);
        Ok(results)
    }

    // ── Aggregation endpoints ───────────────────────────────────────────────

    /// Register the conversation `participant` is in. Returns `false` when it
    /// was already registered.
    pub async fn add_aggregation_endpoint(&self, participant: &Participant) -> Result<bool> {
        participant.validate()?;
        let endpoint = AggregationEndpoint::new(participant);
        let mut state = self.state.write().await;
        if state.is_associated_with_aggregation(participant) {
            return Ok(false);
        }
        self.store
            .upsert_aggregation_endpoint(&endpoint)
            .await
            .store_context("add aggregation endpoint")?;
        state.aggregation_endpoints.push(endpoint);
        info!(
            channel_id = %participant.channel_id,
            conversation_id = %participant.conversation_id,
            "aggregation endpoint registered"
        );
        Ok(true)
    }

    /// Unregister the conversation `participant` is in. Returns `false` when
    /// it was not registered.
    pub async fn remove_aggregation_endpoint(&self, participant: &Participant) -> Result<bool> {
        participant.validate()?;
        let endpoint = AggregationEndpoint::new(participant);
        let mut state = self.state.write().await;
        if !state.is_associated_with_aggregation(participant) {
            return Ok(false);
        }
        self.store
            .remove_aggregation_endpoint(&endpoint)
            .await
            .store_context("remove aggregation endpoint")?;
        state
            .aggregation_endpoints
            .retain(|e| !e.contains(participant));
        info!(
            channel_id = %participant.channel_id,
            conversation_id = %participant.conversation_id,
            "aggregation endpoint unregistered"
        );
        Ok(true)
    }

    // ── Requests ────────────────────────────────────────────────────────────

    /// Queue `requester` for an operator and notify every aggregation
    /// endpoint.
    pub async fn request_connection(
        &self,
        requester: &Participant,
        reject_if_no_aggregation: bool,
    ) -> Result<RoutingResult> {
        requester.validate()?;
        let key = requester.logical_key();

        let (request, endpoints) = {
            let mut state = self.state.write().await;

            if state.pending_index(&key).is_some() {
                return Ok(RoutingResult::new(Outcome::ConnectionAlreadyRequested {
                    requester: requester.clone(),
                }));
            }
            if let Some(connection) = state.connection_for(&key) {
                return Ok(RoutingResult::error(
                    Some(requester),
                    connection.counterpart(&key),
                    "already connected",
                ));
            }
            if state.aggregation_endpoints.is_empty() && reject_if_no_aggregation {
                #[cfg(feature = "metrics")]
                counter!(
                    routing_metrics::REQUESTS_REFUSED_TOTAL,
                    labels::REASON => "no_aggregation_channel"
                )
                .increment(1);
                return Ok(RoutingResult::new(Outcome::NoAggregationChannel {
                    requester: requester.clone(),
                }));
            }

            self.track_locked(&mut state, requester, ParticipantKind::User)
                .await?;
            let request = PendingRequest::new(requester.clone());
            self.store
                .upsert_pending_request(&request)
                .await
                .store_context("enqueue pending request")?;
            state.pending_requests.push_back(request.clone());

            info!(
                channel_id = %requester.channel_id,
                conversation_id = %requester.conversation_id,
                queue_len = state.pending_requests.len(),
                "connection requested"
            );
            #[cfg(feature = "metrics")]
            {
                counter!(
                    routing_metrics::REQUESTS_TOTAL,
                    labels::CHANNEL => requester.channel_id.clone()
                )
                .increment(1);
                record_gauges(&state);
            }
            (request, state.aggregation_endpoints.clone())
        };

        let mut result = RoutingResult::new(Outcome::ConnectionRequested {
            requester: requester.clone(),
        });
        let failed = self
            .broadcast(&endpoints, &Payload::connection_request(&request))
            .await;
        if failed > 0 {
            result = result.with_detail(format!(
                "{failed} of {} aggregation endpoints could not be notified",
                endpoints.len()
            ));
        }
        Ok(result)
    }

    /// [`Self::request_connection`] with the configured
    /// `reject_if_no_aggregation`.
    pub async fn submit_request(&self, requester: &Participant) -> Result<RoutingResult> {
        self.request_connection(requester, self.config.reject_if_no_aggregation)
            .await
    }

    /// Send `payload` to every endpoint concurrently; returns how many
    /// deliveries failed.
    async fn broadcast(&self, endpoints: &[AggregationEndpoint], payload: &Payload) -> usize {
        let deliveries = endpoints
            .iter()
            .map(|e| self.transport.deliver(e.participant(), payload));
        let outcomes = join_all(deliveries).await;

        let mut failed = 0;
        for (endpoint, outcome) in endpoints.iter().zip(outcomes) {
            if let Err(e) = outcome {
                failed += 1;
                warn!(
                    channel_id = %endpoint.participant().channel_id,
                    conversation_id = %endpoint.participant().conversation_id,
                    error = %e,
                    "aggregation broadcast failed"
                );
            }
        }
        #[cfg(feature = "metrics")]
        if failed > 0 {
            counter!(routing_metrics::BROADCAST_FAILURES_TOTAL).increment(failed as u64);
        }
        failed
    }

    /// Drop pending requests. Returns one `ConnectionRejected` per dropped
    /// request, or a single `NoActionTaken` when nothing matched.
    pub async fn reject_connection_request(
        &self,
        target: &RejectTarget,
        rejecter: Option<&Participant>,
    ) -> Result<Vec<RoutingResult>> {
        if let RejectTarget::Requester(requester) = target {
            requester.validate()?;
        }
        if let Some(rejecter) = rejecter {
            rejecter.validate()?;
        }

        let mut state = self.state.write().await;
        let rejected: Vec<PendingRequest> = match target {
            RejectTarget::All => state.pending_requests.iter().cloned().collect(),
            RejectTarget::Requester(requester) => state
                .pending_index(&requester.logical_key())
                .map(|idx| state.pending_requests[idx].clone())
                .into_iter()
                .collect(),
        };

        if rejected.is_empty() {
            let who = match target {
                RejectTarget::Requester(requester) => Some(requester),
                RejectTarget::All => None,
            };
            return Ok(vec![RoutingResult::no_action(who, "no pending request")]);
        }

        let mut results = Vec::with_capacity(rejected.len());
        for request in rejected {
            self.store
                .remove_pending_request(&request.requester)
                .await
                .store_context("remove pending request")?;
            let key = request.requester.logical_key();
            state
                .pending_requests
                .retain(|r| r.requester.logical_key() != key);
            debug!(
                channel_id = %request.requester.channel_id,
                conversation_id = %request.requester.conversation_id,
                "connection request rejected"
            );
            results.push(RoutingResult::new(Outcome::ConnectionRejected {
                requester: request.requester,
                rejecter: rejecter.cloned(),
            }));
        }

        #[cfg(feature = "metrics")]
        {
            counter!(routing_metrics::REJECTIONS_TOTAL).increment(results.len() as u64);
            record_gauges(&state);
        }
        Ok(results)
    }

    // ── Connections ─────────────────────────────────────────────────────────

    /// Accept `requester`'s pending request on behalf of `operator`.
    ///
    /// With `create_dedicated_conversation` the operator side of the new
    /// connection is re-keyed to a conversation opened by the configured
    /// [`ConversationCreator`]; if that fails the operator's own endpoint is
    /// used and the result detail says so.
    pub async fn connect(
        &self,
        operator: &Participant,
        requester: &Participant,
        create_dedicated_conversation: bool,
    ) -> Result<RoutingResult> {
        operator.validate()?;
        requester.validate()?;

        {
            let state = self.state.read().await;
            if let Some(refusal) = self.check_connect(&state, operator, requester) {
                return Ok(refusal);
            }
        }

        let (operator_endpoint, note) = if create_dedicated_conversation {
            self.open_dedicated_conversation(operator, requester).await
        } else {
            (operator.clone(), None)
        };

        let mut state = self.state.write().await;
        // Someone may have raced us while the conversation was being opened.
        if let Some(refusal) = self.check_connect(&state, operator, requester) {
            return Ok(refusal);
        }
        let Some(idx) = state.pending_index(&requester.logical_key()) else {
            return Ok(RoutingResult::error(
                Some(requester),
                None,
                "no pending request",
            ));
        };
        let client = state.pending_requests[idx].requester.clone();
        let connection = Connection::new(operator_endpoint, client);

        self.store
            .remove_pending_request(&connection.client)
            .await
            .store_context("remove accepted request")?;
        state.pending_requests.remove(idx);
        self.store
            .upsert_connection(&connection)
            .await
            .store_context("add connection")?;
        state.connections.push(connection.clone());

        info!(
            operator_conversation = %connection.operator.conversation_id,
            client_conversation = %connection.client.conversation_id,
            channel_id = %connection.client.channel_id,
            "connected"
        );
        #[cfg(feature = "metrics")]
        {
            counter!(routing_metrics::CONNECTIONS_TOTAL).increment(1);
            record_gauges(&state);
        }

        let result = RoutingResult::new(Outcome::Connected {
            operator: connection.operator,
            client: connection.client,
        });
        Ok(match note {
            Some(note) => result.with_detail(note),
            None => result,
        })
    }

    /// [`Self::connect`] with the configured `create_dedicated_conversation`.
    pub async fn accept_request(
        &self,
        operator: &Participant,
        requester: &Participant,
    ) -> Result<RoutingResult> {
        self.connect(operator, requester, self.config.create_dedicated_conversation)
            .await
    }

    /// Preconditions for [`Self::connect`]; `Some` is the refusal to return.
    fn check_connect(
        &self,
        state: &RoutingState,
        operator: &Participant,
        requester: &Participant,
    ) -> Option<RoutingResult> {
        let operator_key = operator.logical_key();
        let requester_key = requester.logical_key();

        if operator_key == requester_key {
            return Some(RoutingResult::error(
                Some(operator),
                None,
                "cannot connect a participant to itself",
            ));
        }
        if !state.is_associated_with_aggregation(operator) && !self.policy.permits(operator) {
            return Some(RoutingResult::error(
                Some(operator),
                None,
                "operator is not associated with an aggregation channel",
            ));
        }
        if let Some(existing) = state.connection_for(&operator_key) {
            return Some(RoutingResult::error(
                Some(operator),
                existing.counterpart(&operator_key),
                "operator is already connected",
            ));
        }
        if state.pending_index(&operator_key).is_some() {
            return Some(RoutingResult::error(
                Some(operator),
                None,
                "operator has a pending request of its own",
            ));
        }
        if state.pending_index(&requester_key).is_none() {
            return Some(RoutingResult::error(
                Some(requester),
                None,
                "no pending request",
            ));
        }
        if let Some(existing) = state.connection_for(&requester_key) {
            return Some(RoutingResult::error(
                Some(requester),
                existing.counterpart(&requester_key),
                "requester is already connected",
            ));
        }
        None
    }

    async fn open_dedicated_conversation(
        &self,
        operator: &Participant,
        client: &Participant,
    ) -> (Participant, Option<String>) {
        let Some(creator) = &self.conversations else {
            return (
                operator.clone(),
                Some("no conversation creator configured; using the original conversation".into()),
            );
        };
        match creator.create_conversation(operator, client).await {
            Ok(created) if created.validate().is_ok()
                && created.logical_key() == operator.logical_key() =>
            {
                debug!(
                    conversation_id = %created.conversation_id,
                    "dedicated conversation opened"
                );
                (created, None)
            },
            Ok(created) => {
                warn!(
                    conversation_id = %created.conversation_id,
                    "dedicated conversation does not belong to the operator, ignoring it"
                );
                (
                    operator.clone(),
                    Some("dedicated conversation rejected; using the original conversation".into()),
                )
            },
            Err(e) => {
                warn!(error = %e, "failed to open dedicated conversation");
                (
                    operator.clone(),
                    Some(format!(
                        "failed to open a dedicated conversation, using the original one: {e}"
                    )),
                )
            },
        }
    }

    /// Close the connection `participant` is on, from either side.
    pub async fn disconnect(&self, participant: &Participant) -> Result<RoutingResult> {
        participant.validate()?;
        let key = participant.logical_key();
        let mut state = self.state.write().await;

        let Some(idx) = state.connection_index(&key) else {
            return Ok(RoutingResult::no_action(Some(participant), "not connected"));
        };
        let connection = state.connections[idx].clone();
        self.store
            .remove_connection(&connection)
            .await
            .store_context("remove connection")?;
        state.connections.remove(idx);

        info!(
            operator_conversation = %connection.operator.conversation_id,
            client_conversation = %connection.client.conversation_id,
            "disconnected"
        );
        #[cfg(feature = "metrics")]
        {
            counter!(routing_metrics::DISCONNECTIONS_TOTAL).increment(1);
            record_gauges(&state);
        }
        Ok(RoutingResult::new(Outcome::Disconnected {
            operator: connection.operator,
            client: connection.client,
        }))
    }

    // ── Messages ────────────────────────────────────────────────────────────

    /// Relay `payload` to the other side of `sender`'s connection.
    ///
    /// `NoActionTaken` means the sender is not connected; callers typically
    /// follow up with [`Self::request_connection`].
    pub async fn route_message(
        &self,
        sender: &Participant,
        payload: &Payload,
    ) -> Result<RoutingResult> {
        sender.validate()?;
        let Some(target) = self.find_connected_counterpart(sender).await else {
            return Ok(RoutingResult::no_action(Some(sender), "sender is not connected"));
        };

        match self.transport.deliver(&target, payload).await {
            Ok(()) => {
                #[cfg(feature = "metrics")]
                counter!(routing_metrics::MESSAGES_FORWARDED_TOTAL).increment(1);
                Ok(RoutingResult::new(Outcome::Ok {
                    sender: sender.clone(),
                    target,
                }))
            },
            Err(e) => {
                warn!(
                    channel_id = %target.channel_id,
                    conversation_id = %target.conversation_id,
                    error = %e,
                    "failed to forward message"
                );
                #[cfg(feature = "metrics")]
                counter!(routing_metrics::FORWARD_FAILURES_TOTAL).increment(1);
                Ok(RoutingResult::new(Outcome::FailedToForwardMessage {
                    sender: sender.clone(),
                    target,
                })
                .with_detail(e.to_string()))
            },
        }
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    pub async fn find_connected_counterpart(&self, participant: &Participant) -> Option<Participant> {
        let key = participant.logical_key();
        let state = self.state.read().await;
        state
            .connection_for(&key)
            .and_then(|c| c.counterpart(&key))
            .cloned()
    }

    pub async fn is_associated_with_aggregation(&self, participant: &Participant) -> bool {
        self.state
            .read()
            .await
            .is_associated_with_aggregation(participant)
    }

    /// Pending requests, oldest first.
    pub async fn pending_requests(&self) -> Vec<PendingRequest> {
        self.state
            .read()
            .await
            .pending_requests
            .iter()
            .cloned()
            .collect()
    }

    pub async fn connections(&self) -> Vec<Connection> {
        self.state.read().await.connections.clone()
    }

    pub async fn aggregation_endpoints(&self) -> Vec<AggregationEndpoint> {
        self.state.read().await.aggregation_endpoints.clone()
    }

    pub async fn participants(&self, kind: ParticipantKind) -> Vec<Participant> {
        self.state.read().await.participants(kind).to_vec()
    }

    /// Consistent copy of the whole state.
    pub async fn snapshot(&self) -> RoutingState {
        self.state.read().await.clone()
    }

    /// Wipe the store and the in-memory state.
    pub async fn reset(&self) -> Result<()> {
        let mut state = self.state.write().await;
        self.store
            .delete_all()
            .await
            .store_context("delete routing state")?;
        state.clear();
        info!("routing state reset");
        #[cfg(feature = "metrics")]
        record_gauges(&state);
        Ok(())
    }
}

#[cfg(feature = "metrics")]
fn record_gauges(state: &RoutingState) {
    gauge!(routing_metrics::PENDING).set(state.pending_requests.len() as f64);
    gauge!(routing_metrics::CONNECTIONS_ACTIVE).set(state.connections.len() as f64);
}
