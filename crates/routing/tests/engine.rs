#![allow(clippy::unwrap_used, clippy::expect_used)]
use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    async_trait::async_trait,
    handover_config::RoutingConfig,
    handover_routing::{
        AggregationEndpoint, Connection, ConversationCreator, Error, InMemoryRoutingStore,
        MessageTransport, Outcome, Participant, ParticipantKind, Payload, PendingRequest,
        RejectTarget, ResultKind, RoutingEngine, RoutingState, RoutingStore,
    },
};

// ── Fixtures ────────────────────────────────────────────────────────────────

fn user(account: &str) -> Participant {
    Participant::new("https://svc", "msteams", format!("dm-{account}")).with_account(account)
}

fn agg() -> Participant {
    Participant::new("https://svc", "msteams", "ops")
}

fn operator(account: &str) -> Participant {
    agg().with_account(account)
}

/// Records every delivery and fails for conversations listed in `failing`.
#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<(Participant, Payload)>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingTransport {
    fn fail_for(&self, conversation_id: &str) {
        self.failing
            .lock()
            .unwrap()
            .insert(conversation_id.to_string());
    }

    fn sent(&self) -> Vec<(Participant, Payload)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageTransport for RecordingTransport {
    async fn deliver(&self, target: &Participant, payload: &Payload) -> anyhow::Result<()> {
        if self.failing.lock().unwrap().contains(&target.conversation_id) {
            anyhow::bail!("channel unavailable");
        }
        self.sent
            .lock()
            .unwrap()
            .push((target.clone(), payload.clone()));
        Ok(())
    }
}

/// Opens `dedicated-<client account>` for the operator, optionally slowly.
struct DedicatedConversations {
    delay: Duration,
}

#[async_trait]
impl ConversationCreator for DedicatedConversations {
    async fn create_conversation(
        &self,
        operator: &Participant,
        client: &Participant,
    ) -> anyhow::Result<Participant> {
        tokio::time::sleep(self.delay).await;
        let id = client.account_id.as_deref().unwrap_or("anon");
        Ok(operator.in_conversation(format!("dedicated-{id}")))
    }
}

struct BrokenConversations;

#[async_trait]
impl ConversationCreator for BrokenConversations {
    async fn create_conversation(
        &self,
        _operator: &Participant,
        _client: &Participant,
    ) -> anyhow::Result<Participant> {
        anyhow::bail!("conversation API returned 503")
    }
}

/// Store that rejects every write.
struct ReadOnlyStore;

#[async_trait]
impl RoutingStore for ReadOnlyStore {
    async fn load(&self) -> anyhow::Result<RoutingState> {
        Ok(RoutingState::default())
    }

    async fn upsert_participant(&self, _: &Participant, _: ParticipantKind) -> anyhow::Result<()> {
        anyhow::bail!("read-only")
    }

    async fn remove_participant(&self, _: &Participant, _: ParticipantKind) -> anyhow::Result<()> {
        anyhow::bail!("read-only")
    }

    async fn upsert_aggregation_endpoint(&self, _: &AggregationEndpoint) -> anyhow::Result<()> {
        anyhow::bail!("read-only")
    }

    async fn remove_aggregation_endpoint(&self, _: &AggregationEndpoint) -> anyhow::Result<()> {
        anyhow::bail!("read-only")
    }

    async fn upsert_pending_request(&self, _: &PendingRequest) -> anyhow::Result<()> {
        anyhow::bail!("read-only")
    }

    async fn remove_pending_request(&self, _: &Participant) -> anyhow::Result<()> {
        anyhow::bail!("read-only")
    }

    async fn upsert_connection(&self, _: &Connection) -> anyhow::Result<()> {
        anyhow::bail!("read-only")
    }

    async fn remove_connection(&self, _: &Connection) -> anyhow::Result<()> {
        anyhow::bail!("read-only")
    }

    async fn delete_all(&self) -> anyhow::Result<()> {
        anyhow::bail!("read-only")
    }
}

struct Harness {
    engine: RoutingEngine,
    store: Arc<InMemoryRoutingStore>,
    transport: Arc<RecordingTransport>,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryRoutingStore::new());
    let transport = Arc::new(RecordingTransport::default());
    let engine = RoutingEngine::new(store.clone()).with_transport(transport.clone());
    Harness {
        engine,
        store,
        transport,
    }
}

async fn with_aggregation() -> Harness {
    let h = harness();
    assert!(h.engine.add_aggregation_endpoint(&agg()).await.unwrap());
    h
}

fn pending_accounts(requests: &[PendingRequest]) -> Vec<String> {
    requests
        .iter()
        .map(|r| r.requester.account_id.clone().unwrap())
        .collect()
}

// ── Tracking ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn track_participant_is_idempotent() {
    let h = harness();
    assert!(
        h.engine
            .track_participant(&user("u1"), ParticipantKind::User)
            .await
            .unwrap()
    );
    assert!(
        !h.engine
            .track_participant(&user("u1"), ParticipantKind::User)
            .await
            .unwrap()
    );
    assert_eq!(h.engine.participants(ParticipantKind::User).await.len(), 1);
    assert!(h.engine.participants(ParticipantKind::Bot).await.is_empty());
}

#[tokio::test]
async fn track_participant_refreshes_display_name() {
    let h = harness();
    h.engine
        .track_participant(&user("u1"), ParticipantKind::User)
        .await
        .unwrap();
    let renamed = user("u1").with_display_name("Ada");
    assert!(
        !h.engine
            .track_participant(&renamed, ParticipantKind::User)
            .await
            .unwrap()
    );
    let users = h.engine.participants(ParticipantKind::User).await;
    assert_eq!(users[0].display_name.as_deref(), Some("Ada"));
    assert_eq!(
        h.store.load().await.unwrap().user_participants[0]
            .display_name
            .as_deref(),
        Some("Ada")
    );
}

#[tokio::test]
async fn bot_and_user_identities_are_kept_apart() {
    let h = harness();
    let bot = Participant::new("https://svc", "msteams", "dm-u1").with_account("bot");
    h.engine
        .track_participant(&bot, ParticipantKind::Bot)
        .await
        .unwrap();
    h.engine
        .track_participant(&user("u1"), ParticipantKind::User)
        .await
        .unwrap();
    assert_eq!(h.engine.participants(ParticipantKind::Bot).await, vec![bot]);
    assert_eq!(h.engine.participants(ParticipantKind::User).await, vec![user("u1")]);
}

#[tokio::test]
async fn incomplete_participant_is_invalid_argument() {
    let h = harness();
    let broken = Participant::new("https://svc", "", "conv");
    let err = h
        .engine
        .track_participant(&broken, ParticipantKind::User)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument { .. }));

    let err = h
        .engine
        .request_connection(&broken, true)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument { .. }));
    assert!(h.engine.snapshot().await.is_empty());
}

// ── Requests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_request_is_reported_once_queued() {
    let h = with_aggregation().await;
    let first = h.engine.request_connection(&user("u1"), true).await.unwrap();
    assert_eq!(first.kind(), ResultKind::ConnectionRequested);
    let second = h.engine.request_connection(&user("u1"), true).await.unwrap();
    assert_eq!(second.kind(), ResultKind::ConnectionAlreadyRequested);
    assert_eq!(
        pending_accounts(&h.engine.pending_requests().await),
        vec!["u1"]
    );
}

#[tokio::test]
async fn request_tracks_requester_as_user() {
    let h = with_aggregation().await;
    h.engine.request_connection(&user("u1"), true).await.unwrap();
    assert_eq!(h.engine.participants(ParticipantKind::User).await, vec![user("u1")]);
}

#[tokio::test]
async fn request_broadcasts_to_every_aggregation_endpoint() {
    let h = with_aggregation().await;
    let second = Participant::new("https://svc", "slack", "oncall");
    h.engine.add_aggregation_endpoint(&second).await.unwrap();

    let result = h.engine.request_connection(&user("u1"), true).await.unwrap();
    assert_eq!(result.detail, None);

    let sent = h.transport.sent();
    assert_eq!(sent.len(), 2);
    let targets: HashSet<_> = sent.iter().map(|(t, _)| t.conversation_id.clone()).collect();
    assert_eq!(targets, HashSet::from(["ops".to_string(), "oncall".to_string()]));
    let Payload::Structured(body) = &sent[0].1 else {
        panic!("broadcast should be structured");
    };
    assert_eq!(body["event"], "connection_request");
    assert_eq!(body["requester"]["account_id"], "u1");
}

#[tokio::test]
async fn broadcast_failure_keeps_request_queued() {
    let h = with_aggregation().await;
    h.transport.fail_for("ops");
    let result = h.engine.request_connection(&user("u1"), true).await.unwrap();
    assert_eq!(result.kind(), ResultKind::ConnectionRequested);
    assert!(result.detail.unwrap().starts_with("1 of 1"));
    assert_eq!(h.engine.pending_requests().await.len(), 1);
}

#[tokio::test]
async fn request_without_aggregation_can_proceed_silently() {
    let h = harness();
    let result = h.engine.request_connection(&user("u1"), false).await.unwrap();
    assert_eq!(result.kind(), ResultKind::ConnectionRequested);
    assert!(h.transport.sent().is_empty());
    assert_eq!(h.engine.pending_requests().await.len(), 1);
}

#[tokio::test]
async fn request_while_connected_is_error() {
    let h = with_aggregation().await;
    h.engine.request_connection(&user("u1"), true).await.unwrap();
    h.engine
        .connect(&operator("op1"), &user("u1"), false)
        .await
        .unwrap();

    let result = h.engine.request_connection(&user("u1"), true).await.unwrap();
    assert_eq!(result.kind(), ResultKind::Error);
    assert_eq!(result.detail.as_deref(), Some("already connected"));
    assert_eq!(result.participants(), vec![&user("u1"), &operator("op1")]);
    assert!(h.engine.pending_requests().await.is_empty());
}

// ── Scenarios ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn scenario_request_connect_disconnect() {
    let h = with_aggregation().await;
    let (b, u) = (operator("op1"), user("u1"));

    let requested = h.engine.request_connection(&u, true).await.unwrap();
    assert_eq!(requested.outcome, Outcome::ConnectionRequested {
        requester: u.clone()
    });
    assert_eq!(pending_accounts(&h.engine.pending_requests().await), vec!["u1"]);

    let connected = h.engine.connect(&b, &u, false).await.unwrap();
    assert_eq!(connected.outcome, Outcome::Connected {
        operator: b.clone(),
        client: u.clone(),
    });
    assert!(h.engine.pending_requests().await.is_empty());
    let connections = h.engine.connections().await;
    assert_eq!(connections.len(), 1);
    assert_eq!(connections[0].operator, b);
    assert_eq!(connections[0].client, u);

    let disconnected = h.engine.disconnect(&b).await.unwrap();
    assert_eq!(disconnected.outcome, Outcome::Disconnected {
        operator: b.clone(),
        client: u.clone(),
    });
    assert!(h.engine.connections().await.is_empty());
    assert!(h.engine.find_connected_counterpart(&b).await.is_none());
    assert!(h.engine.find_connected_counterpart(&u).await.is_none());
}

#[tokio::test]
async fn scenario_no_aggregation_channel() {
    let h = harness();
    let result = h.engine.request_connection(&user("u1"), true).await.unwrap();
    assert_eq!(result.outcome, Outcome::NoAggregationChannel {
        requester: user("u1")
    });
    assert!(h.engine.pending_requests().await.is_empty());
    assert!(h.store.load().await.unwrap().pending_requests.is_empty());
}

#[tokio::test]
async fn scenario_busy_operator_leaves_second_request_pending() {
    let h = with_aggregation().await;
    let b = operator("op1");
    h.engine.request_connection(&user("u1"), true).await.unwrap();
    h.engine.request_connection(&user("u2"), true).await.unwrap();

    let first = h.engine.connect(&b, &user("u1"), false).await.unwrap();
    assert_eq!(first.kind(), ResultKind::Connected);

    let second = h.engine.connect(&b, &user("u2"), false).await.unwrap();
    assert_eq!(second.kind(), ResultKind::Error);
    assert_eq!(second.participants(), vec![&b, &user("u1")]);
    assert_eq!(h.engine.connections().await.len(), 1);
    assert_eq!(pending_accounts(&h.engine.pending_requests().await), vec!["u2"]);
}

// ── Connect ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn connect_without_pending_request_is_error() {
    let h = with_aggregation().await;
    let result = h
        .engine
        .connect(&operator("op1"), &user("u1"), false)
        .await
        .unwrap();
    assert_eq!(result.kind(), ResultKind::Error);
    assert_eq!(result.detail.as_deref(), Some("no pending request"));
    assert!(h.engine.connections().await.is_empty());
}

#[tokio::test]
async fn connect_matches_pending_request_by_identity() {
    let h = with_aggregation().await;
    h.engine.request_connection(&user("u1"), true).await.unwrap();
    // Same account, stale display name: still the same requester.
    let same = user("u1").with_display_name("someone else");
    let result = h.engine.connect(&operator("op1"), &same, false).await.unwrap();
    assert_eq!(result.kind(), ResultKind::Connected);
    assert!(h.engine.pending_requests().await.is_empty());
}

#[tokio::test]
async fn connect_requires_aggregation_association() {
    let h = with_aggregation().await;
    h.engine.request_connection(&user("u1"), true).await.unwrap();
    let outsider = Participant::new("https://svc", "msteams", "elsewhere").with_account("op9");

    let result = h.engine.connect(&outsider, &user("u1"), false).await.unwrap();
    assert_eq!(result.kind(), ResultKind::Error);
    assert_eq!(h.engine.pending_requests().await.len(), 1);
}

#[tokio::test]
async fn allowlisted_operator_may_connect_from_anywhere() {
    let store = Arc::new(InMemoryRoutingStore::new());
    let engine = RoutingEngine::new(store).with_config(RoutingConfig {
        operator_allowlist: vec!["support-*".into()],
        reject_if_no_aggregation: false,
        ..Default::default()
    });
    assert!(!engine.config().reject_if_no_aggregation);
    engine.request_connection(&user("u1"), false).await.unwrap();

    let outsider = Participant::new("https://svc", "msteams", "desk").with_account("Support-7");
    let result = engine.connect(&outsider, &user("u1"), false).await.unwrap();
    assert_eq!(result.kind(), ResultKind::Connected);
}

#[tokio::test]
async fn connecting_to_self_is_refused() {
    let h = with_aggregation().await;
    let b = operator("op1");
    h.engine.request_connection(&b, true).await.unwrap();
    let result = h.engine.connect(&b, &b, false).await.unwrap();
    assert_eq!(result.kind(), ResultKind::Error);
    assert!(h.engine.connections().await.is_empty());
}

#[tokio::test]
async fn queued_operator_cannot_accept_another_request() {
    let h = with_aggregation().await;
    h.engine.request_connection(&operator("op1"), true).await.unwrap();
    h.engine.request_connection(&user("u1"), true).await.unwrap();

    let result = h
        .engine
        .connect(&operator("op1"), &user("u1"), false)
        .await
        .unwrap();
    assert_eq!(result.kind(), ResultKind::Error);
    assert!(h.engine.connections().await.is_empty());
    assert_eq!(
        pending_accounts(&h.engine.pending_requests().await),
        vec!["op1", "u1"]
    );
    assert_eq!(h.engine.find_connected_counterpart(&operator("op1")).await, None);

    // Once its own request is withdrawn the operator may accept.
    h.engine
        .reject_connection_request(&RejectTarget::Requester(operator("op1")), None)
        .await
        .unwrap();
    let result = h
        .engine
        .connect(&operator("op1"), &user("u1"), false)
        .await
        .unwrap();
    assert_eq!(result.kind(), ResultKind::Connected);
    assert!(h.engine.pending_requests().await.is_empty());
}

#[tokio::test]
async fn submit_request_follows_configured_aggregation_rule() {
    let strict = harness();
    let result = strict.engine.submit_request(&user("u1")).await.unwrap();
    assert_eq!(result.kind(), ResultKind::NoAggregationChannel);
    assert!(strict.engine.pending_requests().await.is_empty());

    let lenient = RoutingEngine::new(Arc::new(InMemoryRoutingStore::new())).with_config(
        RoutingConfig {
            reject_if_no_aggregation: false,
            ..Default::default()
        },
    );
    let result = lenient.submit_request(&user("u1")).await.unwrap();
    assert_eq!(result.kind(), ResultKind::ConnectionRequested);
    assert_eq!(lenient.pending_requests().await.len(), 1);
}

#[tokio::test]
async fn accept_request_opens_dedicated_conversation_when_configured() {
    let engine = RoutingEngine::new(Arc::new(InMemoryRoutingStore::new()))
        .with_conversation_creator(Arc::new(DedicatedConversations {
            delay: Duration::ZERO,
        }))
        .with_config(RoutingConfig {
            create_dedicated_conversation: true,
            ..Default::default()
        });
    engine.add_aggregation_endpoint(&agg()).await.unwrap();
    engine.submit_request(&user("u1")).await.unwrap();

    let result = engine
        .accept_request(&operator("op1"), &user("u1"))
        .await
        .unwrap();
    let Outcome::Connected { operator, .. } = &result.outcome else {
        panic!("expected connected, got {:?}", result.kind());
    };
    assert_eq!(operator.conversation_id, "dedicated-u1");
}

#[tokio::test]
async fn client_cannot_be_claimed_by_second_operator() {
    let h = with_aggregation().await;
    h.engine.request_connection(&user("u1"), true).await.unwrap();
    h.engine
        .connect(&operator("op1"), &user("u1"), false)
        .await
        .unwrap();
    let result = h
        .engine
        .connect(&operator("op2"), &user("u1"), false)
        .await
        .unwrap();
    assert_eq!(result.kind(), ResultKind::Error);
    assert_eq!(h.engine.connections().await.len(), 1);
}

#[tokio::test]
async fn dedicated_conversation_keeps_operator_identity() {
    let store = Arc::new(InMemoryRoutingStore::new());
    let transport = Arc::new(RecordingTransport::default());
    let engine = RoutingEngine::new(store)
        .with_transport(transport.clone())
        .with_conversation_creator(Arc::new(DedicatedConversations {
            delay: Duration::ZERO,
        }));
    engine.add_aggregation_endpoint(&agg()).await.unwrap();
    engine.request_connection(&user("u1"), true).await.unwrap();

    let b = operator("op1");
    let result = engine.connect(&b, &user("u1"), true).await.unwrap();
    let Outcome::Connected { operator, client } = &result.outcome else {
        panic!("expected connected, got {:?}", result.kind());
    };
    assert_eq!(operator.conversation_id, "dedicated-u1");
    assert_eq!(client, &user("u1"));
    assert_eq!(result.detail, None);

    // The client's messages land in the dedicated conversation.
    let routed = engine
        .route_message(&user("u1"), &Payload::Text("hi".into()))
        .await
        .unwrap();
    assert_eq!(routed.kind(), ResultKind::Ok);
    assert_eq!(transport.sent().last().unwrap().0.conversation_id, "dedicated-u1");

    // The operator is still found from the conversation they accepted in.
    assert_eq!(engine.find_connected_counterpart(&b).await, Some(user("u1")));
    let disconnected = engine.disconnect(&b).await.unwrap();
    assert_eq!(disconnected.kind(), ResultKind::Disconnected);
}

#[tokio::test]
async fn dedicated_conversation_failure_falls_back_to_original() {
    let h = with_aggregation().await;
    let engine = h
        .engine
        .with_conversation_creator(Arc::new(BrokenConversations));
    engine.request_connection(&user("u1"), true).await.unwrap();

    let result = engine.connect(&operator("op1"), &user("u1"), true).await.unwrap();
    assert_eq!(result.outcome, Outcome::Connected {
        operator: operator("op1"),
        client: user("u1"),
    });
    assert!(result.detail.unwrap().contains("503"));
}

#[tokio::test]
async fn dedicated_conversation_without_creator_is_noted() {
    let h = with_aggregation().await;
    h.engine.request_connection(&user("u1"), true).await.unwrap();
    let result = h
        .engine
        .connect(&operator("op1"), &user("u1"), true)
        .await
        .unwrap();
    assert_eq!(result.kind(), ResultKind::Connected);
    assert!(result.detail.is_some());
}

// ── Reject ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn reject_single_request_names_rejecter() {
    let h = with_aggregation().await;
    h.engine.request_connection(&user("u1"), true).await.unwrap();
    h.engine.request_connection(&user("u2"), true).await.unwrap();

    let b = operator("op1");
    let results = h
        .engine
        .reject_connection_request(&RejectTarget::Requester(user("u1")), Some(&b))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].outcome, Outcome::ConnectionRejected {
        requester: user("u1"),
        rejecter: Some(b),
    });
    assert_eq!(pending_accounts(&h.engine.pending_requests().await), vec!["u2"]);
}

#[tokio::test]
async fn reject_all_emits_one_result_per_request() {
    let h = with_aggregation().await;
    for account in ["u1", "u2", "u3"] {
        h.engine.request_connection(&user(account), true).await.unwrap();
    }
    let results = h
        .engine
        .reject_connection_request(&RejectTarget::All, None)
        .await
        .unwrap();
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.kind() == ResultKind::ConnectionRejected));
    assert!(h.engine.pending_requests().await.is_empty());
    assert!(h.store.load().await.unwrap().pending_requests.is_empty());
}

#[tokio::test]
async fn reject_without_match_takes_no_action() {
    let h = with_aggregation().await;
    let results = h
        .engine
        .reject_connection_request(&RejectTarget::Requester(user("u1")), None)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].kind(), ResultKind::NoActionTaken);

    let results = h
        .engine
        .reject_connection_request(&RejectTarget::All, None)
        .await
        .unwrap();
    assert_eq!(results[0].kind(), ResultKind::NoActionTaken);
}

// ── Disconnect and routing ──────────────────────────────────────────────────

#[tokio::test]
async fn disconnect_from_client_side() {
    let h = with_aggregation().await;
    h.engine.request_connection(&user("u1"), true).await.unwrap();
    h.engine
        .connect(&operator("op1"), &user("u1"), false)
        .await
        .unwrap();
    let result = h.engine.disconnect(&user("u1")).await.unwrap();
    assert_eq!(result.outcome, Outcome::Disconnected {
        operator: operator("op1"),
        client: user("u1"),
    });
}

#[tokio::test]
async fn disconnect_when_not_connected_takes_no_action() {
    let h = harness();
    let result = h.engine.disconnect(&user("u1")).await.unwrap();
    assert_eq!(result.kind(), ResultKind::NoActionTaken);
}

#[tokio::test]
async fn messages_flow_both_ways() {
    let h = with_aggregation().await;
    let (b, u) = (operator("op1"), user("u1"));
    h.engine.request_connection(&u, true).await.unwrap();
    h.engine.connect(&b, &u, false).await.unwrap();
    let before = h.transport.sent().len();

    let from_client = h
        .engine
        .route_message(&u, &Payload::Text("help".into()))
        .await
        .unwrap();
    assert_eq!(from_client.outcome, Outcome::Ok {
        sender: u.clone(),
        target: b.clone(),
    });
    let from_operator = h
        .engine
        .route_message(&b, &Payload::Text("hello".into()))
        .await
        .unwrap();
    assert_eq!(from_operator.outcome, Outcome::Ok {
        sender: b.clone(),
        target: u.clone(),
    });

    let sent = h.transport.sent();
    let sent = &sent[before..];
    assert_eq!(sent[0], (b, Payload::Text("help".into())));
    assert_eq!(sent[1], (u, Payload::Text("hello".into())));
}

#[tokio::test]
async fn unconnected_sender_takes_no_action() {
    let h = harness();
    let result = h
        .engine
        .route_message(&user("u1"), &Payload::Text("hi".into()))
        .await
        .unwrap();
    assert_eq!(result.kind(), ResultKind::NoActionTaken);
    assert!(h.transport.sent().is_empty());
}

#[tokio::test]
async fn forward_failure_keeps_connection() {
    let h = with_aggregation().await;
    h.engine.request_connection(&user("u1"), true).await.unwrap();
    h.engine
        .connect(&operator("op1"), &user("u1"), false)
        .await
        .unwrap();
    h.transport.fail_for("dm-u1");

    let result = h
        .engine
        .route_message(&operator("op1"), &Payload::Text("hello".into()))
        .await
        .unwrap();
    assert_eq!(result.kind(), ResultKind::FailedToForwardMessage);
    assert_eq!(result.detail.as_deref(), Some("channel unavailable"));
    assert_eq!(h.engine.connections().await.len(), 1);
}

// ── Removal ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn removing_pending_requester_rejects_request() {
    let h = with_aggregation().await;
    h.engine.request_connection(&user("u1"), true).await.unwrap();
    let results = h.engine.remove_participant(&user("u1")).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].kind(), ResultKind::ConnectionRejected);
    assert!(h.engine.pending_requests().await.is_empty());
    assert!(h.engine.participants(ParticipantKind::User).await.is_empty());
}

#[tokio::test]
async fn removing_connected_operator_disconnects() {
    let h = with_aggregation().await;
    h.engine.request_connection(&user("u1"), true).await.unwrap();
    h.engine
        .connect(&operator("op1"), &user("u1"), false)
        .await
        .unwrap();
    let results = h.engine.remove_participant(&operator("op1")).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].outcome, Outcome::Disconnected {
        operator: operator("op1"),
        client: user("u1"),
    });
    assert!(h.engine.connections().await.is_empty());
    // An operator account leaving does not unregister its team conversation.
    assert!(h.engine.is_associated_with_aggregation(&agg()).await);
}

#[tokio::test]
async fn removing_aggregation_conversation_unregisters_it() {
    let h = with_aggregation().await;
    let results = h.engine.remove_participant(&agg()).await.unwrap();
    assert!(results.is_empty());
    assert!(h.engine.aggregation_endpoints().await.is_empty());
    assert!(!h.engine.is_associated_with_aggregation(&operator("op1")).await);
}

// ── Aggregation endpoints ───────────────────────────────────────────────────

#[tokio::test]
async fn aggregation_registration_is_per_conversation() {
    let h = harness();
    assert!(h.engine.add_aggregation_endpoint(&operator("op1")).await.unwrap());
    assert!(!h.engine.add_aggregation_endpoint(&operator("op2")).await.unwrap());
    let endpoints = h.engine.aggregation_endpoints().await;
    assert_eq!(endpoints.len(), 1);
    assert!(endpoints[0].participant().is_conversation());

    assert!(h.engine.remove_aggregation_endpoint(&agg()).await.unwrap());
    assert!(!h.engine.remove_aggregation_endpoint(&agg()).await.unwrap());
}

// ── Persistence ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn state_is_written_through_and_reloadable() {
    let h = with_aggregation().await;
    h.engine.request_connection(&user("u1"), true).await.unwrap();
    h.engine.request_connection(&user("u2"), true).await.unwrap();
    h.engine
        .connect(&operator("op1"), &user("u1"), false)
        .await
        .unwrap();

    let persisted = h.store.load().await.unwrap();
    assert_eq!(persisted, h.engine.snapshot().await);

    let resumed = RoutingEngine::load(h.store.clone()).await.unwrap();
    assert_eq!(
        resumed.find_connected_counterpart(&user("u1")).await,
        Some(operator("op1"))
    );
    assert_eq!(pending_accounts(&resumed.pending_requests().await), vec!["u2"]);
}

#[tokio::test]
async fn store_failure_leaves_state_untouched() {
    let engine = RoutingEngine::new(Arc::new(ReadOnlyStore));
    let err = engine.add_aggregation_endpoint(&agg()).await.unwrap_err();
    assert!(matches!(err, Error::Store { .. }));
    assert!(err.to_string().contains("add aggregation endpoint"));
    assert!(engine.aggregation_endpoints().await.is_empty());

    let err = engine.request_connection(&user("u1"), false).await.unwrap_err();
    assert!(matches!(err, Error::Store { .. }));
    assert!(engine.snapshot().await.is_empty());
}

#[tokio::test]
async fn reset_clears_engine_and_store() {
    let h = with_aggregation().await;
    h.engine.request_connection(&user("u1"), true).await.unwrap();
    h.engine.reset().await.unwrap();
    assert!(h.engine.snapshot().await.is_empty());
    assert!(h.store.load().await.unwrap().is_empty());
}
