//! SQLite-backed routing store using sqlx.

use {
    async_trait::async_trait,
    serde_json::json,
    sqlx::{Row, SqlitePool, sqlite::SqlitePoolOptions},
    tracing::debug,
};

use {
    handover_common::now_ms,
    handover_routing::{
        AggregationEndpoint, Connection, Participant, ParticipantKind, PendingRequest,
        RoutingState, RoutingStore,
    },
};

use crate::{Context, Error, Result};

/// Durable routing state. One engine process should own a database file;
/// the engine lock is the only writer serialization.
pub struct SqliteRoutingStore {
    pool: SqlitePool,
}

impl SqliteRoutingStore {
    /// Open `database_url` with its own pool and run migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("failed to connect to SQLite")?;

        crate::run_migrations(&pool).await?;
        debug!(database_url, "routing store opened");

        Ok(Self { pool })
    }

    /// Use an existing pool. Call [`crate::run_migrations`] first.
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn load_state(&self) -> Result<RoutingState> {
        let mut state = RoutingState::default();

        let rows = sqlx::query("SELECT kind, participant FROM participants ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;
        for row in rows {
            let kind: String = row.get("kind");
            let participant: Participant = serde_json::from_str(row.get("participant"))?;
            state
                .participants_mut(parse_kind(&kind)?)
                .push(participant);
        }

        let rows = sqlx::query("SELECT participant FROM aggregation_endpoints ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;
        for row in rows {
            let participant: Participant = serde_json::from_str(row.get("participant"))?;
            state
                .aggregation_endpoints
                .push(AggregationEndpoint::new(&participant));
        }

        let rows =
            sqlx::query("SELECT requester, enqueued_at FROM pending_requests ORDER BY rowid")
                .fetch_all(&self.pool)
                .await?;
        for row in rows {
            state.pending_requests.push_back(PendingRequest {
                requester: serde_json::from_str(row.get("requester"))?,
                enqueued_at: row.get("enqueued_at"),
            });
        }

        let rows = sqlx::query(
            "SELECT operator, client, connected_at FROM connections ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in rows {
            state.connections.push(Connection {
                operator: serde_json::from_str(row.get("operator"))?,
                client: serde_json::from_str(row.get("client"))?,
                connected_at: row.get("connected_at"),
            });
        }

        Ok(state)
    }
}

/// Key for same-identity matching: the full conversation plus the account.
fn identity_key(participant: &Participant) -> String {
    json!([
        participant.service_endpoint,
        participant.channel_id,
        participant.conversation_id,
        participant.account_id,
    ])
    .to_string()
}

fn parse_kind(kind: &str) -> Result<ParticipantKind> {
    match kind {
        "bot" => Ok(ParticipantKind::Bot),
        "user" => Ok(ParticipantKind::User),
        other => Err(Error::corrupt(format!("unknown participant kind {other:?}"))),
    }
}

#[async_trait]
impl RoutingStore for SqliteRoutingStore {
    async fn load(&self) -> anyhow::Result<RoutingState> {
        Ok(self.load_state().await?)
    }

    async fn upsert_participant(
        &self,
        participant: &Participant,
        kind: ParticipantKind,
    ) -> anyhow::Result<()> {
        let data = serde_json::to_string(participant)?;
        sqlx::query(
            "INSERT INTO participants (kind, identity, participant, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(kind, identity) DO UPDATE SET
               participant = excluded.participant,
               updated_at = excluded.updated_at",
        )
        .bind(kind.as_str())
        .bind(identity_key(participant))
        .bind(&data)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_participant(
        &self,
        participant: &Participant,
        kind: ParticipantKind,
    ) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM participants WHERE kind = ? AND identity = ?")
            .bind(kind.as_str())
            .bind(identity_key(participant))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_aggregation_endpoint(
        &self,
        endpoint: &AggregationEndpoint,
    ) -> anyhow::Result<()> {
        let participant = endpoint.participant();
        sqlx::query(
            "INSERT INTO aggregation_endpoints (conversation, participant, created_at)
             VALUES (?, ?, ?)
             ON CONFLICT(conversation) DO NOTHING",
        )
        .bind(participant.logical_key().to_string())
        .bind(serde_json::to_string(participant)?)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_aggregation_endpoint(
        &self,
        endpoint: &AggregationEndpoint,
    ) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM aggregation_endpoints WHERE conversation = ?")
            .bind(endpoint.participant().logical_key().to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_pending_request(&self, request: &PendingRequest) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO pending_requests (requester_key, requester, enqueued_at)
             VALUES (?, ?, ?)
             ON CONFLICT(requester_key) DO UPDATE SET
               requester = excluded.requester,
               enqueued_at = excluded.enqueued_at",
        )
        .bind(request.requester.logical_key().to_string())
        .bind(serde_json::to_string(&request.requester)?)
        .bind(request.enqueued_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_pending_request(&self, requester: &Participant) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM pending_requests WHERE requester_key = ?")
            .bind(requester.logical_key().to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_connection(&self, connection: &Connection) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO connections (operator_key, client_key, operator, client, connected_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(operator_key) DO UPDATE SET
               client_key = excluded.client_key,
               operator = excluded.operator,
               client = excluded.client,
               connected_at = excluded.connected_at",
        )
        .bind(connection.operator.logical_key().to_string())
        .bind(connection.client.logical_key().to_string())
        .bind(serde_json::to_string(&connection.operator)?)
        .bind(serde_json::to_string(&connection.client)?)
        .bind(connection.connected_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_connection(&self, connection: &Connection) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM connections WHERE operator_key = ?")
            .bind(connection.operator.logical_key().to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_all(&self) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in [
            "participants",
            "aggregation_endpoints",
            "pending_requests",
            "connections",
        ] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
