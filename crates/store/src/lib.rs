//! Persistent routing state.
//!
//! [`SqliteRoutingStore`] implements [`handover_routing::RoutingStore`] on
//! SQLite. Participants are stored as JSON and keyed the same way the engine
//! matches them.

pub mod error;
pub mod sqlite;

pub use {
    error::{Context, Error, Result},
    sqlite::SqliteRoutingStore,
};

/// Run database migrations for the routing store.
///
/// Creates the participant, aggregation endpoint, pending request and
/// connection tables. Call once at start-up before using a pool with
/// [`SqliteRoutingStore::with_pool`].
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
