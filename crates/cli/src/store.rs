use std::sync::Arc;

use {anyhow::Context, tracing::warn};

use {
    handover_config::{StoreBackend, StoreConfig},
    handover_routing::{InMemoryRoutingStore, RoutingStore},
    handover_store::SqliteRoutingStore,
};

/// Open the configured routing store. The sqlite backend is migrated on
/// open.
pub async fn open_store(config: &StoreConfig) -> anyhow::Result<Arc<dyn RoutingStore>> {
    match config.backend {
        StoreBackend::Memory => {
            warn!("memory store configured; nothing is persisted between runs");
            Ok(Arc::new(InMemoryRoutingStore::new()))
        },
        StoreBackend::Sqlite => Ok(Arc::new(open_sqlite(config).await?)),
    }
}

pub async fn open_sqlite(config: &StoreConfig) -> anyhow::Result<SqliteRoutingStore> {
    let path = config
        .resolved_path()
        .context("store.path is not set and no user data directory is available")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let url = config
        .database_url()
        .context("no database url for the sqlite store")?;
    SqliteRoutingStore::connect(&url)
        .await
        .with_context(|| format!("failed to open routing store at {}", path.display()))
}
