use clap::Subcommand;

use {
    handover_config::{HandoverConfig, StoreBackend},
    handover_routing::RoutingEngine,
};

use crate::store::{open_sqlite, open_store};

#[derive(Subcommand)]
pub enum DbAction {
    /// Run all pending database migrations.
    Migrate,
    /// Delete all routing state but keep the schema intact.
    Reset {
        /// Skip the confirmation check.
        #[arg(long)]
        yes: bool,
    },
}

pub async fn handle_db(action: &DbAction, config: &HandoverConfig) -> anyhow::Result<()> {
    match action {
        DbAction::Migrate => migrate(config).await,
        DbAction::Reset { yes } => reset(config, *yes).await,
    }
}

async fn migrate(config: &HandoverConfig) -> anyhow::Result<()> {
    if config.store.backend != StoreBackend::Sqlite {
        println!("Memory store configured; nothing to migrate.");
        return Ok(());
    }
    let store = open_sqlite(&config.store).await?;
    store.pool().close().await;
    if let Some(path) = config.store.resolved_path() {
        println!("Migrations applied: {}", path.display());
    }
    Ok(())
}

async fn reset(config: &HandoverConfig, yes: bool) -> anyhow::Result<()> {
    if !yes {
        anyhow::bail!("refusing to delete routing state without --yes");
    }
    let engine = RoutingEngine::new(open_store(&config.store).await?);
    engine.reset().await?;
    println!("Routing state cleared.");
    Ok(())
}
