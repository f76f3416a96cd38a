mod config_commands;
mod db_commands;
mod state_commands;
mod store;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::debug,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use handover_config::HandoverConfig;

#[derive(Parser)]
#[command(name = "handover", about = "Handover: human operator routing for chat bots")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery in ./ and the user config directory).
    #[arg(long, global = true, env = "HANDOVER_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect or edit the persisted routing state.
    State {
        #[command(subcommand)]
        action: state_commands::StateAction,
    },
    /// Database management (migrate, reset).
    Db {
        #[command(subcommand)]
        action: db_commands::DbAction,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(true),
            )
            .init();
    }
}

/// The explicit `--config` file when given, otherwise the discovered one.
fn load_config(cli: &Cli) -> anyhow::Result<HandoverConfig> {
    match &cli.config {
        Some(path) => handover_config::load_config(path),
        None => Ok(handover_config::discover_and_load()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    debug!(version = env!("CARGO_PKG_VERSION"), "handover starting");

    match &cli.command {
        Commands::Config { action } => config_commands::handle_config(action, &cli),
        Commands::State { action } => {
            let config = load_config(&cli)?;
            state_commands::handle_state(action, &config).await
        },
        Commands::Db { action } => {
            let config = load_config(&cli)?;
            db_commands::handle_db(action, &config).await
        },
    }
}
