use {anyhow::Result, clap::Subcommand, serde::Serialize};

use {
    handover_config::HandoverConfig,
    handover_routing::{ParticipantKind, RejectTarget, RoutingEngine},
};

use crate::store::open_store;

#[derive(Subcommand)]
pub enum StateAction {
    /// Print the whole routing state as JSON.
    Show,
    /// List pending connection requests, oldest first.
    Pending,
    /// List open connections.
    Connections,
    /// List registered aggregation endpoints.
    Aggregation,
    /// List tracked participants.
    Participants {
        /// List bot identities instead of users.
        #[arg(long)]
        bots: bool,
    },
    /// Reject every pending connection request.
    RejectAll,
}

pub async fn handle_state(action: &StateAction, config: &HandoverConfig) -> Result<()> {
    let store = open_store(&config.store).await?;
    let engine = RoutingEngine::load(store)
        .await?
        .with_config(config.routing.clone());

    match action {
        StateAction::Show => print_json(&engine.snapshot().await),
        StateAction::Pending => print_json(&engine.pending_requests().await),
        StateAction::Connections => print_json(&engine.connections().await),
        StateAction::Aggregation => print_json(&engine.aggregation_endpoints().await),
        StateAction::Participants { bots } => {
            let kind = if *bots {
                ParticipantKind::Bot
            } else {
                ParticipantKind::User
            };
            print_json(&engine.participants(kind).await)
        },
        StateAction::RejectAll => {
            let results = engine
                .reject_connection_request(&RejectTarget::All, None)
                .await?;
            print_json(&results)
        },
    }
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
