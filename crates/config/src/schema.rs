/// Config schema types for the routing engine and its store.
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HandoverConfig {
    pub routing: RoutingConfig,
    pub store: StoreConfig,
}

/// Routing engine behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Refuse connection requests while no aggregation endpoint is
    /// registered. Defaults to true.
    pub reject_if_no_aggregation: bool,
    /// Open a fresh conversation with the operator when a request is
    /// accepted. Defaults to false.
    pub create_dedicated_conversation: bool,
    /// Account IDs allowed to accept requests without being in an
    /// aggregation conversation. Case-insensitive, `*` wildcards.
    pub operator_allowlist: Vec<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            reject_if_no_aggregation: true,
            create_dedicated_conversation: false,
            operator_allowlist: Vec::new(),
        }
    }
}

/// Which routing store backend to use.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local, lost on restart.
    #[default]
    Memory,
    /// SQLite database file.
    Sqlite,
}

/// Routing store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Database file for the sqlite backend. Defaults to
    /// `<data dir>/handover.db`.
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    /// Database file path for the sqlite backend, falling back to the user
    /// data directory when no explicit path is configured.
    pub fn resolved_path(&self) -> Option<PathBuf> {
        self.path
            .clone()
            .or_else(|| crate::loader::data_dir().map(|d| d.join("handover.db")))
    }

    /// sqlx connection URL for [`Self::resolved_path`]. Creates the file on
    /// first connect.
    pub fn database_url(&self) -> Option<String> {
        self.resolved_path()
            .map(|p| format!("sqlite:{}?mode=rwc", p.display()))
    }
}
