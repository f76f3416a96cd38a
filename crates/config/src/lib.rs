//! Configuration loading, environment substitution, and validation.
//!
//! Config files: `handover.toml`, `handover.yaml`, `handover.yml` or
//! `handover.json`, searched in `./` then the user config directory.
//!
//! String values may reference `${ENV_VAR}` or `${ENV_VAR:-fallback}`.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{config_dir, data_dir, discover_and_load, find_config_file, load_config},
    schema::{HandoverConfig, RoutingConfig, StoreBackend, StoreConfig},
    validate::{Diagnostic, Severity, ValidationResult},
};
