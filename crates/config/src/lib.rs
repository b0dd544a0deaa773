//! Configuration loading, validation and live reload for herald.
//!
//! Config files: `herald.toml`, `herald.yaml`, `herald.yml` or `herald.json`,
//! searched in `./` then the user config directory. `${ENV_VAR}` placeholders
//! are substituted before parsing.

pub mod env_subst;
pub mod error;
pub mod handle;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    handle::ConfigHandle,
    loader::{config_dir, discover_and_load, find_config_file, load_config},
    schema::{DispatchConfig, HeraldConfig, MetricsConfig, ModuleConfig},
    validate::{Diagnostic, Severity, ValidationResult},
};
