//! CLI command implementations.

pub mod admin;
pub mod config;
pub mod serve;
pub mod whoami;

pub use admin::run_admin;
pub use config::run_config;
pub use serve::run_serve;
pub use whoami::run_whoami;

use std::path::Path;

use anyhow::Context;
use datahub_core::Config;

/// Load the config from `path` or the default location, then apply env overrides.
///
/// # Errors
///
/// Returns error if an existing file cannot be read or is invalid.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load_default().context("Failed to load config")?,
    };
    Ok(config.with_env_overrides())
}
