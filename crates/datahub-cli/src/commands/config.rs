//! Config command.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use datahub_core::Config;

use crate::ui;

const REDACTED: &str = "[REDACTED]";

/// Config actions.
#[derive(Debug, Clone)]
pub enum ConfigAction {
    /// Print the effective config.
    Show,
    /// Print the config file path.
    Path,
    /// Write a default config file.
    Init {
        /// Overwrite an existing file.
        force: bool,
    },
}

/// Run the config command.
///
/// # Errors
///
/// Returns error if the config cannot be loaded or written.
pub fn run_config(action: ConfigAction, path: Option<PathBuf>, config: Option<Config>) -> Result<()> {
    let path = path.unwrap_or_else(Config::default_path);

    match action {
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Show => {
            let config = config.unwrap_or_default();
            println!("{}", serde_json::to_string_pretty(&redacted(&config)?)?);
        }
        ConfigAction::Init { force } => {
            init_config(&path, force)?;
            ui::success(&format!("Wrote default config to {}", path.display()));
        }
    }

    Ok(())
}

/// Config as JSON with the token secret masked.
fn redacted(config: &Config) -> Result<serde_json::Value> {
    let mut value = serde_json::to_value(config)?;
    if let Some(secret) = value.pointer_mut("/auth/jwtSecret") {
        if !secret.is_null() {
            *secret = serde_json::Value::String(REDACTED.to_string());
        }
    }
    Ok(value)
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "Config file already exists: {} (use --force to overwrite)",
            path.display()
        );
    }
    Config::default().save(path)?;
    Ok(())
}
