//! Serve command: run the gateway.

use anyhow::Result;
use datahub_core::Config;

use crate::ui;

/// Serve command arguments.
#[derive(Debug, Clone, Default)]
pub struct ServeArgs {
    /// Port override.
    pub port: Option<u16>,
    /// Bind address override.
    pub bind: Option<String>,
}

/// Run the gateway until Ctrl-C.
///
/// # Errors
///
/// Returns error if the config is invalid or the server fails.
pub async fn run_serve(mut config: Config, args: ServeArgs) -> Result<()> {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    config.validate()?;

    ui::header("Starting Datahub Gateway");
    ui::kv("Address", &format!("http://{}", config.server.address()));
    ui::kv("Data", &config.data_dir().display().to_string());
    ui::kv(
        "Token expiry",
        &format!("{}h", config.auth.token_expiry_hours),
    );
    println!();

    tracing::debug!(cors = config.server.cors, timeout_secs = config.server.timeout_secs, "Server settings");
    datahub_gateway::start(config).await?;
    Ok(())
}
