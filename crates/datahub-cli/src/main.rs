//! Datahub CLI - gateway server and user administration.

mod commands;
mod ui;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use datahub_gateway::Role;

#[derive(Parser)]
#[command(name = "datahub")]
#[command(about = "Datahub - authentication gateway and user administration")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.datahub/datahub.json)
    #[arg(long, global = true, env = "DATAHUB_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address
        #[arg(long)]
        bind: Option<String>,
    },

    /// User management (works on the local store)
    Admin {
        #[command(subcommand)]
        action: AdminCommands,

        /// Data directory override
        #[arg(long, global = true)]
        data_dir: Option<PathBuf>,
    },

    /// Show who a token resolves to on a running gateway
    Whoami {
        /// Gateway URL
        #[arg(long, default_value = "http://127.0.0.1:8787")]
        url: String,

        /// Token to present
        #[arg(long, env = "DATAHUB_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Require admin access
        #[arg(long)]
        admin: bool,
    },

    /// Configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Create a new user
    Create {
        /// Identifier for the new user
        #[arg(long)]
        username: String,

        /// Password (or use --generate-password)
        #[arg(long)]
        password: Option<String>,

        /// User role: user, admin, or superadmin
        #[arg(long, default_value = "user")]
        role: Role,

        /// Generate a random password
        #[arg(long)]
        generate_password: bool,
    },

    /// List all users
    List,

    /// Change a user's role
    SetRole {
        /// Identifier of the user
        #[arg(long)]
        username: String,

        /// New role: user, admin, or superadmin
        #[arg(long)]
        role: Role,
    },

    /// Reset a user's password
    ResetPassword {
        /// Identifier of the user
        #[arg(long)]
        username: String,
    },

    /// Delete a user
    Delete {
        /// Identifier of the user to delete
        #[arg(long)]
        username: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Print the config file path
    Path,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // `config path` and `config init` must work even when the file is broken.
    let config = match &cli.command {
        Commands::Config {
            action: ConfigCommands::Path | ConfigCommands::Init { .. },
        } => None,
        _ => Some(commands::load_config(cli.config.as_deref())?),
    };

    let (log_format, debug) = config
        .as_ref()
        .map(|c| (c.settings.log_format, c.settings.debug))
        .unwrap_or_default();
    if let Err(e) = datahub_core::logging::init(log_format, cli.verbose || debug) {
        ui::warning(&format!("Logging not initialized: {e}"));
    }

    match cli.command {
        Commands::Serve { port, bind } => {
            let config = config.unwrap_or_default();
            commands::run_serve(config, commands::serve::ServeArgs { port, bind }).await?;
        }

        Commands::Admin { action, data_dir } => {
            let config = config.unwrap_or_default();
            let args = commands::admin::AdminArgs {
                data_dir: data_dir.unwrap_or_else(|| config.data_dir()),
                policy: config.auth.password_policy(),
                action: match action {
                    AdminCommands::Create {
                        username,
                        password,
                        role,
                        generate_password,
                    } => commands::admin::AdminAction::Create {
                        username,
                        password,
                        role,
                        generate_password,
                    },
                    AdminCommands::List => commands::admin::AdminAction::List,
                    AdminCommands::SetRole { username, role } => {
                        commands::admin::AdminAction::SetRole { username, role }
                    }
                    AdminCommands::ResetPassword { username } => {
                        commands::admin::AdminAction::ResetPassword { username }
                    }
                    AdminCommands::Delete { username } => {
                        commands::admin::AdminAction::Delete { username }
                    }
                },
            };
            if let Err(e) = commands::run_admin(args) {
                ui::error(&format!("{e:#}"));
                std::process::exit(1);
            }
        }

        Commands::Whoami { url, token, admin } => {
            commands::run_whoami(commands::whoami::WhoamiArgs { url, token, admin }).await?;
        }

        Commands::Config { action } => {
            let action = match action {
                ConfigCommands::Show => commands::config::ConfigAction::Show,
                ConfigCommands::Path => commands::config::ConfigAction::Path,
                ConfigCommands::Init { force } => commands::config::ConfigAction::Init { force },
            };
            commands::run_config(action, cli.config, config)?;
        }
    }

    Ok(())
}
