mod commands;
mod wiring;

use std::path::PathBuf;

use anyhow::Result;
use cinelist_config::{ConfigLoad, ConfigLoader};
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::{
    EnvFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

#[derive(Parser, Debug)]
#[command(
    name = "cinelistctl",
    version,
    about = "Cinelist session recovery and list sync from the command line"
)]
struct Cli {
    /// Explicit config file (TOML or JSON)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve the session, optionally from a password-recovery link
    Resolve {
        /// Full redirect URL opened from the recovery email
        #[arg(long)]
        link: Option<String>,
    },
    /// Sign in and synchronize the watchlist and watched collections
    Sync {
        #[arg(long, env = "CINELIST_EMAIL")]
        email: String,
        #[arg(long, env = "CINELIST_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Set a new password using a recovery link
    ResetPassword {
        #[arg(long)]
        link: String,
        #[arg(long, env = "CINELIST_NEW_PASSWORD", hide_env_values = true)]
        password: String,
        /// Defaults to --password when omitted
        #[arg(long, hide_env_values = true)]
        confirm: Option<String>,
    },
    /// Send a password-recovery email
    RequestReset {
        #[arg(long)]
        email: String,
    },
    /// Print the effective configuration with secrets masked
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,cinelist_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let load = load_config(cli.config)?;

    match cli.command {
        Command::Resolve { link } => {
            commands::resolve(&load.config, link.as_deref()).await
        }
        Command::Sync { email, password } => {
            commands::sync(&load.config, &email, &password).await
        }
        Command::ResetPassword {
            link,
            password,
            confirm,
        } => {
            let confirm = confirm.unwrap_or_else(|| password.clone());
            commands::reset_password(&load.config, &link, &password, &confirm)
                .await
        }
        Command::RequestReset { email } => {
            commands::request_reset(&load.config, &email).await
        }
        Command::Config => commands::print_config(&load),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<ConfigLoad> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = path {
        loader = loader.with_config_path(path);
    }
    let load = loader.load()?;
    for warning in load.warnings.iter() {
        match &warning.hint {
            Some(hint) => warn!(%hint, "{}", warning.message),
            None => warn!("{}", warning.message),
        }
    }
    Ok(load)
}
