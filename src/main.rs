use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod auth;
mod config;
mod drive_api;
mod error;
mod notify;
mod sync;

use config::Config;

#[derive(Parser)]
#[command(
    name = "drivemirror",
    version,
    about = "Mirror a Google Drive hierarchy onto local storage"
)]
struct Cli {
    /// Path to config file [default: ~/.config/drivemirror/config.toml]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Authenticate with Google Drive and cache the credential
    Login,
    /// Mirror the remote hierarchy to local storage (the default)
    Download {
        /// Log every decision but mutate nothing
        #[arg(long)]
        dry_run: bool,
        /// Transfer every file regardless of modification times
        #[arg(long)]
        ignore_modtime: bool,
    },
    /// Remove all mirrored content
    Erase {
        /// Also remove the cached credentials
        #[arg(long)]
        remove_creds: bool,
    },
}

fn init_tracing(verbosity: u8) {
    let default_filter = match verbosity {
        0 => "drivemirror=info",
        1 => "drivemirror=debug",
        2 => "drivemirror=trace",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = match config::load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("{e:#}");
            std::process::exit(1);
        }
    };

    let command = cli.command.unwrap_or(Command::Download {
        dry_run: false,
        ignore_modtime: false,
    });

    if let Err(e) = run(command, &cfg).await {
        tracing::error!("{e:#}");
        report_failure(&cfg, &format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run(command: Command, cfg: &Config) -> Result<()> {
    match command {
        Command::Login => auth::run_login_flow(&cfg.auth).await,

        Command::Download {
            dry_run,
            ignore_modtime,
        } => {
            let credentials = Arc::new(auth::CredentialManager::new(&cfg.auth)?);
            let client = Arc::new(drive_api::DriveClient::new(
                credentials,
                cfg.mirror.page_size,
                cfg.mirror.include_trashed,
            ));
            let engine = sync::SyncEngine::new(
                client,
                cfg.mirror.clone(),
                sync::RunOptions {
                    dry_run,
                    ignore_modtime,
                },
            )?;
            engine.run().await?;
            Ok(())
        }

        Command::Erase { remove_creds } => {
            let mirror = sync::mirror::LocalMirror::new(&cfg.mirror.storage_path, false);
            mirror.erase()?;
            if remove_creds {
                tracing::info!("removing cached credentials");
                let store_path = auth::credential_store::resolve_store_path(
                    cfg.auth.credentials_path.as_deref(),
                )?;
                auth::credential_store::remove_store(&store_path)?;
            }
            Ok(())
        }
    }
}

/// Best-effort email report of a fatal failure; a broken mailer must
/// not mask the original error.
fn report_failure(cfg: &Config, error_msg: &str) {
    let Some(email) = &cfg.notifications.email else {
        return;
    };
    let notifier = notify::EmailNotifier::new(email.clone());
    if let Err(mail_err) = notifier.report_error(error_msg) {
        tracing::warn!("failed to send error notification: {mail_err:#}");
    }
}
