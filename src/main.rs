//! CLI entry point for listsync.

use anyhow::{Context, Result};
use clap::Parser;
use listsync_core::config::resolve_default_config_path;
use listsync_core::{Database, SyncConfig};
use tracing::{debug, info};

mod cli;
mod commands;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let config = match args.config.clone().or_else(resolve_default_config_path) {
        Some(path) => SyncConfig::load(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => SyncConfig::default(),
    };

    let db = Database::new(&args.db)
        .await
        .with_context(|| format!("failed to open database {}", args.db.display()))?;

    match args.command {
        Command::Add { url, title } => {
            commands::run_add_command(db, &url, title.as_deref()).await?;
        }
        Command::Remove { url } => commands::run_remove_command(db, &url).await?,
        Command::List => commands::run_list_command(db).await?,
        Command::Update { url } => {
            commands::run_update_command(config, db, url.as_deref()).await?;
        }
        Command::Run => {
            info!("listsync starting");
            commands::run_scheduler_command(config, db).await?;
        }
    }

    Ok(())
}
