//! quarry - package repository indexer and mirror

use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use quarry_cli::{ABORTED, Cli, Commands, cmd};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, stopping after in-flight work");
                cancel.cancel();
            }
        });
    }

    let config = cli.config.as_deref();
    let result = match &cli.command {
        Commands::Index { dirs } => {
            cmd::index::index(config, dirs, cli.json, cli.verbose, &cancel).await
        }
        Commands::Mirror { remote, dirs } => {
            cmd::mirror::mirror(
                config,
                remote.as_deref(),
                dirs,
                cli.json,
                cli.verbose,
                &cancel,
            )
            .await
        }
        Commands::Lookup {
            name,
            version,
            platform,
            archive_dir,
        } => cmd::lookup::lookup(
            config,
            name,
            version.as_deref(),
            platform.as_deref(),
            archive_dir.clone(),
            cli.json,
        ),
    };

    match result {
        Ok(status) => ExitCode::from(status.code()),
        Err(e) => {
            eprintln!("  error: {e:#}");
            ExitCode::from(ABORTED)
        }
    }
}
