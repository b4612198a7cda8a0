//! Main entry point for the mapillary-sequence-downloader CLI

use clap::Parser;
use mapillary_sequence_downloader::cli::{Cli, Commands};
use mapillary_sequence_downloader::shutdown::{self, ShutdownCoordinator};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mapillary_sequence_downloader=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    // Install global shutdown coordinator and Ctrl+C handler
    let shutdown = ShutdownCoordinator::shared();
    shutdown::set_global_shutdown(shutdown.clone());
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Ctrl+C received - finishing in-flight images...");
                shutdown.request_shutdown();
            }
        }
    });

    let result: Result<(), anyhow::Error> = match &cli.command {
        Commands::Download(args) => match &args.target {
            mapillary_sequence_downloader::cli::download::DownloadTarget::Sequence(seq) => seq
                .execute(&cli, shutdown.clone())
                .await
                .map_err(|e| anyhow::anyhow!(e)),
            mapillary_sequence_downloader::cli::download::DownloadTarget::Batch(batch) => batch
                .execute(&cli, shutdown.clone())
                .await
                .map_err(|e| anyhow::anyhow!(e)),
        },
        Commands::Sequences(cmd) => cmd.execute(&cli).await.map_err(|e| anyhow::anyhow!(e)),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }
}
