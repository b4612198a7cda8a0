//! User sequence discovery command
//!
//! Finds every sequence a user has uploaded and writes them to a text file
//! grouped by capture date, newest first - the same file format the batch
//! download command consumes.

use crate::fetcher::graph_api::{CameraTypeFilter, GraphApiClient};
use crate::fetcher::http::FetchClient;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use super::download::{resolve_access_token, Cli};
use super::CliError;

/// Arguments for the `sequences` command
#[derive(Parser, Debug)]
pub struct SequencesCommand {
    /// Username whose sequences to find
    #[arg(long)]
    pub username: String,

    /// Maximum number of search pages to walk (all pages when omitted)
    #[arg(long)]
    pub max_pages: Option<usize>,

    /// Camera type filter: all, spherical or flat
    #[arg(long, default_value = "all")]
    pub camera_type: CameraTypeFilter,

    /// Output file (default: sequences_<username>.txt)
    #[arg(long)]
    pub output: Option<PathBuf>,
}

impl SequencesCommand {
    /// Execute the discovery and write the batch file.
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let token = resolve_access_token(cli)?;
        let fetch = Arc::new(FetchClient::new(token).with_max_retries(cli.max_retries));
        let graph = GraphApiClient::new(fetch);

        info!(username = %self.username, "Searching for sequences");
        let discovered = graph
            .user_sequences(&self.username, self.max_pages, self.camera_type)
            .await?;

        let sequence_count = discovered.sequence_count();
        if sequence_count == 0 {
            println!("No sequences found for user {}", self.username);
            return Ok(());
        }

        let output = self
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("sequences_{}.txt", self.username)));

        let mut content = String::new();
        content.push_str(&format!("# Sequences of {}\n", self.username));
        content.push_str(&format!("# Total: {sequence_count}\n"));
        content.push_str(&format!("# Images inspected: {}\n\n", discovered.images_seen));

        // Newest capture dates first, ids sorted within a date.
        for (date, ids) in discovered.by_date.iter().rev() {
            content.push_str(&format!("# {date}\n"));
            for id in ids {
                content.push_str(id);
                content.push('\n');
            }
            content.push('\n');
        }

        std::fs::write(&output, content).map_err(|e| {
            CliError::IoError(format!("Failed to write {}: {e}", output.display()))
        })?;

        info!(
            sequences = sequence_count,
            output = %output.display(),
            "Discovery finished"
        );
        println!(
            "Found {sequence_count} sequences for {} -> {}",
            self.username,
            output.display()
        );
        println!(
            "Download them with: mapillary-sequence-downloader download batch --sequences-file {}",
            output.display()
        );
        Ok(())
    }
}
