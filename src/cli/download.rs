//! Download command implementation

use crate::downloader::config::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY};
use crate::downloader::{DownloadOrchestrator, OrchestratorConfig, RunSummary};
use crate::fetcher::graph_api::GraphApiClient;
use crate::fetcher::http::FetchClient;
use crate::output::SequenceLayout;
use crate::shutdown::SharedShutdown;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use super::CliError;

/// Environment variable consulted when `--access-token` is absent.
const ACCESS_TOKEN_ENV: &str = "MAPILLARY_ACCESS_TOKEN";

/// Parse and validate the concurrency value.
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

/// Parse and validate the JPEG re-encode quality.
fn parse_quality(s: &str) -> Result<u8, String> {
    let value: u8 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if !(1..=100).contains(&value) {
        return Err(format!("quality {value} outside 1-100"));
    }
    Ok(value)
}

/// Output format options
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

/// Mapillary Sequence Downloader CLI
#[derive(Parser, Debug)]
#[command(name = "mapillary-sequence-downloader")]
#[command(about = "Download Mapillary imagery sequences as geotagged JPEGs", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Graph API access token (falls back to MAPILLARY_ACCESS_TOKEN)
    #[arg(long, global = true)]
    pub access_token: Option<String>,

    /// Root directory for downloaded sequences
    #[arg(long, global = true, default_value = "downloads")]
    pub output_dir: PathBuf,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Number of concurrent image downloads (default: 4, max: 16)
    ///
    /// The shared rate limiter coordinates all concurrent requests, so
    /// raising this increases throughput only until the request budget is
    /// saturated.
    #[arg(long, global = true, default_value_t = DEFAULT_CONCURRENCY, value_parser = parse_concurrency)]
    pub concurrency: usize,

    /// Maximum number of retries for failed requests (default: 5, range: 1-20)
    #[arg(long, global = true, default_value = "5", value_parser = clap::value_parser!(u32).range(1..=20))]
    pub max_retries: u32,

    /// Re-download images even when a well-formed output already exists
    #[arg(long, global = true, default_value_t = false)]
    pub force: bool,

    /// Re-encode JPEGs at this quality (1-100) instead of preserving the
    /// original bytes
    #[arg(long, global = true, value_parser = parse_quality)]
    pub quality: Option<u8>,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download imagery sequences
    Download(DownloadArgs),

    /// Find the sequences of a user and write them to a batch file
    Sequences(super::SequencesCommand),
}

/// Download command arguments
#[derive(Parser, Debug)]
pub struct DownloadArgs {
    /// What to download
    #[command(subcommand)]
    pub target: DownloadTarget,
}

/// Download targets
#[derive(Subcommand, Debug)]
pub enum DownloadTarget {
    /// Download a single sequence
    Sequence(SequenceArgs),
    /// Download every sequence listed in a file
    Batch(BatchArgs),
}

/// Arguments for downloading one sequence
#[derive(Parser, Debug)]
pub struct SequenceArgs {
    /// Sequence identifier
    #[arg(long)]
    pub sequence_id: String,

    /// Restrict the batch to these image ids (comma-separated)
    #[arg(long)]
    pub only_ids: Option<String>,

    /// Restrict the batch to image ids listed in a file (one per line,
    /// `#` comments allowed)
    #[arg(long)]
    pub ids_file: Option<PathBuf>,

    /// Restrict the batch to the failed ids of a previous run summary
    #[arg(long)]
    pub retry_failed: Option<PathBuf>,
}

/// Arguments for downloading a batch of sequences
#[derive(Parser, Debug)]
pub struct BatchArgs {
    /// File of sequence ids, one per line, `#` comments allowed
    #[arg(long)]
    pub sequences_file: PathBuf,
}

/// Resolve the access token from the flag or the environment.
///
/// A missing token is a configuration error that aborts the run before any
/// fetch begins.
pub fn resolve_access_token(cli: &Cli) -> Result<String, CliError> {
    if let Some(token) = &cli.access_token {
        if !token.is_empty() {
            return Ok(token.clone());
        }
    }
    match std::env::var(ACCESS_TOKEN_ENV) {
        Ok(token) if !token.is_empty() => Ok(token),
        _ => Err(CliError::ConfigurationError(format!(
            "no access token: pass --access-token or set {ACCESS_TOKEN_ENV}"
        ))),
    }
}

/// Read identifiers from a text file: one per line, blank lines and `#`
/// comments skipped.
pub fn read_id_file(path: &Path) -> Result<Vec<String>, CliError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| CliError::IoError(format!("Failed to read {}: {e}", path.display())))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

impl SequenceArgs {
    /// The id subset this invocation is restricted to, if any.
    fn id_subset(&self) -> Result<Option<HashSet<String>>, CliError> {
        let mut subset = HashSet::new();

        if let Some(ids) = &self.only_ids {
            subset.extend(
                ids.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            );
        }
        if let Some(path) = &self.ids_file {
            subset.extend(read_id_file(path)?);
        }
        if let Some(path) = &self.retry_failed {
            let summary = RunSummary::load(path).map_err(|e| {
                CliError::IoError(format!(
                    "Failed to load run summary {}: {e}",
                    path.display()
                ))
            })?;
            let failed = summary.failed_ids();
            if failed.is_empty() {
                info!(
                    summary = %path.display(),
                    "Previous run has no failed images"
                );
            }
            subset.extend(failed);
        }

        if self.only_ids.is_none() && self.ids_file.is_none() && self.retry_failed.is_none() {
            Ok(None)
        } else {
            Ok(Some(subset))
        }
    }

    /// Execute the single-sequence download.
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let summary =
            download_sequence(cli, &self.sequence_id, self.id_subset()?, shutdown).await?;
        print_summary(cli.output_format, &summary);
        Ok(())
    }
}

impl BatchArgs {
    /// Execute the batch download: each listed sequence in order, each with
    /// its own summary. One failing sequence does not stop the batch.
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let sequence_ids = read_id_file(&self.sequences_file)?;
        if sequence_ids.is_empty() {
            return Err(CliError::InvalidArgument(format!(
                "no sequence ids found in {}",
                self.sequences_file.display()
            )));
        }

        info!(sequences = sequence_ids.len(), "Starting batch download");
        let bar = ProgressBar::new(sequence_ids.len() as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "{bar:40.cyan/blue} {pos}/{len} sequences [{elapsed_precise}] {msg}",
            )
            .expect("static template is valid"),
        );

        let mut succeeded = 0usize;
        let mut failed = 0usize;

        for sequence_id in &sequence_ids {
            if shutdown.is_shutdown_requested() {
                warn!("Shutdown requested - stopping batch");
                break;
            }

            bar.set_message(sequence_id.clone());
            match download_sequence(cli, sequence_id, None, shutdown.clone()).await {
                Ok(summary) => {
                    print_summary(cli.output_format, &summary);
                    if summary.failed_count() == 0 {
                        succeeded += 1;
                    } else {
                        failed += 1;
                    }
                }
                Err(e) => {
                    warn!(sequence_id = %sequence_id, error = %e, "Sequence download failed");
                    failed += 1;
                }
            }
            bar.inc(1);
        }

        bar.finish_and_clear();
        info!(succeeded, failed, "Batch download finished");
        println!("Batch finished: {succeeded} sequences clean, {failed} with failures");
        Ok(())
    }
}

/// Download one sequence end to end and write its summary report.
async fn download_sequence(
    cli: &Cli,
    sequence_id: &str,
    subset: Option<HashSet<String>>,
    shutdown: SharedShutdown,
) -> Result<RunSummary, CliError> {
    let token = resolve_access_token(cli)?;
    let fetch = Arc::new(
        FetchClient::new(token)
            .with_max_retries(cli.max_retries)
            .with_shutdown(shutdown.clone()),
    );
    let graph = GraphApiClient::new(fetch.clone());

    let mut resolution = graph
        .sequence_descriptors(sequence_id, cli.concurrency)
        .await?;

    if resolution.descriptors.is_empty() {
        warn!(sequence_id, "Nothing to download");
        let mut summary = RunSummary::new(sequence_id.to_string());
        for (image_id, message) in resolution.failures {
            summary.record_unresolved(image_id, message);
        }
        return Ok(summary);
    }

    // The directory name derives from the whole sequence's earliest capture,
    // before any subset restriction, so partial re-runs land in the same
    // directory as the original run.
    let layout = SequenceLayout::for_batch(&cli.output_dir, sequence_id, &resolution.descriptors)?;

    if let Some(subset) = &subset {
        resolution
            .descriptors
            .retain(|d| subset.contains(&d.image_id));
        resolution.failures.retain(|(id, _)| subset.contains(id));
        info!(
            requested = subset.len(),
            matched = resolution.descriptors.len(),
            "Restricted batch to requested image ids"
        );
    }

    let mut summary = if resolution.descriptors.is_empty() {
        warn!(sequence_id, "No images left after restricting the batch");
        RunSummary::new(sequence_id.to_string())
    } else {
        let config = OrchestratorConfig {
            concurrency: cli.concurrency,
            quality: cli.quality,
            force: cli.force,
        };
        let orchestrator = DownloadOrchestrator::new(fetch, config).with_shutdown(shutdown);
        orchestrator.run(resolution.descriptors, &layout).await?
    };

    // Descriptor-resolution failures belong in the same report so a retry
    // pass covers them too.
    for (image_id, message) in resolution.failures {
        summary.record_unresolved(image_id, message);
    }

    if let Err(e) = summary.save(&layout.summary_path()) {
        warn!(error = %e, "Failed to write run summary");
    }

    Ok(summary)
}

/// Print a run summary in the requested format.
pub fn print_summary(format: OutputFormat, summary: &RunSummary) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(summary).expect("summary serialization cannot fail")
            );
        }
        OutputFormat::Human => {
            println!("\nSequence {} finished", summary.sequence_id);
            println!("  Downloaded:      {}", summary.downloaded);
            println!("  Skipped:         {}", summary.skipped);
            println!("  Fetch failed:    {}", summary.fetch_failed);
            println!("  Metadata failed: {}", summary.metadata_failed);
            if summary.offset_omitted > 0 {
                println!(
                    "  UTC offset omitted for {} image(s) (no timezone at coordinate)",
                    summary.offset_omitted
                );
            }
            println!("  Elapsed:         {:.1}s", summary.elapsed_ms as f64 / 1000.0);
            if !summary.failures.is_empty() {
                println!("  Failures:");
                for failure in &summary.failures {
                    println!(
                        "    {} [{}]: {}",
                        failure.image_id, failure.category, failure.message
                    );
                }
            }
        }
    }
}
