//! Batch download orchestration
//!
//! Sequences each descriptor through skip-check, fetch, geo tag assembly,
//! metadata embedding and atomic persistence, with a bounded number of
//! images in flight. Per-image state machine:
//!
//! ```text
//! Pending -> Fetching -> Fetched -> Encoding -> Done
//!                |                     |
//!                v                     v
//!           FetchFailed          MetadataFailed        Skipped (pre-existing)
//! ```
//!
//! Any stage's terminal failure marks that single image failed and the batch
//! continues. Completion order between images is unspecified; the driver
//! loop is the single point where results are folded into the summary.

use crate::downloader::config::DEFAULT_CONCURRENCY;
use crate::downloader::summary::{
    DownloadResult, FailureCategory, ItemStatus, RunSummary,
};
use crate::downloader::DownloadError;
use crate::exif::{GeoTagBuilder, MetadataWriter};
use crate::fetcher::{FetchDisposition, ImageFetcher};
use crate::output::layout::{is_wellformed_output, write_atomic};
use crate::output::{DestinationLock, SequenceLayout};
use crate::shutdown::{self, SharedShutdown};
use crate::ImageDescriptor;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Images processed concurrently
    pub concurrency: usize,
    /// Re-encode quality (1-100); `None` preserves pixel data untouched
    pub quality: Option<u8>,
    /// Re-download even when a well-formed output already exists
    pub force: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            quality: None,
            force: false,
        }
    }
}

/// Drives a batch of descriptors to completion.
pub struct DownloadOrchestrator {
    fetcher: Arc<dyn ImageFetcher>,
    builder: GeoTagBuilder,
    writer: MetadataWriter,
    config: OrchestratorConfig,
    shutdown: Option<SharedShutdown>,
}

impl DownloadOrchestrator {
    /// Create an orchestrator over the given image fetcher.
    pub fn new(fetcher: Arc<dyn ImageFetcher>, config: OrchestratorConfig) -> Self {
        let writer = MetadataWriter::new().with_quality(config.quality);
        Self {
            fetcher,
            builder: GeoTagBuilder::new(),
            writer,
            config,
            shutdown: shutdown::get_global_shutdown(),
        }
    }

    /// Attach a shared shutdown handle for graceful cancellation.
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Run the batch, producing one result per descriptor and the summary.
    ///
    /// The destination directory is created and locked up front; failure to
    /// do either is a configuration-level error that aborts before any
    /// fetch. Everything after that is per-image.
    pub async fn run(
        &self,
        descriptors: Vec<ImageDescriptor>,
        layout: &SequenceLayout,
    ) -> Result<RunSummary, DownloadError> {
        let sequence_id = descriptors
            .first()
            .map(|d| d.sequence_id.clone())
            .unwrap_or_default();

        let span = tracing::info_span!(
            "download_run",
            sequence_id = %sequence_id,
            images = descriptors.len()
        );
        let _enter = span.enter();

        let started = Instant::now();

        layout.ensure_directory()?;
        let _lock = DestinationLock::try_acquire(layout.directory())?;

        info!(
            directory = %layout.directory().display(),
            concurrency = self.config.concurrency,
            "Starting download run"
        );

        let mut summary = RunSummary::new(sequence_id);
        {
            let mut results = stream::iter(descriptors)
                .map(|descriptor| self.process(descriptor, layout))
                .buffer_unordered(self.config.concurrency.max(1));

            // Single synchronized aggregation point: results are folded here,
            // in completion order, by the one task driving the stream.
            while let Some(result) = results.next().await {
                debug!(
                    image_id = %result.image_id,
                    status = %result.status,
                    attempts = result.attempts,
                    "Image finished"
                );
                summary.record(&result);
            }
        }

        summary.elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            downloaded = summary.downloaded,
            skipped = summary.skipped,
            fetch_failed = summary.fetch_failed,
            metadata_failed = summary.metadata_failed,
            elapsed_ms = summary.elapsed_ms,
            "Download run finished"
        );

        Ok(summary)
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|s| s.is_shutdown_requested())
            .unwrap_or(false)
    }

    /// Process one descriptor through the full pipeline.
    async fn process(
        &self,
        descriptor: ImageDescriptor,
        layout: &SequenceLayout,
    ) -> DownloadResult {
        let image_id = descriptor.image_id.clone();
        let output_path = layout.image_path(descriptor.captured_at);

        // Cancellation stops issuing new work; items already past this
        // point run to completion.
        if self.shutdown_requested() {
            debug!(image_id = %image_id, "Skipping: shutdown requested");
            return DownloadResult::skipped(image_id, None);
        }

        // Resume: a well-formed existing output satisfies this descriptor.
        if !self.config.force && is_wellformed_output(&output_path) {
            debug!(
                image_id = %image_id,
                path = %output_path.display(),
                "Skipping: output already present"
            );
            return DownloadResult::skipped(image_id, Some(output_path));
        }

        // Fetching -> (FetchFailed | Fetched)
        let outcome = self
            .fetcher
            .fetch_image(&image_id, &descriptor.download_url)
            .await;
        let attempts = outcome.attempts;
        let bytes = match outcome.disposition {
            FetchDisposition::Success(bytes) => bytes,
            FetchDisposition::Retryable(error) => {
                warn!(image_id = %image_id, error = %error, "Fetch retries exhausted");
                return DownloadResult::failed(
                    image_id,
                    ItemStatus::FetchFailed,
                    FailureCategory::FetchRetryable,
                    error.to_string(),
                    attempts,
                );
            }
            FetchDisposition::Terminal(error) => {
                warn!(image_id = %image_id, error = %error, "Fetch failed terminally");
                return DownloadResult::failed(
                    image_id,
                    ItemStatus::FetchFailed,
                    FailureCategory::FetchTerminal,
                    error.to_string(),
                    attempts,
                );
            }
        };

        // Encoding -> (MetadataFailed | Done)
        let record = match self.builder.build(&descriptor) {
            Ok(record) => record,
            Err(error) => {
                warn!(image_id = %image_id, error = %error, "Geo tag assembly failed");
                return DownloadResult::failed(
                    image_id,
                    ItemStatus::MetadataFailed,
                    FailureCategory::Geometry,
                    error.to_string(),
                    attempts,
                );
            }
        };
        let offset_omitted = record.offset_omitted();

        let tagged = match self.writer.embed(&bytes, &record) {
            Ok(tagged) => tagged,
            Err(error) => {
                warn!(image_id = %image_id, error = %error, "Metadata embedding failed");
                return DownloadResult::failed(
                    image_id,
                    ItemStatus::MetadataFailed,
                    FailureCategory::Encoding,
                    error.to_string(),
                    attempts,
                );
            }
        };

        // Persist atomically: a crash mid-write leaves a .part file that the
        // resume probe rejects, never a plausible-looking output.
        if let Err(error) = write_atomic(&output_path, &tagged) {
            warn!(image_id = %image_id, error = %error, "Persisting output failed");
            return DownloadResult::failed(
                image_id,
                ItemStatus::MetadataFailed,
                FailureCategory::Write,
                error.to_string(),
                attempts,
            );
        }

        let mut result = DownloadResult::downloaded(image_id, output_path, attempts);
        result.offset_omitted = offset_omitted;
        result
    }
}
