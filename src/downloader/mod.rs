//! Download orchestration and rate limiting
//!
//! Drives a batch of image descriptors through fetch, geo tag assembly,
//! metadata embedding and atomic persistence, and reduces the per-image
//! outcomes into a run summary.
//!
//! # Overview
//!
//! 1. **Configuration**: concurrency, re-encode quality and the force flag
//!    live in [`orchestrator::OrchestratorConfig`]; the retry ceiling belongs
//!    to the fetch client
//! 2. **Execution**: [`orchestrator::DownloadOrchestrator`] processes the
//!    batch with bounded concurrency
//! 3. **Rate limiting**: [`rate_limit::RateLimiter`] bounds the aggregate
//!    request rate and carries the shared 429 penalty
//! 4. **Results**: one [`summary::DownloadResult`] per image, folded into a
//!    [`summary::RunSummary`] suitable for a targeted retry pass
//!
//! # Error handling
//!
//! Per-image errors (geometry, fetch, metadata, write) are isolated to that
//! image's result. Only configuration-level failures - an unusable
//! destination or a held destination lock - abort a run before any fetch.

pub mod config;
pub mod orchestrator;
pub mod rate_limit;
pub mod summary;

pub use orchestrator::{DownloadOrchestrator, OrchestratorConfig};
pub use rate_limit::{RateLimitError, RateLimiter};
pub use summary::{DownloadResult, FailureCategory, ItemStatus, RunSummary};

/// Download errors
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Rate limiter failure
    #[error("rate limit error: {0}")]
    RateLimitError(#[from] RateLimitError),

    /// Image retrieval failed
    #[error("fetch error: {0}")]
    FetchError(#[from] crate::fetcher::FetcherError),

    /// Geo tag assembly failed
    #[error("geo tag error: {0}")]
    GeoTagError(#[from] crate::exif::GeoTagError),

    /// Metadata embedding failed
    #[error("metadata error: {0}")]
    MetadataError(#[from] crate::exif::WriterError),

    /// Destination error
    #[error("output error: {0}")]
    OutputError(#[from] crate::output::OutputError),

    /// Run-level configuration problem; aborts before any fetch
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}
