//! # Mapillary Sequence Downloader Library
//!
//! Downloads street-level imagery sequences from the Mapillary Graph API and
//! produces local, geotagged JPEG files suitable for archival and GIS use.
//! Every downloaded image carries embedded EXIF metadata (GPS position,
//! compass heading, capture timestamp with millisecond precision, camera
//! identity) that matches the API's authoritative record.
//!
//! ## Features
//!
//! - **Precise geotagging**: GPS coordinates are encoded as best-rational
//!   approximations instead of fixed-denominator fractions, keeping the
//!   positional error well below a millimeter.
//! - **Timezone-aware timestamps**: the capture instant is resolved to the
//!   local timezone of the capture coordinate, daylight-saving correct.
//! - **Resume capability**: re-running a batch skips images whose output
//!   already exists and is well-formed.
//! - **Rate limiting**: a shared request window plus a cross-request penalty
//!   delay keep the whole batch inside the API's allowed request rate.
//! - **Partial-failure isolation**: one broken image never aborts a batch;
//!   the run summary enumerates every failure for a targeted re-run.
//!
//! ## Quick Start
//!
//! ```no_run
//! use mapillary_sequence_downloader::downloader::{
//!     DownloadOrchestrator, OrchestratorConfig,
//! };
//! use mapillary_sequence_downloader::fetcher::graph_api::GraphApiClient;
//! use mapillary_sequence_downloader::fetcher::http::FetchClient;
//! use mapillary_sequence_downloader::output::SequenceLayout;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetch = Arc::new(FetchClient::new("MLY|token".to_string()));
//! let graph = GraphApiClient::new(fetch.clone());
//!
//! // Resolve descriptors for a sequence
//! let resolution = graph.sequence_descriptors("gEMwF50mdNXOlW7qJUaiRv", 4).await?;
//!
//! // Download into ./downloads, four images in flight
//! let layout = SequenceLayout::for_batch(
//!     Path::new("downloads"),
//!     "gEMwF50mdNXOlW7qJUaiRv",
//!     &resolution.descriptors,
//! )?;
//! let orchestrator = DownloadOrchestrator::new(fetch, OrchestratorConfig::default());
//! let summary = orchestrator.run(resolution.descriptors, &layout).await?;
//! println!("{} downloaded, {} failed", summary.downloaded, summary.failed_count());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`fetcher`] - Graph API access and image retrieval with retry/backoff
//! - [`exif`] - rational encoding, geo tag assembly, EXIF/XMP embedding
//! - [`downloader`] - batch orchestration, rate limiting, run summaries
//! - [`output`] - destination layout, atomic persistence, resume probing
//! - [`cli`] - command implementations
//! - [`shutdown`] - graceful Ctrl+C coordination

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// CLI command implementations
pub mod cli;

/// Download orchestration
pub mod downloader;

/// Geospatial metadata encoding (rationals, geo tags, EXIF/XMP writing)
pub mod exif;

/// Graph API access and image retrieval
pub mod fetcher;

/// Destination layout and atomic persistence
pub mod output;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

/// Camera projection of an image.
///
/// The projection decides whether the output file is marked as 360° content:
/// spherical images receive a GPano projection marker, flat images do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectionKind {
    /// Ordinary perspective (or fisheye) image
    #[serde(rename = "flat")]
    Flat,
    /// 360° equirectangular image
    #[serde(rename = "spherical")]
    Spherical,
}

impl ProjectionKind {
    /// Map a Graph API `camera_type` string onto a projection kind.
    ///
    /// The API reports `perspective`, `fisheye`, `equirectangular` and
    /// `spherical`; only the latter two are 360° content.
    pub fn from_camera_type(camera_type: &str) -> Self {
        match camera_type.to_ascii_lowercase().as_str() {
            "spherical" | "equirectangular" => ProjectionKind::Spherical,
            _ => ProjectionKind::Flat,
        }
    }
}

impl std::fmt::Display for ProjectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProjectionKind::Flat => "flat",
            ProjectionKind::Spherical => "spherical",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ProjectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "flat" => Ok(ProjectionKind::Flat),
            "spherical" => Ok(ProjectionKind::Spherical),
            _ => Err(format!("Invalid projection kind: {s}")),
        }
    }
}

/// One image of a sequence, as reported by the Graph API.
///
/// Immutable once constructed from the API response. Geographic fields carry
/// the computed (post-processed) values when the API supplies them, falling
/// back to the raw sensor values otherwise.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageDescriptor {
    /// Image identifier, unique within a sequence
    pub image_id: String,
    /// Identifier of the sequence this image belongs to
    pub sequence_id: String,
    /// Short-lived signed URL for the full-resolution image bytes
    pub download_url: String,
    /// Latitude in decimal degrees, if the API reported a position
    pub latitude: Option<f64>,
    /// Longitude in decimal degrees, if the API reported a position
    pub longitude: Option<f64>,
    /// Altitude in meters above sea level (negative below)
    pub altitude: Option<f64>,
    /// Compass bearing in decimal degrees, not necessarily normalized
    pub bearing: Option<f64>,
    /// Capture instant with millisecond precision
    pub captured_at: DateTime<Utc>,
    /// Camera manufacturer, when reported
    pub camera_make: Option<String>,
    /// Camera model, when reported
    pub camera_model: Option<String>,
    /// Camera projection of the image
    pub projection: ProjectionKind,
}

impl ImageDescriptor {
    /// Validate descriptor integrity.
    ///
    /// A descriptor with no coordinates is still valid here - the geo tag
    /// builder rejects it per-image later, so one bad record cannot take the
    /// whole batch down with it.
    pub fn validate(&self) -> Result<(), String> {
        if self.image_id.is_empty() {
            return Err("Image id cannot be empty".to_string());
        }

        if self.sequence_id.is_empty() {
            return Err("Sequence id cannot be empty".to_string());
        }

        if self.download_url.is_empty() {
            return Err("Download URL cannot be empty".to_string());
        }

        if let Some(lat) = self.latitude {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(format!("Latitude out of range: {lat}"));
            }
        }

        if let Some(lon) = self.longitude {
            if !(-180.0..=180.0).contains(&lon) {
                return Err(format!("Longitude out of range: {lon}"));
            }
        }

        Ok(())
    }

    /// Whether the descriptor carries a usable coordinate pair.
    pub fn has_position(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}
