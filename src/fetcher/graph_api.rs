//! Mapillary Graph API client
//!
//! Thin typed layer over the three endpoints the downloader needs: the
//! image-id listing of a sequence, the per-image descriptor record, and the
//! paginated image search used for user sequence discovery.
//!
//! Geometry preference: the API reports both raw sensor values and computed
//! (post-processed, higher accuracy) values for position, compass angle and
//! altitude. The computed value wins whenever present.

use crate::fetcher::http::FetchClient;
use crate::fetcher::pagination::{self, PagedResponse};
use crate::fetcher::{FetcherError, FetcherResult};
use crate::{ImageDescriptor, ProjectionKind};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Base URL of the Graph API.
const GRAPH_API_BASE: &str = "https://graph.mapillary.com";

/// Fields requested for a full image descriptor.
const DESCRIPTOR_FIELDS: &str = "id,sequence,thumb_original_url,geometry,computed_geometry,\
compass_angle,computed_compass_angle,altitude,computed_altitude,captured_at,camera_type,make,model";

/// Fields requested during user sequence discovery.
const DISCOVERY_FIELDS: &str = "id,sequence,camera_type,captured_at,created_at";

/// Page size for the discovery search.
const DISCOVERY_PAGE_LIMIT: usize = 100;

/// Camera-type filter for sequence discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraTypeFilter {
    /// Keep every image
    All,
    /// Keep only 360° (spherical/equirectangular) images
    Spherical,
    /// Keep only flat (perspective/fisheye) images
    Flat,
}

impl CameraTypeFilter {
    fn matches(&self, camera_type: Option<&str>) -> bool {
        match self {
            CameraTypeFilter::All => true,
            CameraTypeFilter::Spherical => {
                camera_type.is_some_and(|c| {
                    ProjectionKind::from_camera_type(c) == ProjectionKind::Spherical
                })
            }
            CameraTypeFilter::Flat => camera_type
                .is_some_and(|c| ProjectionKind::from_camera_type(c) == ProjectionKind::Flat),
        }
    }
}

impl std::str::FromStr for CameraTypeFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(CameraTypeFilter::All),
            "spherical" | "360" => Ok(CameraTypeFilter::Spherical),
            "flat" | "perspective" => Ok(CameraTypeFilter::Flat),
            _ => Err(format!(
                "Invalid camera type filter: {s}. Valid options: all, spherical, flat"
            )),
        }
    }
}

/// GeoJSON point as the API serializes it: `coordinates` is `[lon, lat]`.
#[derive(Debug, Deserialize)]
struct GeoJsonPoint {
    #[serde(default)]
    coordinates: Vec<f64>,
}

impl GeoJsonPoint {
    fn lon_lat(&self) -> Option<(f64, f64)> {
        match self.coordinates.as_slice() {
            [lon, lat, ..] => Some((*lon, *lat)),
            _ => None,
        }
    }
}

/// Raw descriptor record as returned by the Graph API.
#[derive(Debug, Deserialize)]
struct ImageRecord {
    id: String,
    sequence: Option<String>,
    thumb_original_url: Option<String>,
    geometry: Option<GeoJsonPoint>,
    computed_geometry: Option<GeoJsonPoint>,
    compass_angle: Option<f64>,
    computed_compass_angle: Option<f64>,
    altitude: Option<f64>,
    computed_altitude: Option<f64>,
    captured_at: Option<i64>,
    camera_type: Option<String>,
    make: Option<String>,
    model: Option<String>,
}

impl ImageRecord {
    /// Convert into the crate's descriptor, preferring computed geometry.
    fn into_descriptor(self, sequence_id: &str) -> FetcherResult<ImageDescriptor> {
        let download_url = self.thumb_original_url.ok_or_else(|| {
            FetcherError::InvalidResponse(format!("image {} has no download URL", self.id))
        })?;

        let captured_ms = self.captured_at.ok_or_else(|| {
            FetcherError::InvalidResponse(format!("image {} has no capture timestamp", self.id))
        })?;
        let captured_at = DateTime::<Utc>::from_timestamp_millis(captured_ms).ok_or_else(|| {
            FetcherError::InvalidResponse(format!(
                "image {} has an unrepresentable capture timestamp {captured_ms}",
                self.id
            ))
        })?;

        let position = self
            .computed_geometry
            .as_ref()
            .and_then(GeoJsonPoint::lon_lat)
            .or_else(|| self.geometry.as_ref().and_then(GeoJsonPoint::lon_lat));

        let descriptor = ImageDescriptor {
            image_id: self.id,
            sequence_id: self.sequence.unwrap_or_else(|| sequence_id.to_string()),
            download_url,
            latitude: position.map(|(_, lat)| lat),
            longitude: position.map(|(lon, _)| lon),
            altitude: self.computed_altitude.or(self.altitude),
            bearing: self.computed_compass_angle.or(self.compass_angle),
            captured_at,
            camera_make: self.make.filter(|s| !s.is_empty()),
            camera_model: self.model.filter(|s| !s.is_empty()),
            projection: self
                .camera_type
                .as_deref()
                .map(ProjectionKind::from_camera_type)
                .unwrap_or(ProjectionKind::Flat),
        };

        descriptor
            .validate()
            .map_err(FetcherError::InvalidResponse)?;
        Ok(descriptor)
    }
}

/// Entry of the sequence image-id listing.
#[derive(Debug, Deserialize)]
struct ImageIdRecord {
    id: String,
}

/// Entry of the discovery image search.
#[derive(Debug, Deserialize)]
struct DiscoveryRecord {
    #[serde(default)]
    #[allow(dead_code)]
    id: String,
    sequence: Option<String>,
    camera_type: Option<String>,
    captured_at: Option<i64>,
    created_at: Option<i64>,
}

/// Resolution of a sequence into descriptors, keeping per-image failures.
#[derive(Debug)]
pub struct SequenceResolution {
    /// Descriptors resolved successfully, in capture order
    pub descriptors: Vec<ImageDescriptor>,
    /// Image ids whose descriptor could not be resolved, with the reason
    pub failures: Vec<(String, String)>,
}

/// Sequences of a user grouped by capture date (`YYYYMMDD`).
#[derive(Debug, Default)]
pub struct DiscoveredSequences {
    /// Date → sequence ids captured on that date
    pub by_date: BTreeMap<String, BTreeSet<String>>,
    /// Total number of images inspected
    pub images_seen: usize,
}

impl DiscoveredSequences {
    /// Total number of distinct sequences found.
    pub fn sequence_count(&self) -> usize {
        let mut all = BTreeSet::new();
        for ids in self.by_date.values() {
            all.extend(ids.iter().cloned());
        }
        all.len()
    }
}

/// Typed client for the Graph API endpoints the downloader consumes.
pub struct GraphApiClient {
    client: Arc<FetchClient>,
    base_url: String,
}

impl GraphApiClient {
    /// Create a client against the production Graph API.
    pub fn new(client: Arc<FetchClient>) -> Self {
        Self {
            client,
            base_url: GRAPH_API_BASE.to_string(),
        }
    }

    /// Override the base URL (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// List the image ids of a sequence, in sequence order.
    pub async fn sequence_image_ids(&self, sequence_id: &str) -> FetcherResult<Vec<String>> {
        let url = format!("{}/image_ids", self.base_url);
        let params = [("sequence_id", sequence_id.to_string())];
        let response: PagedResponse<ImageIdRecord> =
            self.client.get_json(&url, &params).await?;

        if response.data.is_empty() {
            warn!(sequence_id, "Sequence contains no images");
        }
        Ok(response.data.into_iter().map(|r| r.id).collect())
    }

    /// Fetch the descriptor of a single image.
    pub async fn image_descriptor(
        &self,
        image_id: &str,
        sequence_id: &str,
    ) -> FetcherResult<ImageDescriptor> {
        let url = format!("{}/{image_id}", self.base_url);
        let params = [("fields", DESCRIPTOR_FIELDS.to_string())];
        let record: ImageRecord = self.client.get_json(&url, &params).await?;
        record.into_descriptor(sequence_id)
    }

    /// Resolve every image of a sequence into a descriptor.
    ///
    /// Descriptor fetches run `concurrency`-wide; individual failures are
    /// collected rather than propagated so one broken record cannot sink the
    /// batch. The result is sorted by capture instant, which also makes the
    /// earliest capture (used for the directory name) the first element.
    pub async fn sequence_descriptors(
        &self,
        sequence_id: &str,
        concurrency: usize,
    ) -> FetcherResult<SequenceResolution> {
        let image_ids = self.sequence_image_ids(sequence_id).await?;
        info!(
            sequence_id,
            images = image_ids.len(),
            "Resolving image descriptors"
        );

        let results: Vec<(String, FetcherResult<ImageDescriptor>)> = stream::iter(image_ids)
            .map(|image_id| async move {
                let result = self.image_descriptor(&image_id, sequence_id).await;
                (image_id, result)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        let mut descriptors = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (image_id, result) in results {
            match result {
                Ok(descriptor) => descriptors.push(descriptor),
                Err(e) => {
                    warn!(image_id = %image_id, error = %e, "Failed to resolve descriptor");
                    failures.push((image_id, e.to_string()));
                }
            }
        }

        descriptors.sort_by_key(|d| (d.captured_at, d.image_id.clone()));
        debug!(
            resolved = descriptors.len(),
            failed = failures.len(),
            "Sequence resolution finished"
        );

        Ok(SequenceResolution {
            descriptors,
            failures,
        })
    }

    /// Discover the sequences of a user, grouped by capture date.
    ///
    /// Walks the paginated image search; `max_pages` bounds the walk, `None`
    /// walks everything.
    pub async fn user_sequences(
        &self,
        username: &str,
        max_pages: Option<usize>,
        filter: CameraTypeFilter,
    ) -> FetcherResult<DiscoveredSequences> {
        let url = format!("{}/images", self.base_url);
        let params = [
            ("creator_username", username.to_string()),
            ("fields", DISCOVERY_FIELDS.to_string()),
            ("limit", DISCOVERY_PAGE_LIMIT.to_string()),
        ];

        let mut discovered = DiscoveredSequences::default();

        let discovered_ref = &mut discovered;
        pagination::paginate::<DiscoveryRecord, _>(
            &self.client,
            &url,
            &params,
            max_pages,
            move |page, records| {
                let mut kept = 0;
                let mut new_sequences = 0;
                for record in records {
                    discovered_ref.images_seen += 1;
                    if !filter.matches(record.camera_type.as_deref()) {
                        continue;
                    }
                    let Some(sequence) = record.sequence.filter(|s| !s.is_empty()) else {
                        continue;
                    };
                    // Capture time preferred, upload time as fallback.
                    let Some(ts) = record.captured_at.or(record.created_at) else {
                        continue;
                    };
                    let Some(date) = DateTime::<Utc>::from_timestamp_millis(ts) else {
                        continue;
                    };
                    let day = date.format("%Y%m%d").to_string();
                    if discovered_ref
                        .by_date
                        .entry(day)
                        .or_default()
                        .insert(sequence)
                    {
                        new_sequences += 1;
                    }
                    kept += 1;
                }
                if new_sequences > 0 {
                    info!(page, new_sequences, "Found new sequences");
                }
                kept
            },
        )
        .await?;

        Ok(discovered)
    }
}
