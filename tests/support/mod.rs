//! Shared fixtures for the integration tests

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use mapillary_sequence_downloader::fetcher::{
    FetchDisposition, FetchOutcome, FetcherError, ImageFetcher,
};
use mapillary_sequence_downloader::{ImageDescriptor, ProjectionKind};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Render a small but fully valid JPEG in memory.
pub fn sample_jpeg() -> Vec<u8> {
    let img = image::RgbImage::from_fn(16, 16, |x, y| {
        image::Rgb([(x * 16) as u8, (y * 16) as u8, 96])
    });
    let mut bytes = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut bytes);
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
        &mut cursor,
        90,
    );
    image::DynamicImage::ImageRgb8(img)
        .write_with_encoder(encoder)
        .unwrap();
    drop(cursor);
    bytes
}

/// The capture instant of the worked example: 2025-07-28T18:07:30.120Z.
pub fn example_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 28, 18, 7, 30).unwrap() + chrono::Duration::milliseconds(120)
}

/// Descriptor matching the worked example values.
pub fn example_descriptor(image_id: &str) -> ImageDescriptor {
    ImageDescriptor {
        image_id: image_id.to_string(),
        sequence_id: "seqExample".to_string(),
        download_url: format!("https://cdn.example.com/{image_id}.jpg"),
        latitude: Some(37.7749),
        longitude: Some(-122.4194),
        altitude: Some(15.2),
        bearing: Some(271.5),
        captured_at: example_instant(),
        camera_make: Some("GoPro".to_string()),
        camera_model: Some("Max".to_string()),
        projection: ProjectionKind::Flat,
    }
}

/// How the fake fetcher should treat one image id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeBehavior {
    /// Serve a valid JPEG
    Serve,
    /// Serve bytes that are not a decodable image
    ServeGarbage,
    /// Fail terminally (404-style)
    FailTerminal,
    /// Fail as if retries were exhausted on a transient error
    FailRetryable,
}

/// In-memory [`ImageFetcher`] with per-id behaviors and fetch counting.
pub struct FakeFetcher {
    jpeg: Vec<u8>,
    behaviors: HashMap<String, FakeBehavior>,
    fetches: AtomicUsize,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self {
            jpeg: sample_jpeg(),
            behaviors: HashMap::new(),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_behavior(mut self, image_id: &str, behavior: FakeBehavior) -> Self {
        self.behaviors.insert(image_id.to_string(), behavior);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Default for FakeFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageFetcher for FakeFetcher {
    async fn fetch_image(&self, image_id: &str, _url: &str) -> FetchOutcome {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .behaviors
            .get(image_id)
            .copied()
            .unwrap_or(FakeBehavior::Serve);

        let (disposition, attempts) = match behavior {
            FakeBehavior::Serve => (FetchDisposition::Success(Bytes::from(self.jpeg.clone())), 1),
            FakeBehavior::ServeGarbage => {
                (FetchDisposition::Success(Bytes::from_static(&[0u8; 32])), 1)
            }
            FakeBehavior::FailTerminal => (
                FetchDisposition::Terminal(FetcherError::HttpError {
                    status: 404,
                    message: "not found".to_string(),
                }),
                1,
            ),
            FakeBehavior::FailRetryable => (
                FetchDisposition::Retryable(FetcherError::NetworkError(
                    "connection timed out".to_string(),
                )),
                6,
            ),
        };

        FetchOutcome {
            image_id: image_id.to_string(),
            disposition,
            attempts,
            elapsed: Duration::from_millis(1),
        }
    }
}
