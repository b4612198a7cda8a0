//! Per-image results and the run summary

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Final state of one image after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemStatus {
    /// Fetched, tagged and persisted
    Downloaded,
    /// Image bytes could not be retrieved
    FetchFailed,
    /// Bytes retrieved but tagging or persisting failed
    MetadataFailed,
    /// Output already present and well-formed, or run was cancelled first
    Skipped,
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ItemStatus::Downloaded => "downloaded",
            ItemStatus::FetchFailed => "fetch-failed",
            ItemStatus::MetadataFailed => "metadata-failed",
            ItemStatus::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

/// Failure class, for grouping in reports and retry passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// Missing or out-of-range coordinates
    Geometry,
    /// Transient fetch failure that exhausted its retries
    FetchRetryable,
    /// Permanent fetch failure (4xx, malformed descriptor)
    FetchTerminal,
    /// Corrupt or undecodable image payload
    Encoding,
    /// Destination not writable
    Write,
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureCategory::Geometry => "geometry",
            FailureCategory::FetchRetryable => "fetch_retryable",
            FailureCategory::FetchTerminal => "fetch_terminal",
            FailureCategory::Encoding => "encoding",
            FailureCategory::Write => "write",
        };
        write!(f, "{s}")
    }
}

/// Outcome of processing one descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadResult {
    /// Image the result belongs to
    pub image_id: String,
    /// Final status
    pub status: ItemStatus,
    /// Where the output landed, for successful downloads
    pub output_path: Option<PathBuf>,
    /// Failure class, for failed items
    pub failure_category: Option<FailureCategory>,
    /// Human-readable failure reason
    pub failure_message: Option<String>,
    /// Fetch attempts made
    pub attempts: u32,
    /// Whether the geo tag was built without a resolvable UTC offset
    #[serde(default)]
    pub offset_omitted: bool,
}

impl DownloadResult {
    /// A successful download result.
    pub fn downloaded(image_id: String, output_path: PathBuf, attempts: u32) -> Self {
        Self {
            image_id,
            status: ItemStatus::Downloaded,
            output_path: Some(output_path),
            failure_category: None,
            failure_message: None,
            attempts,
            offset_omitted: false,
        }
    }

    /// A skipped result (output already present, or cancelled).
    pub fn skipped(image_id: String, output_path: Option<PathBuf>) -> Self {
        Self {
            image_id,
            status: ItemStatus::Skipped,
            output_path,
            failure_category: None,
            failure_message: None,
            attempts: 0,
            offset_omitted: false,
        }
    }

    /// A failed result.
    pub fn failed(
        image_id: String,
        status: ItemStatus,
        category: FailureCategory,
        message: String,
        attempts: u32,
    ) -> Self {
        Self {
            image_id,
            status,
            output_path: None,
            failure_category: Some(category),
            failure_message: Some(message),
            attempts,
            offset_omitted: false,
        }
    }
}

/// One failed image in the summary report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedItem {
    /// Image identifier
    pub image_id: String,
    /// Failure class
    pub category: FailureCategory,
    /// Failure reason
    pub message: String,
}

/// Aggregated outcome of one run over a sequence.
///
/// Built once, at the end of a batch; read-only afterwards. Serialized as
/// `run_summary.json` so an external retry pass can target exactly the
/// failed subset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Sequence the run covered
    pub sequence_id: String,
    /// Images fetched, tagged and persisted
    pub downloaded: u64,
    /// Images skipped because their output already existed (or the run was
    /// cancelled before reaching them)
    pub skipped: u64,
    /// Images whose bytes could not be retrieved
    pub fetch_failed: u64,
    /// Images whose tagging or persisting failed
    pub metadata_failed: u64,
    /// Records built without a resolvable UTC offset
    pub offset_omitted: u64,
    /// Total wall time of the run in milliseconds
    pub elapsed_ms: u64,
    /// Every failed image with its category and reason
    pub failures: Vec<FailedItem>,
}

impl RunSummary {
    /// An empty summary for a sequence.
    pub fn new(sequence_id: String) -> Self {
        Self {
            sequence_id,
            downloaded: 0,
            skipped: 0,
            fetch_failed: 0,
            metadata_failed: 0,
            offset_omitted: 0,
            elapsed_ms: 0,
            failures: Vec::new(),
        }
    }

    /// Fold one result into the counters and the failure list.
    pub fn record(&mut self, result: &DownloadResult) {
        match result.status {
            ItemStatus::Downloaded => self.downloaded += 1,
            ItemStatus::Skipped => self.skipped += 1,
            ItemStatus::FetchFailed => self.fetch_failed += 1,
            ItemStatus::MetadataFailed => self.metadata_failed += 1,
        }
        if result.offset_omitted {
            self.offset_omitted += 1;
        }
        if let (Some(category), Some(message)) =
            (result.failure_category, result.failure_message.as_ref())
        {
            self.failures.push(FailedItem {
                image_id: result.image_id.clone(),
                category,
                message: message.clone(),
            });
        }
    }

    /// Record an image that never became a descriptor (resolution failure).
    pub fn record_unresolved(&mut self, image_id: String, message: String) {
        self.fetch_failed += 1;
        self.failures.push(FailedItem {
            image_id,
            category: FailureCategory::FetchTerminal,
            message,
        });
    }

    /// Number of failed images.
    pub fn failed_count(&self) -> u64 {
        self.fetch_failed + self.metadata_failed
    }

    /// Ids of every failed image, for a retry pass.
    pub fn failed_ids(&self) -> Vec<String> {
        self.failures.iter().map(|f| f.image_id.clone()).collect()
    }

    /// Persist the summary as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
    }

    /// Load a previously saved summary.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(Into::into)
    }
}
