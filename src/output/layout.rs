//! Sequence directory layout and file naming

use super::{OutputError, OutputResult};
use crate::ImageDescriptor;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

/// How many leading bytes of an existing file the resume probe inspects.
/// Metadata segments precede the scan data, so the EXIF APP1 block always
/// falls inside this window.
const PROBE_PREFIX_BYTES: usize = 64 * 1024;

/// Destination layout for one sequence.
///
/// ```text
/// <root>/<YYYYMMDD_HHMMSS>_<sequence_id>/<YYYYMMDD_HHMMSS_mmm>.jpg
/// ```
///
/// The directory timestamp comes from the earliest capture in the batch, the
/// file timestamps from each image's own capture instant (UTC, millisecond
/// suffix), so `ls` order equals capture order.
#[derive(Debug, Clone)]
pub struct SequenceLayout {
    directory: PathBuf,
}

impl SequenceLayout {
    /// Build the layout for a batch of descriptors.
    ///
    /// # Errors
    /// [`OutputError::EmptyBatch`] when `descriptors` is empty - there is no
    /// earliest capture to derive the directory name from.
    pub fn for_batch(
        root: &Path,
        sequence_id: &str,
        descriptors: &[ImageDescriptor],
    ) -> OutputResult<Self> {
        let earliest = descriptors
            .iter()
            .map(|d| d.captured_at)
            .min()
            .ok_or(OutputError::EmptyBatch)?;
        Ok(Self::new(root, sequence_id, earliest))
    }

    /// Build the layout from an explicit earliest capture instant.
    pub fn new(root: &Path, sequence_id: &str, earliest_capture: DateTime<Utc>) -> Self {
        let directory = root.join(format!(
            "{}_{}",
            earliest_capture.format("%Y%m%d_%H%M%S"),
            sanitize_identifier(sequence_id)
        ));
        Self { directory }
    }

    /// The sequence directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Create the sequence directory (and parents).
    pub fn ensure_directory(&self) -> OutputResult<()> {
        fs::create_dir_all(&self.directory).map_err(|e| {
            OutputError::IoError(format!(
                "Failed to create directory {}: {e}",
                self.directory.display()
            ))
        })
    }

    /// Output path for an image captured at `instant`.
    pub fn image_path(&self, instant: DateTime<Utc>) -> PathBuf {
        self.directory.join(format!(
            "{}_{:03}.jpg",
            instant.format("%Y%m%d_%H%M%S"),
            instant.timestamp_subsec_millis()
        ))
    }

    /// Path of the run summary report inside the sequence directory.
    pub fn summary_path(&self) -> PathBuf {
        self.directory.join("run_summary.json")
    }
}

/// Replace path-hostile characters in an identifier.
///
/// Sequence ids are opaque API strings; `..` and separator characters must
/// not be able to escape the output root.
pub fn sanitize_identifier(id: &str) -> String {
    id.replace("..", "__").replace(['/', '\\', ':'], "_")
}

/// Write `bytes` to `path` atomically: a `.part` sibling is written first and
/// renamed into place, so `path` either holds a complete file or nothing.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> OutputResult<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".part");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes)
        .map_err(|e| OutputError::IoError(format!("Failed to write {}: {e}", tmp.display())))?;
    fs::rename(&tmp, path).map_err(|e| {
        // Leave no stray temp file behind on a failed rename.
        let _ = fs::remove_file(&tmp);
        OutputError::IoError(format!("Failed to rename into {}: {e}", path.display()))
    })
}

/// Whether `path` already holds a well-formed output: a non-empty JPEG whose
/// prefix carries an EXIF block. Anything else - missing, empty, truncated
/// before the metadata, or a `.part` leftover - reports false and the image
/// is downloaded again.
pub fn is_wellformed_output(path: &Path) -> bool {
    use std::io::Read;

    let Ok(file) = fs::File::open(path) else {
        return false;
    };
    let mut prefix = Vec::with_capacity(PROBE_PREFIX_BYTES);
    let mut handle = file.take(PROBE_PREFIX_BYTES as u64);
    if handle.read_to_end(&mut prefix).is_err() {
        return false;
    }

    crate::exif::writer::is_geotagged_jpeg(&prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProjectionKind;
    use chrono::TimeZone;

    fn descriptor(id: &str, captured_at: DateTime<Utc>) -> ImageDescriptor {
        ImageDescriptor {
            image_id: id.to_string(),
            sequence_id: "seqABC".to_string(),
            download_url: "https://example.com/x.jpg".to_string(),
            latitude: Some(1.0),
            longitude: Some(2.0),
            altitude: None,
            bearing: None,
            captured_at,
            camera_make: None,
            camera_model: None,
            projection: ProjectionKind::Flat,
        }
    }

    #[test]
    fn test_image_filename_includes_milliseconds() {
        let layout = SequenceLayout::new(
            Path::new("downloads"),
            "seqABC",
            Utc.with_ymd_and_hms(2025, 7, 28, 18, 7, 30).unwrap(),
        );
        let instant = Utc
            .with_ymd_and_hms(2025, 7, 28, 18, 7, 30)
            .unwrap()
            .checked_add_signed(chrono::Duration::milliseconds(120))
            .unwrap();
        let path = layout.image_path(instant);
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "20250728_180730_120.jpg"
        );
    }

    #[test]
    fn test_directory_named_after_earliest_capture() {
        let later = Utc.with_ymd_and_hms(2025, 7, 28, 19, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2025, 7, 28, 18, 7, 30).unwrap();
        let layout = SequenceLayout::for_batch(
            Path::new("downloads"),
            "seqABC",
            &[descriptor("b", later), descriptor("a", earlier)],
        )
        .unwrap();
        assert_eq!(
            layout.directory(),
            Path::new("downloads/20250728_180730_seqABC")
        );
    }

    #[test]
    fn test_empty_batch_rejected() {
        assert!(matches!(
            SequenceLayout::for_batch(Path::new("downloads"), "seqABC", &[]),
            Err(OutputError::EmptyBatch)
        ));
    }

    #[test]
    fn test_filenames_sort_in_capture_order() {
        let layout = SequenceLayout::new(
            Path::new("downloads"),
            "seq",
            Utc.with_ymd_and_hms(2025, 7, 28, 18, 0, 0).unwrap(),
        );
        let base = Utc.with_ymd_and_hms(2025, 7, 28, 18, 7, 30).unwrap();
        let names: Vec<String> = [0i64, 99, 100, 1000, 61_000]
            .iter()
            .map(|ms| {
                layout
                    .image_path(base + chrono::Duration::milliseconds(*ms))
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("abc123"), "abc123");
        assert_eq!(sanitize_identifier("../../etc"), "_____etc");
        assert_eq!(sanitize_identifier("a/b\\c:d"), "a_b_c_d");
    }

    #[test]
    fn test_write_atomic_leaves_no_part_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.jpg");
        write_atomic(&path, b"payload").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"payload");
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "part"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_wellformed_probe() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.jpg");
        assert!(!is_wellformed_output(&missing));

        let empty = dir.path().join("empty.jpg");
        fs::write(&empty, b"").unwrap();
        assert!(!is_wellformed_output(&empty));

        let garbage = dir.path().join("garbage.jpg");
        fs::write(&garbage, b"not a jpeg at all").unwrap();
        assert!(!is_wellformed_output(&garbage));
    }
}
