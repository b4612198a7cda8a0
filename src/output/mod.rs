//! Destination layout and atomic persistence
//!
//! One directory per sequence, named by the earliest capture instant plus the
//! sequence identifier; one JPEG per image, named by that image's own capture
//! instant with millisecond suffix so lexical order matches capture order.
//!
//! Writes go through a `.part` temporary file renamed into place on success,
//! so a partially written output is never mistaken for a finished one. A
//! destination directory is additionally guarded by an advisory lock while a
//! run is active.

pub mod layout;
pub mod lock;

pub use layout::SequenceLayout;
pub use lock::DestinationLock;

/// Output errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// Filesystem operation failed
    #[error("IO error: {0}")]
    IoError(String),

    /// Destination lock could not be acquired
    #[error("lock error: {0}")]
    LockError(String),

    /// A batch with no descriptors has no earliest capture to name the
    /// directory after
    #[error("cannot derive a directory name from an empty batch")]
    EmptyBatch,
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
