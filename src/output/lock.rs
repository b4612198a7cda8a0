//! Advisory locking for destination directories
//!
//! Two concurrent runs writing into the same sequence directory would race
//! on the skip checks and the run summary. An exclusive fd-lock on a marker
//! file inside the destination makes the second run fail fast instead.

use super::{OutputError, OutputResult};
use fd_lock::RwLock;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// Exclusive lock over a destination directory.
///
/// Released automatically on drop.
pub struct DestinationLock {
    #[allow(dead_code)]
    lock: RwLock<File>,
}

impl DestinationLock {
    /// Try to acquire the destination lock without blocking.
    ///
    /// # Errors
    /// [`OutputError::LockError`] when another run holds the lock or the lock
    /// file cannot be created.
    pub fn try_acquire(directory: &Path) -> OutputResult<Self> {
        std::fs::create_dir_all(directory)
            .map_err(|e| OutputError::IoError(format!("Failed to create destination: {e}")))?;

        let lock_path = directory.join(".download.lock");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| OutputError::LockError(format!("Failed to open lock file: {e}")))?;

        let mut lock = RwLock::new(file);
        match lock.try_write() {
            // The guard cannot outlive this function; forgetting it keeps the
            // OS lock held until the file handle closes when Self drops.
            Ok(guard) => std::mem::forget(guard),
            Err(_) => {
                return Err(OutputError::LockError(format!(
                    "another run is active in {}",
                    directory.display()
                )))
            }
        }

        Ok(Self { lock })
    }
}
