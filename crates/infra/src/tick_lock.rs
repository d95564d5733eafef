//! Cross-process tick lock.

use crate::InfraResult;
use catalog_sync_config::ValidatedSyncConfig;
use catalog_sync_shared::{ErrorClass, ErrorCode, ErrorEnvelope};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE_NAME: &str = "catalog-sync.lock";

/// Exclusive lock held for the duration of one tick.
///
/// Released when dropped (closing the file releases the OS lock).
#[derive(Debug)]
pub struct TickLock {
    _file: File,
    path: PathBuf,
}

impl TickLock {
    /// Take the lock without waiting; `None` when another holder has it.
    pub fn try_acquire(path: &Path) -> InfraResult<Option<Self>> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                _file: file,
                path: path.to_path_buf(),
            })),
            Err(error) if error.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    /// Lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `scheduler.lockPath`, else a `.lock` file next to the watermark database.
#[must_use]
pub fn tick_lock_path(config: &ValidatedSyncConfig) -> PathBuf {
    if let Some(path) = config.scheduler.lock_path.as_ref() {
        return path.clone();
    }
    config.watermarks.path.as_ref().map_or_else(
        || std::env::temp_dir().join(LOCK_FILE_NAME),
        |path| path.with_extension("lock"),
    )
}

/// Error returned when another process is mid-tick.
#[must_use]
pub fn tick_locked_error(path: &Path) -> ErrorEnvelope {
    ErrorEnvelope::expected_with_class(
        ErrorCode::new("sync", "tick_locked"),
        "another sync tick holds the lock",
        ErrorClass::Retriable,
    )
    .with_metadata("lockPath", path.display().to_string())
}
