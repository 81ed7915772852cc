use crate::error::{ArchiveError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Scratch space for downloads whose canonical key is not known yet.
///
/// Lives inside the configured staging directory so that a finished file can be
/// renamed into the archive on the same filesystem. Removed on drop.
pub struct StagingArea {
    temp_dir: TempDir,
}

impl StagingArea {
    pub fn new_in(staging_dir: &Path) -> Result<Self> {
        fs::create_dir_all(staging_dir)?;
        let temp_dir = TempDir::new_in(staging_dir).map_err(|e| {
            ArchiveError::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create staging directory in {}: {}",
                    staging_dir.display(),
                    e
                ),
            ))
        })?;

        Ok(Self { temp_dir })
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.temp_dir.path().join(file_name)
    }
}
