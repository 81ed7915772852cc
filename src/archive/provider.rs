//! Sources of raw artifacts for reconciliation.
//!
//! A provider lists file names (enough for the union audit) and scans its artifacts
//! into canonical keys. Directories are the production provider; the in-memory one
//! lets merges be exercised without NetCDF files.

use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;
use crate::models::{Fingerprint, PackedTimestamp};
use crate::processors::ParallelScanner;
use crate::readers::{list_directory, DispersionReader};
use crate::utils::progress::ProgressReporter;

/// Where an artifact's bytes live.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactPayload {
    File(PathBuf),
    Memory(Bytes),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactOrigin {
    /// Label of the provider, e.g. the source directory.
    pub source: String,
    pub file_name: String,
    pub payload: ArtifactPayload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactScan {
    Keyed {
        timestamp: PackedTimestamp,
        fingerprint: Fingerprint,
    },
    Unreadable {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScannedArtifact {
    pub origin: ArtifactOrigin,
    pub scan: ArtifactScan,
}

pub trait FileListing {
    fn label(&self) -> &str;

    /// Names of the artifacts this source holds.
    fn file_names(&self) -> Result<Vec<String>>;
}

pub trait ArtifactProvider: FileListing + Send + Sync {
    fn scan(&self) -> Result<Vec<ScannedArtifact>>;
}

fn directory_label(dir: &Path) -> String {
    dir.display().to_string()
}

fn directory_file_names(dir: &Path) -> Result<Vec<String>> {
    Ok(list_directory(dir)?
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect())
}

/// A directory whose files are only listed, never opened.
#[derive(Debug, Clone)]
pub struct DirectoryListing {
    label: String,
    dir: PathBuf,
}

impl DirectoryListing {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            label: directory_label(&dir),
            dir,
        }
    }
}

impl FileListing for DirectoryListing {
    fn label(&self) -> &str {
        &self.label
    }

    fn file_names(&self) -> Result<Vec<String>> {
        directory_file_names(&self.dir)
    }
}

/// A directory of downloaded files, keyed by reading each file's metadata.
pub struct DirectoryProvider {
    label: String,
    dir: PathBuf,
    reader: Arc<dyn DispersionReader>,
    workers: usize,
    silent: bool,
}

impl DirectoryProvider {
    pub fn new(dir: impl Into<PathBuf>, reader: Arc<dyn DispersionReader>) -> Self {
        let dir = dir.into();
        Self {
            label: directory_label(&dir),
            dir,
            reader,
            workers: num_cpus::get(),
            silent: true,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.silent = !show;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl FileListing for DirectoryProvider {
    fn label(&self) -> &str {
        &self.label
    }

    fn file_names(&self) -> Result<Vec<String>> {
        directory_file_names(&self.dir)
    }
}

impl ArtifactProvider for DirectoryProvider {
    fn scan(&self) -> Result<Vec<ScannedArtifact>> {
        let paths = list_directory(&self.dir)?;
        let progress = ProgressReporter::new(paths.len() as u64, "Scanning...", self.silent);
        ParallelScanner::new(self.workers).scan_files(
            &self.label,
            &paths,
            self.reader.as_ref(),
            Some(&progress),
        )
    }
}

#[derive(Debug, Clone)]
enum MemoryEntry {
    Artifact {
        timestamp: PackedTimestamp,
        payload: Bytes,
    },
    Unreadable {
        reason: String,
    },
}

/// Artifacts held in memory, scanned in file-name order like a directory.
#[derive(Debug, Clone)]
pub struct InMemoryProvider {
    label: String,
    entries: Vec<(String, MemoryEntry)>,
}

impl InMemoryProvider {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            entries: Vec::new(),
        }
    }

    pub fn with_artifact(
        mut self,
        file_name: impl Into<String>,
        timestamp: PackedTimestamp,
        payload: impl Into<Bytes>,
    ) -> Self {
        self.entries.push((
            file_name.into(),
            MemoryEntry::Artifact {
                timestamp,
                payload: payload.into(),
            },
        ));
        self
    }

    /// An artifact whose embedded timestamp cannot be read.
    pub fn with_unreadable(mut self, file_name: impl Into<String>, reason: impl Into<String>) -> Self {
        self.entries.push((
            file_name.into(),
            MemoryEntry::Unreadable {
                reason: reason.into(),
            },
        ));
        self
    }

    fn sorted_entries(&self) -> Vec<&(String, MemoryEntry)> {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

impl FileListing for InMemoryProvider {
    fn label(&self) -> &str {
        &self.label
    }

    fn file_names(&self) -> Result<Vec<String>> {
        Ok(self
            .sorted_entries()
            .into_iter()
            .map(|(name, _)| name.clone())
            .collect())
    }
}

impl ArtifactProvider for InMemoryProvider {
    fn scan(&self) -> Result<Vec<ScannedArtifact>> {
        Ok(self
            .sorted_entries()
            .into_iter()
            .map(|(file_name, entry)| match entry {
                MemoryEntry::Artifact { timestamp, payload } => ScannedArtifact {
                    origin: ArtifactOrigin {
                        source: self.label.clone(),
                        file_name: file_name.clone(),
                        payload: ArtifactPayload::Memory(payload.clone()),
                    },
                    scan: ArtifactScan::Keyed {
                        timestamp: *timestamp,
                        fingerprint: Fingerprint::from_bytes(payload),
                    },
                },
                MemoryEntry::Unreadable { reason } => ScannedArtifact {
                    origin: ArtifactOrigin {
                        source: self.label.clone(),
                        file_name: file_name.clone(),
                        payload: ArtifactPayload::Memory(Bytes::new()),
                    },
                    scan: ArtifactScan::Unreadable {
                        reason: reason.clone(),
                    },
                },
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_in_memory_provider_scans_in_name_order() -> Result<()> {
        let key = PackedTimestamp::new(2021059, 25055)?;
        let provider = InMemoryProvider::new("run-b")
            .with_artifact("dispersion_20210301.nc", key, &b"bbb"[..])
            .with_unreadable("dispersion_20210228.nc", "TFLAG missing");

        assert_eq!(
            provider.file_names()?,
            vec!["dispersion_20210228.nc", "dispersion_20210301.nc"]
        );

        let scanned = provider.scan()?;
        assert!(matches!(scanned[0].scan, ArtifactScan::Unreadable { .. }));
        match &scanned[1].scan {
            ArtifactScan::Keyed {
                timestamp,
                fingerprint,
            } => {
                assert_eq!(*timestamp, key);
                assert_eq!(fingerprint.len, 3);
            }
            other => panic!("expected keyed artifact, got {:?}", other),
        }
        assert_eq!(scanned[1].origin.source, "run-b");
        Ok(())
    }

    #[test]
    fn test_directory_listing_names() -> Result<()> {
        let dir = TempDir::new()?;
        fs::write(dir.path().join("dispersion_2021060_000000.nc"), b"x")?;
        fs::write(dir.path().join("dispersion_2021059_025055.nc"), b"y")?;

        let listing = DirectoryListing::new(dir.path());
        assert_eq!(
            listing.file_names()?,
            vec!["dispersion_2021059_025055.nc", "dispersion_2021060_000000.nc"]
        );
        assert_eq!(listing.label(), dir.path().display().to_string());
        Ok(())
    }
}
