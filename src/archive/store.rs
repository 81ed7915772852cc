use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::archive::naming::{canonical_file_name, parse_canonical_file_name, partial_file_name};
use crate::archive::{ArtifactPayload, FileListing};
use crate::error::Result;
use crate::models::{Fingerprint, PackedTimestamp};
use crate::processors::ReconcileOutcome;
use crate::readers::list_directory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Copied,
    /// The canonical file already holds the same bytes.
    SkippedIdentical,
    /// The canonical file holds different bytes; it was left untouched.
    Conflict,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterializeReport {
    pub copied: Vec<PackedTimestamp>,
    pub skipped_identical: usize,
    pub conflicts: Vec<PackedTimestamp>,
    /// Keys held back by the reconciler for review.
    pub flagged: Vec<PackedTimestamp>,
}

impl MaterializeReport {
    pub fn summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str("=== Materialization Report ===\n");
        summary.push_str(&format!("Copied: {}\n", self.copied.len()));
        summary.push_str(&format!("Already present: {}\n", self.skipped_identical));
        summary.push_str(&format!("Conflicts (not overwritten): {}\n", self.conflicts.len()));
        for key in &self.conflicts {
            summary.push_str(&format!("  {}\n", canonical_file_name(key)));
        }
        summary.push_str(&format!("Flagged for review: {}\n", self.flagged.len()));
        for key in &self.flagged {
            summary.push_str(&format!("  {}\n", key));
        }
        summary
    }
}

#[derive(Debug, Serialize)]
struct ManifestRow {
    file: String,
    date_code: i32,
    time_code: i32,
    datetime: NaiveDateTime,
    size: u64,
    crc32: String,
}

/// A flat directory of canonically named dispersion files.
///
/// Files are never overwritten with different content: writes go to a hidden
/// partial file that is renamed into place only when the canonical name is free.
#[derive(Debug, Clone)]
pub struct CanonicalArchive {
    root: PathBuf,
    label: String,
}

impl CanonicalArchive {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            label: root.display().to_string(),
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &PackedTimestamp) -> PathBuf {
        self.root.join(canonical_file_name(key))
    }

    /// Every canonically named file, by key. Other files are ignored.
    pub fn keys(&self) -> Result<BTreeMap<PackedTimestamp, PathBuf>> {
        let mut keys = BTreeMap::new();
        for path in list_directory(&self.root)? {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match parse_canonical_file_name(&name) {
                Ok(key) => {
                    keys.insert(key, path);
                }
                Err(_) => debug!(file = %name, "Skipping non-canonical file in archive"),
            }
        }
        Ok(keys)
    }

    pub fn contains(&self, key: &PackedTimestamp) -> bool {
        self.path_for(key).is_file()
    }

    pub fn latest(&self) -> Result<Option<PackedTimestamp>> {
        Ok(self.keys()?.keys().next_back().copied())
    }

    pub fn time_range(&self) -> Result<Option<(NaiveDateTime, NaiveDateTime)>> {
        let keys = self.keys()?;
        match (keys.keys().next(), keys.keys().next_back()) {
            (Some(first), Some(last)) => Ok(Some((first.decode()?, last.decode()?))),
            _ => Ok(None),
        }
    }

    /// Place `payload` under `key`'s canonical name unless that name is taken.
    pub fn store(&self, key: &PackedTimestamp, payload: &ArtifactPayload) -> Result<StoreOutcome> {
        let target = self.path_for(key);

        if target.exists() {
            let existing = Fingerprint::from_path(&target)?;
            let incoming = match payload {
                ArtifactPayload::File(path) => Fingerprint::from_path(path)?,
                ArtifactPayload::Memory(bytes) => Fingerprint::from_bytes(bytes),
            };
            return if existing == incoming {
                Ok(StoreOutcome::SkippedIdentical)
            } else {
                warn!(
                    key = %key,
                    destination = %target.display(),
                    "Archive already holds different content for this key"
                );
                Ok(StoreOutcome::Conflict)
            };
        }

        let name = canonical_file_name(key);
        let partial = self.root.join(partial_file_name(&name));
        match payload {
            ArtifactPayload::File(path) => {
                fs::copy(path, &partial)?;
            }
            ArtifactPayload::Memory(bytes) => fs::write(&partial, bytes)?,
        }
        fs::rename(&partial, &target)?;

        debug!(key = %key, destination = %target.display(), "Stored artifact");
        Ok(StoreOutcome::Copied)
    }

    pub fn store_file(&self, key: &PackedTimestamp, source: &Path) -> Result<StoreOutcome> {
        self.store(key, &ArtifactPayload::File(source.to_path_buf()))
    }

    /// Copy every chosen artifact of a reconciliation into the archive. Running it
    /// twice copies nothing the second time.
    pub fn materialize(&self, outcome: &ReconcileOutcome) -> Result<MaterializeReport> {
        let mut report = MaterializeReport {
            flagged: outcome.flagged_keys(),
            ..Default::default()
        };

        for (key, artifact) in &outcome.entries {
            match self.store(key, &artifact.origin.payload)? {
                StoreOutcome::Copied => report.copied.push(*key),
                StoreOutcome::SkippedIdentical => report.skipped_identical += 1,
                StoreOutcome::Conflict => report.conflicts.push(*key),
            }
        }

        info!(
            archive = %self.root.display(),
            copied = report.copied.len(),
            skipped = report.skipped_identical,
            conflicts = report.conflicts.len(),
            "Materialized canonical archive"
        );

        Ok(report)
    }

    /// Write a CSV listing of the archive; returns the number of rows.
    pub fn write_manifest(&self, output: &Path) -> Result<usize> {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let keys = self.keys()?;
        let mut writer = csv::Writer::from_path(output)?;
        for (key, path) in &keys {
            let fingerprint = Fingerprint::from_path(path)?;
            writer.serialize(ManifestRow {
                file: canonical_file_name(key),
                date_code: key.date_code,
                time_code: key.time_code,
                datetime: key.decode()?,
                size: fingerprint.len,
                crc32: format!("{:08x}", fingerprint.crc32),
            })?;
        }
        writer.flush()?;

        info!(manifest = %output.display(), rows = keys.len(), "Wrote archive manifest");
        Ok(keys.len())
    }
}

impl FileListing for CanonicalArchive {
    fn label(&self) -> &str {
        &self.label
    }

    fn file_names(&self) -> Result<Vec<String>> {
        Ok(self
            .keys()?
            .keys()
            .map(canonical_file_name)
            .collect())
    }
}
