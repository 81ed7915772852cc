use crate::archive::{ArtifactOrigin, ArtifactPayload, ArtifactScan, ScannedArtifact};
use crate::error::{ArchiveError, Result};
use crate::models::Fingerprint;
use crate::readers::DispersionReader;
use crate::utils::progress::ProgressReporter;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

/// Rayon pool sized for independent per-file jobs.
pub fn build_pool(workers: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|e| ArchiveError::Config(e.to_string()))
}

/// Reads the embedded timestamp and fingerprint of many files at once.
pub struct ParallelScanner {
    max_workers: usize,
}

impl ParallelScanner {
    pub fn new(max_workers: usize) -> Self {
        Self { max_workers }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Scan `paths` on a worker pool. A file that cannot be read or keyed becomes an
    /// `Unreadable` entry; it never fails the batch. Output keeps the input order.
    pub fn scan_files(
        &self,
        source: &str,
        paths: &[PathBuf],
        reader: &dyn DispersionReader,
        progress: Option<&ProgressReporter>,
    ) -> Result<Vec<ScannedArtifact>> {
        let pool = build_pool(self.max_workers)?;
        let scanned_count = AtomicUsize::new(0);

        if let Some(p) = progress {
            p.set_message(&format!("Scanning {} files in {}...", paths.len(), source));
        }

        let scanned: Vec<ScannedArtifact> = pool.install(|| {
            paths
                .par_iter()
                .map(|path| {
                    let artifact = scan_one(source, path, reader);

                    let count = scanned_count.fetch_add(1, Ordering::Relaxed) + 1;
                    if let Some(p) = progress {
                        p.update(count as u64);
                    }

                    artifact
                })
                .collect()
        });

        if let Some(p) = progress {
            p.finish_with_message(&format!("Scanned {} files in {}", paths.len(), source));
        }

        Ok(scanned)
    }
}

impl Default for ParallelScanner {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

fn scan_one(source: &str, path: &Path, reader: &dyn DispersionReader) -> ScannedArtifact {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let scan = match reader
        .read_timestamp(path)
        .and_then(|timestamp| Ok((timestamp, Fingerprint::from_path(path)?)))
    {
        Ok((timestamp, fingerprint)) => {
            debug!(source, file = %file_name, key = %timestamp, "Keyed artifact");
            ArtifactScan::Keyed {
                timestamp,
                fingerprint,
            }
        }
        Err(e) => {
            warn!(source, file = %file_name, error = %e, "Unreadable artifact");
            ArtifactScan::Unreadable {
                reason: e.to_string(),
            }
        }
    };

    ScannedArtifact {
        origin: ArtifactOrigin {
            source: source.to_string(),
            file_name,
            payload: ArtifactPayload::File(path.to_path_buf()),
        },
        scan,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DispersionDataset, PackedTimestamp};
    use std::fs;
    use tempfile::TempDir;

    /// Files hold `"{date_code} {time_code}"` as text.
    struct TextReader;

    impl DispersionReader for TextReader {
        fn read_timestamp(&self, path: &Path) -> Result<PackedTimestamp> {
            let text = fs::read_to_string(path)?;
            let mut parts = text.split_whitespace().map(str::parse::<i32>);
            match (parts.next(), parts.next()) {
                (Some(Ok(d)), Some(Ok(t))) => PackedTimestamp::new(d, t),
                _ => Err(ArchiveError::MissingData("CDATE/CTIME".to_string())),
            }
        }

        fn read_dataset(&self, _path: &Path) -> Result<DispersionDataset> {
            Err(ArchiveError::MissingData("PM25".to_string()))
        }
    }

    #[test]
    fn test_scan_records_failures_per_file() -> Result<()> {
        let dir = TempDir::new()?;
        let good = dir.path().join("dispersion_20210228.nc");
        let bad = dir.path().join("dispersion_20210301.nc");
        fs::write(&good, "2021059 25055")?;
        fs::write(&bad, "<html>not found</html>")?;

        let scanner = ParallelScanner::new(2);
        let scanned = scanner.scan_files("BSC00CA12-01", &[good, bad], &TextReader, None)?;

        assert_eq!(scanned.len(), 2);
        assert_eq!(scanned[0].origin.file_name, "dispersion_20210228.nc");
        match &scanned[0].scan {
            ArtifactScan::Keyed { timestamp, .. } => {
                assert_eq!(*timestamp, PackedTimestamp::new(2021059, 25055)?)
            }
            other => panic!("expected keyed artifact, got {:?}", other),
        }
        assert!(matches!(scanned[1].scan, ArtifactScan::Unreadable { .. }));
        Ok(())
    }

    #[test]
    fn test_pool_needs_at_least_one_worker() -> Result<()> {
        let pool = build_pool(0)?;
        assert_eq!(pool.current_num_threads(), 1);
        Ok(())
    }
}
