use std::sync::Arc;
use tracing::{info, warn};

use crate::archive::{CanonicalArchive, StagingArea, StoreOutcome};
use crate::error::Result;
use crate::fetch::{current_url, FetchFailure, FetchStatus, Fetcher, Transport};
use crate::models::PackedTimestamp;
use crate::readers::DispersionReader;
use crate::utils::constants::REMOTE_FILE_NAME;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LatestOutcome {
    /// New snapshot stored under its canonical name.
    Saved(PackedTimestamp),
    /// The archive already had this key; the download was discarded.
    AlreadyHave(PackedTimestamp),
    Failed(FetchFailure),
    /// Downloaded but its embedded timestamp could not be read.
    Rejected(String),
}

/// Fetch the `current` snapshot, key it by its embedded timestamp and add it to
/// the archive if that key is new.
pub async fn fetch_latest<T: Transport>(
    fetcher: &Fetcher<T>,
    reader: Arc<dyn DispersionReader>,
    archive: &CanonicalArchive,
    staging: &StagingArea,
) -> Result<LatestOutcome> {
    let url = current_url(fetcher.base_url());
    let staged = staging.path_for(REMOTE_FILE_NAME);

    match fetcher.download(&url, &staged).await {
        FetchStatus::Downloaded { .. } => {}
        FetchStatus::Failed(reason) => return Ok(LatestOutcome::Failed(reason)),
        FetchStatus::Skipped => {}
    }

    let staged_for_read = staged.clone();
    let key = match tokio::task::spawn_blocking(move || reader.read_timestamp(&staged_for_read))
        .await?
    {
        Ok(key) => key,
        Err(e) => {
            warn!(url = %url, error = %e, "Latest snapshot has no readable timestamp");
            return Ok(LatestOutcome::Rejected(e.to_string()));
        }
    };

    if archive.contains(&key) {
        info!(key = %key, "Latest snapshot already archived");
        return Ok(LatestOutcome::AlreadyHave(key));
    }

    match archive.store_file(&key, &staged)? {
        StoreOutcome::Copied => {
            info!(
                key = %key,
                destination = %archive.path_for(&key).display(),
                "Archived latest snapshot"
            );
            Ok(LatestOutcome::Saved(key))
        }
        StoreOutcome::SkippedIdentical | StoreOutcome::Conflict => {
            Ok(LatestOutcome::AlreadyHave(key))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ArchiveError;
    use crate::fetch::FetchResponse;
    use crate::models::DispersionDataset;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::path::Path;
    use tempfile::TempDir;

    /// Answers every request with the same content type and body.
    struct StaticTransport {
        content_type: &'static str,
        body: &'static [u8],
    }

    #[async_trait]
    impl Transport for StaticTransport {
        async fn get(&self, _url: &str) -> Result<FetchResponse> {
            Ok(FetchResponse::buffered(
                200,
                Some(self.content_type),
                Bytes::from_static(self.body),
            ))
        }
    }

    /// The payload is `"{date_code} {time_code}"`.
    struct TextReader;

    impl DispersionReader for TextReader {
        fn read_timestamp(&self, path: &Path) -> Result<PackedTimestamp> {
            let text = std::fs::read_to_string(path)?;
            let parts: Vec<i32> = text
                .split_whitespace()
                .filter_map(|p| p.parse().ok())
                .collect();
            match parts.as_slice() {
                [d, t] => PackedTimestamp::new(*d, *t),
                _ => Err(ArchiveError::MissingData("CDATE".to_string())),
            }
        }

        fn read_dataset(&self, _path: &Path) -> Result<DispersionDataset> {
            Err(ArchiveError::MissingData("PM25".to_string()))
        }
    }

    fn binary(body: &'static [u8]) -> StaticTransport {
        StaticTransport {
            content_type: "application/octet-stream",
            body,
        }
    }

    #[tokio::test]
    async fn test_new_snapshot_saved_then_recognised() -> Result<()> {
        let dir = TempDir::new()?;
        let archive = CanonicalArchive::open(dir.path().join("archive"))?;
        let staging = StagingArea::new_in(&dir.path().join("staging"))?;
        let fetcher = Fetcher::new(
            Arc::new(binary(b"2025316 120000")),
            "https://firesmoke.test/forecasts",
            dir.path(),
        );
        let key = PackedTimestamp::new(2025316, 120000)?;

        let first = fetch_latest(&fetcher, Arc::new(TextReader), &archive, &staging).await?;
        assert_eq!(first, LatestOutcome::Saved(key));
        assert!(archive.contains(&key));

        let second = fetch_latest(&fetcher, Arc::new(TextReader), &archive, &staging).await?;
        assert_eq!(second, LatestOutcome::AlreadyHave(key));
        assert_eq!(archive.keys()?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_html_and_unreadable_snapshots() -> Result<()> {
        let dir = TempDir::new()?;
        let archive = CanonicalArchive::open(dir.path().join("archive"))?;
        let staging = StagingArea::new_in(&dir.path().join("staging"))?;

        let html = Fetcher::new(
            Arc::new(StaticTransport {
                content_type: "text/html",
                body: b"<html/>",
            }),
            "https://firesmoke.test/forecasts",
            dir.path(),
        );
        let outcome = fetch_latest(&html, Arc::new(TextReader), &archive, &staging).await?;
        assert_eq!(
            outcome,
            LatestOutcome::Failed(FetchFailure::ContentType(Some("text/html".to_string())))
        );

        let garbage = Fetcher::new(
            Arc::new(binary(b"not netcdf")),
            "https://firesmoke.test/forecasts",
            dir.path(),
        );
        let outcome = fetch_latest(&garbage, Arc::new(TextReader), &archive, &staging).await?;
        assert!(matches!(outcome, LatestOutcome::Rejected(_)));
        assert!(archive.keys()?.is_empty());
        Ok(())
    }
}
