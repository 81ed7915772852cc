use futures::stream::{self, StreamExt};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

use crate::archive::naming::partial_file_name;
use crate::fetch::transport::BodyStream;
use crate::fetch::{FetchJob, Transport};
use crate::utils::constants::{DEFAULT_MAX_CONCURRENT, MAX_CONCURRENT_LIMIT};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// The server answered with something other than `application/octet-stream`.
    ContentType(Option<String>),
    Status(u16),
    Network(String),
    Io(String),
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::ContentType(ct) => write!(
                f,
                "unexpected Content-Type {}",
                ct.as_deref().unwrap_or("<none>")
            ),
            FetchFailure::Status(code) => write!(f, "HTTP status {}", code),
            FetchFailure::Network(msg) => write!(f, "network error: {}", msg),
            FetchFailure::Io(msg) => write!(f, "write error: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    Downloaded { bytes: u64 },
    /// The destination already existed.
    Skipped,
    Failed(FetchFailure),
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub job: Option<FetchJob>,
    pub url: String,
    pub destination: PathBuf,
    pub status: FetchStatus,
}

/// Results of one batch, in completion order.
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    pub outcomes: Vec<FetchOutcome>,
}

impl FetchReport {
    pub fn downloaded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, FetchStatus::Downloaded { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == FetchStatus::Skipped)
            .count()
    }

    pub fn failures(&self) -> Vec<&FetchOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, FetchStatus::Failed(_)))
            .collect()
    }

    pub fn summary(&self) -> String {
        let failures = self.failures();
        let mut summary = format!(
            "Fetch summary: {} requested, {} downloaded, {} skipped, {} failed\n",
            self.outcomes.len(),
            self.downloaded(),
            self.skipped(),
            failures.len()
        );
        for outcome in failures {
            if let FetchStatus::Failed(reason) = &outcome.status {
                summary.push_str(&format!("  {} -> {}: {}\n", outcome.url, outcome.destination.display(), reason));
            }
        }
        summary
    }
}

/// Downloads dispersion files with a bounded number of requests in flight.
///
/// Every job is independent: a failed request is logged and recorded in the report,
/// and the batch carries on.
pub struct Fetcher<T: Transport> {
    transport: Arc<T>,
    base_url: String,
    data_root: PathBuf,
    max_concurrent: usize,
    skip_existing: bool,
}

impl<T: Transport> Fetcher<T> {
    pub fn new(transport: Arc<T>, base_url: impl Into<String>, data_root: impl Into<PathBuf>) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            data_root: data_root.into(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            skip_existing: true,
        }
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.clamp(1, MAX_CONCURRENT_LIMIT);
        self
    }

    pub fn with_skip_existing(mut self, skip_existing: bool) -> Self {
        self.skip_existing = skip_existing;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn fetch_all(&self, jobs: Vec<FetchJob>) -> FetchReport {
        info!(
            jobs = jobs.len(),
            max_concurrent = self.max_concurrent,
            "Starting fetch batch"
        );

        let outcomes: Vec<FetchOutcome> = stream::iter(jobs)
            .map(|job| self.fetch_job(job))
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let report = FetchReport { outcomes };
        info!(
            downloaded = report.downloaded(),
            skipped = report.skipped(),
            failed = report.failures().len(),
            "Fetch batch finished"
        );
        report
    }

    pub async fn fetch_job(&self, job: FetchJob) -> FetchOutcome {
        let url = job.url(&self.base_url);
        let destination = job.destination(&self.data_root);

        let status = if self.skip_existing && fs::try_exists(&destination).await.unwrap_or(false) {
            info!(url = %url, destination = %destination.display(), "Already downloaded, skipping");
            FetchStatus::Skipped
        } else {
            self.download(&url, &destination).await
        };

        FetchOutcome {
            job: Some(job),
            url,
            destination,
            status,
        }
    }

    /// GET `url` and stream the body to `destination` if it is a binary payload.
    /// Rejected responses are dropped without reading their body.
    pub async fn download(&self, url: &str, destination: &Path) -> FetchStatus {
        let response = match self.transport.get(url).await {
            Ok(response) => response,
            Err(e) => {
                error!(url = %url, destination = %destination.display(), error = %e, "Failed: {} -> {}", url, destination.display());
                return FetchStatus::Failed(FetchFailure::Network(e.to_string()));
            }
        };

        if !response.is_success() {
            warn!(
                url = %url,
                destination = %destination.display(),
                status = response.status,
                "Failed: {} -> {} | HTTP status {}",
                url,
                destination.display(),
                response.status
            );
            return FetchStatus::Failed(FetchFailure::Status(response.status));
        }

        if !response.is_binary() {
            let content_type = response.content_type.as_deref().unwrap_or("<none>");
            error!(
                url = %url,
                destination = %destination.display(),
                content_type,
                "Failed: {} -> {} | Header Content-Type: {}",
                url,
                destination.display(),
                content_type
            );
            return FetchStatus::Failed(FetchFailure::ContentType(response.content_type));
        }

        match write_streamed(destination, response.body).await {
            Ok(bytes) => {
                info!(url = %url, destination = %destination.display(), bytes, "Success: {} -> {}", url, destination.display());
                FetchStatus::Downloaded { bytes }
            }
            Err(failure) => {
                error!(url = %url, destination = %destination.display(), error = %failure, "Failed to save download");
                FetchStatus::Failed(failure)
            }
        }
    }
}

/// Stream `body` through a hidden partial file so readers never see a truncated
/// download. The partial file is removed if the transfer breaks off.
pub(crate) async fn write_streamed(
    destination: &Path,
    mut body: BodyStream,
) -> std::result::Result<u64, FetchFailure> {
    let parent = destination.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).await.map_err(io_failure)?;

    let file_name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let partial = parent.join(partial_file_name(&file_name));

    let written = match copy_body(&partial, &mut body).await {
        Ok(written) => written,
        Err(failure) => {
            if let Err(e) = fs::remove_file(&partial).await {
                warn!(partial = %partial.display(), error = %e, "Could not remove partial download");
            }
            return Err(failure);
        }
    };

    fs::rename(&partial, destination).await.map_err(io_failure)?;
    Ok(written)
}

async fn copy_body(partial: &Path, body: &mut BodyStream) -> std::result::Result<u64, FetchFailure> {
    let mut file = fs::File::create(partial).await.map_err(io_failure)?;
    let mut written = 0u64;

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| FetchFailure::Network(e.to_string()))?;
        file.write_all(&chunk).await.map_err(io_failure)?;
        written += chunk.len() as u64;
    }

    file.flush().await.map_err(io_failure)?;
    file.sync_all().await.map_err(io_failure)?;
    Ok(written)
}

fn io_failure(e: std::io::Error) -> FetchFailure {
    FetchFailure::Io(e.to_string())
}
