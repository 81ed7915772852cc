use chrono::NaiveDate;
use std::path::{Path, PathBuf};

use crate::archive::request_file_name;
use crate::error::{ArchiveError, Result};
use crate::models::ForecastRun;
use crate::utils::constants::{CURRENT_ALIAS, REMOTE_FILE_NAME};

/// One (forecast run, calendar date) download.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchJob {
    pub run: ForecastRun,
    pub date: NaiveDate,
}

impl FetchJob {
    pub fn new(run: ForecastRun, date: NaiveDate) -> Self {
        Self { run, date }
    }

    /// `{base}/{forecast_id}/{YYYYMMDD}{HH}/dispersion.nc`
    pub fn url(&self, base_url: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            base_url.trim_end_matches('/'),
            self.run.forecast_id,
            self.run.run_segment(self.date),
            REMOTE_FILE_NAME
        )
    }

    /// `{data_root}/{forecast_id}/dispersion_{YYYYMMDD}.nc`
    pub fn destination(&self, data_root: &Path) -> PathBuf {
        data_root
            .join(&self.run.forecast_id)
            .join(request_file_name(self.date))
    }
}

/// `{base}/current/dispersion.nc`, the alias for the newest run.
pub fn current_url(base_url: &str) -> String {
    format!(
        "{}/{}/{}",
        base_url.trim_end_matches('/'),
        CURRENT_ALIAS,
        REMOTE_FILE_NAME
    )
}

/// Every registry entry for every date from `start` to `end` inclusive, date-major.
pub fn enumerate_jobs(
    registry: &[ForecastRun],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<FetchJob>> {
    if start > end {
        return Err(ArchiveError::InvalidDateRange { start, end });
    }

    Ok(start
        .iter_days()
        .take_while(|date| *date <= end)
        .flat_map(|date| {
            registry
                .iter()
                .map(move |run| FetchJob::new(run.clone(), date))
        })
        .collect())
}
