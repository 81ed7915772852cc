use chrono::NaiveDateTime;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ArchiveError>;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid date: {message}")]
    InvalidDate { message: String },

    #[error("Invalid packed timestamp ({date_code}, {time_code}): {reason}")]
    InvalidPackedTimestamp {
        date_code: i32,
        time_code: i32,
        reason: String,
    },

    #[error("Invalid date range: {start} is after {end}")]
    InvalidDateRange {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    #[error("Not a canonical dispersion file name: {0}")]
    InvalidFileName(String),

    #[error("No data for timestamp {timestamp}")]
    NoDataForTimestamp { timestamp: NaiveDateTime },

    #[error("Resolution level {requested} out of range (max {max})")]
    ResolutionOutOfRange { requested: u32, max: u32 },

    #[error("Grid geometry mismatch: {0}")]
    GeometryMismatch(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration load error: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("NetCDF error: {0}")]
    NetCdf(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Missing required data: {0}")]
    MissingData(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing cancelled by user")]
    Cancelled,

    #[error("Async task error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

#[cfg(feature = "netcdf")]
impl From<netcdf::Error> for ArchiveError {
    fn from(e: netcdf::Error) -> Self {
        ArchiveError::NetCdf(e.to_string())
    }
}

impl ArchiveError {
    /// True for the "nothing to show" outcomes of a query-layer lookup.
    pub fn is_no_data(&self) -> bool {
        matches!(
            self,
            ArchiveError::NoDataForTimestamp { .. } | ArchiveError::ResolutionOutOfRange { .. }
        )
    }
}
