use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{ArchiveError, Result};

/// One configured smoke-dispersion product.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Validate)]
pub struct ForecastRun {
    #[validate(length(min = 1))]
    pub forecast_id: String,

    /// Daily initialization hour, two digits ("02", "08", ...).
    #[validate(length(equal = 2))]
    pub init_time: String,
}

impl ForecastRun {
    pub fn new(forecast_id: &str, init_time: &str) -> Result<Self> {
        let run = Self {
            forecast_id: forecast_id.to_string(),
            init_time: init_time.to_string(),
        };
        run.validate()?;
        run.init_hour()?;
        Ok(run)
    }

    pub fn init_hour(&self) -> Result<u32> {
        self.init_time
            .parse::<u32>()
            .ok()
            .filter(|h| *h <= 23 && self.init_time.len() == 2)
            .ok_or_else(|| {
                ArchiveError::Config(format!(
                    "init_time '{}' of forecast {} is not a two-digit hour",
                    self.init_time, self.forecast_id
                ))
            })
    }

    /// Path segment identifying one run on the remote: `{YYYYMMDD}{HH}`.
    pub fn run_segment(&self, date: NaiveDate) -> String {
        format!("{}{}", date.format("%Y%m%d"), self.init_time)
    }
}

/// The registry the download scripts were run against.
pub fn default_registry() -> Vec<ForecastRun> {
    [
        ("BSC18CA12-01", "02"),
        ("BSC00CA12-01", "08"),
        ("BSC06CA12-01", "14"),
        ("BSC12CA12-01", "20"),
        ("BSC00WC04-01", "08"),
    ]
    .into_iter()
    .map(|(id, init)| ForecastRun {
        forecast_id: id.to_string(),
        init_time: init.to_string(),
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forecast_run_validation() {
        assert!(ForecastRun::new("BSC00CA12-01", "08").is_ok());
        assert!(ForecastRun::new("", "08").is_err());
        assert!(ForecastRun::new("BSC00CA12-01", "8").is_err());
        assert!(ForecastRun::new("BSC00CA12-01", "24").is_err());
        assert!(ForecastRun::new("BSC00CA12-01", "ab").is_err());
    }

    #[test]
    fn test_run_segment() {
        let run = ForecastRun::new("BSC18CA12-01", "02").unwrap();
        let date = NaiveDate::from_ymd_opt(2021, 3, 4).unwrap();
        assert_eq!(run.run_segment(date), "2021030402");
        assert_eq!(run.init_hour().unwrap(), 2);
    }

    #[test]
    fn test_default_registry_is_valid() {
        let registry = default_registry();
        assert_eq!(registry.len(), 5);
        for run in &registry {
            assert!(run.validate().is_ok());
            assert!(run.init_hour().is_ok());
        }
    }
}
