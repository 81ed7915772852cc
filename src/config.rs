use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use validator::Validate;

use crate::error::Result;
use crate::models::{default_registry, ForecastRun};
use crate::processors::CollisionPolicy;
use crate::utils::constants::*;

/// Everything the commands need, passed explicitly to each component.
///
/// Sources, lowest precedence first: built-in defaults, a TOML file, then
/// `FIRESMOKE_*` environment variables with `__` between nested keys
/// (`FIRESMOKE_FETCH__MAX_CONCURRENT=8`).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AppConfig {
    #[validate(url)]
    pub base_url: String,
    pub data_root: PathBuf,
    pub archive_dir: PathBuf,
    pub staging_dir: PathBuf,
    #[validate(length(min = 1), nested)]
    pub forecasts: Vec<ForecastRun>,
    #[validate(nested)]
    pub fetch: FetchSettings,
    pub reconcile: ReconcileSettings,
    #[validate(nested)]
    pub render: RenderSettings,
    #[validate(nested)]
    pub dashboard: DashboardSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct FetchSettings {
    #[validate(range(min = 1, max = 64))]
    pub max_concurrent: usize,
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,
    pub skip_existing: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileSettings {
    pub policy: CollisionPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RenderSettings {
    #[validate(range(min = 1))]
    pub workers: usize,
    pub max_resolution: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DashboardSettings {
    #[validate(range(min = 1))]
    pub playback_interval_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            data_root: PathBuf::from(DEFAULT_DATA_ROOT),
            archive_dir: PathBuf::from(DEFAULT_ARCHIVE_DIR),
            staging_dir: PathBuf::from(DEFAULT_STAGING_DIR),
            forecasts: default_registry(),
            fetch: FetchSettings::default(),
            reconcile: ReconcileSettings::default(),
            render: RenderSettings::default(),
            dashboard: DashboardSettings::default(),
        }
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            skip_existing: true,
        }
    }
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            max_resolution: None,
        }
    }
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            playback_interval_ms: DEFAULT_PLAYBACK_INTERVAL_MS,
        }
    }
}

impl FetchSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl DashboardSettings {
    pub fn playback_interval(&self) -> Duration {
        Duration::from_millis(self.playback_interval_ms)
    }
}

impl AppConfig {
    /// Load from `path` (which must exist) or, without one, from `firesmoke.toml`
    /// in the working directory if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.check()?;

        debug!(?config, "Loaded configuration");
        Ok(config)
    }

    /// Field validation plus the per-forecast hour check.
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        for run in &self.forecasts {
            run.init_hour()?;
        }
        Ok(())
    }

    /// Registry entries whose id is in `ids`; all of them when `ids` is empty.
    pub fn select_forecasts(&self, ids: &[String]) -> Result<Vec<ForecastRun>> {
        if ids.is_empty() {
            return Ok(self.forecasts.clone());
        }

        ids.iter()
            .map(|id| {
                self.forecasts
                    .iter()
                    .find(|run| &run.forecast_id == id)
                    .cloned()
                    .ok_or_else(|| {
                        crate::error::ArchiveError::Config(format!(
                            "forecast '{}' is not in the registry",
                            id
                        ))
                    })
            })
            .collect()
    }
}
