/// Remote source
pub const DEFAULT_BASE_URL: &str = "https://firesmoke.ca/forecasts";
pub const REMOTE_FILE_NAME: &str = "dispersion.nc";
pub const CURRENT_ALIAS: &str = "current";
pub const EXPECTED_CONTENT_TYPE: &str = "application/octet-stream";

/// Directory layout
pub const DEFAULT_DATA_ROOT: &str = "data";
pub const DEFAULT_ARCHIVE_DIR: &str = "data/archive";
pub const DEFAULT_STAGING_DIR: &str = "data/staging";
pub const DEFAULT_CONFIG_FILE: &str = "firesmoke.toml";
pub const ENV_PREFIX: &str = "FIRESMOKE";

/// Fetch defaults
pub const DEFAULT_MAX_CONCURRENT: usize = 4;
pub const MAX_CONCURRENT_LIMIT: usize = 64;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 600;

/// Dashboard defaults
pub const DEFAULT_PLAYBACK_INTERVAL_MS: u64 = 500;
pub const HOURS_PER_DAY: u32 = 24;

/// Rendering
pub const FRAME_FILE_PREFIX: &str = "frames";
pub const FRAME_NUMBER_WIDTH: usize = 6;
/// Fallback colour range (µg/m³) when a slice has no positive values.
pub const DEFAULT_MIN_CONCENTRATION: f32 = 0.1;
pub const DEFAULT_MAX_CONCENTRATION: f32 = 1000.0;

/// Web Mercator (EPSG:3857)
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;
pub const MAX_MERCATOR_LATITUDE: f64 = 85.051_128_779_806_59;
