pub mod dispersion;
pub mod forecast;
pub mod timestamp;

pub use dispersion::{linspace, DispersionDataset, Fingerprint, GridGeometry};
pub use forecast::{default_registry, ForecastRun};
pub use timestamp::{decode, encode, PackedTimestamp};
