pub mod directory;
#[cfg(feature = "netcdf")]
pub mod netcdf_reader;

pub use directory::list_directory;
#[cfg(feature = "netcdf")]
pub use netcdf_reader::NetcdfReader;

use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::models::{DispersionDataset, PackedTimestamp};

/// Access to the contents of a dispersion file on disk.
pub trait DispersionReader: Send + Sync {
    /// The file's own creation stamp (`CDATE`, `CTIME`), used as its canonical key.
    fn read_timestamp(&self, path: &Path) -> Result<PackedTimestamp>;

    fn read_dataset(&self, path: &Path) -> Result<DispersionDataset>;

    /// Only the `TFLAG` axis.
    fn read_tflags(&self, path: &Path) -> Result<Vec<PackedTimestamp>> {
        Ok(self.read_dataset(path)?.tflags)
    }
}

/// The reader compiled into this build.
#[cfg(feature = "netcdf")]
pub fn default_reader() -> Result<Arc<dyn DispersionReader>> {
    Ok(Arc::new(NetcdfReader::new()))
}

#[cfg(not(feature = "netcdf"))]
pub fn default_reader() -> Result<Arc<dyn DispersionReader>> {
    Err(crate::error::ArchiveError::Config(
        "built without NetCDF support; enable the `netcdf` feature".to_string(),
    ))
}
