use memmap2::Mmap;
use ndarray::{Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

use crate::error::{ArchiveError, Result};
use crate::models::PackedTimestamp;

const GEOMETRY_TOLERANCE: f64 = 1e-9;

/// Grid geometry attributes (`XORIG`, `YORIG`, `XCELL`, `YCELL`, `NCOLS`, `NROWS`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    pub xorig: f64,
    pub yorig: f64,
    pub xcell: f64,
    pub ycell: f64,
    pub ncols: usize,
    pub nrows: usize,
}

impl GridGeometry {
    pub fn longitudes(&self) -> Vec<f64> {
        linspace(
            self.xorig,
            self.xorig + self.xcell * (self.ncols as f64 - 1.0),
            self.ncols,
        )
    }

    pub fn latitudes(&self) -> Vec<f64> {
        linspace(
            self.yorig,
            self.yorig + self.ycell * (self.nrows as f64 - 1.0),
            self.nrows,
        )
    }

    /// `[min_lon, max_lon, min_lat, max_lat]` of the cell centres.
    pub fn extent(&self) -> [f64; 4] {
        let x_end = self.xorig + self.xcell * (self.ncols as f64 - 1.0);
        let y_end = self.yorig + self.ycell * (self.nrows as f64 - 1.0);
        [
            self.xorig.min(x_end),
            self.xorig.max(x_end),
            self.yorig.min(y_end),
            self.yorig.max(y_end),
        ]
    }

    pub fn same_grid(&self, other: &GridGeometry) -> bool {
        self.ncols == other.ncols
            && self.nrows == other.nrows
            && (self.xorig - other.xorig).abs() < GEOMETRY_TOLERANCE
            && (self.yorig - other.yorig).abs() < GEOMETRY_TOLERANCE
            && (self.xcell - other.xcell).abs() < GEOMETRY_TOLERANCE
            && (self.ycell - other.ycell).abs() < GEOMETRY_TOLERANCE
    }

    pub fn validate(&self) -> Result<()> {
        if self.ncols == 0 || self.nrows == 0 {
            return Err(ArchiveError::InvalidFormat(format!(
                "grid has {} rows and {} columns",
                self.nrows, self.ncols
            )));
        }
        if !(self.xcell.is_finite() && self.ycell.is_finite())
            || self.xcell == 0.0
            || self.ycell == 0.0
        {
            return Err(ArchiveError::InvalidFormat(format!(
                "invalid cell size {} x {}",
                self.xcell, self.ycell
            )));
        }
        Ok(())
    }
}

/// Evenly spaced values over the closed interval `[start, end]`.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

/// The gridded contents of one dispersion file.
///
/// `pm25` is laid out `(TSTEP, ROW, COL)`; the single model layer is squeezed out
/// on read. `tflags[t]` is the embedded timestamp of timestep `t`.
#[derive(Debug, Clone)]
pub struct DispersionDataset {
    pub geometry: GridGeometry,
    pub tflags: Vec<PackedTimestamp>,
    pub pm25: Array3<f32>,
}

impl DispersionDataset {
    pub fn new(
        geometry: GridGeometry,
        tflags: Vec<PackedTimestamp>,
        pm25: Array3<f32>,
    ) -> Result<Self> {
        geometry.validate()?;

        let dataset = Self {
            geometry,
            tflags,
            pm25,
        };
        dataset.check_shape()?;
        Ok(dataset)
    }

    /// PM25 must be `(TFLAG count, NROWS, NCOLS)`.
    pub fn check_shape(&self) -> Result<()> {
        let expected = (self.tflags.len(), self.geometry.nrows, self.geometry.ncols);
        if self.pm25.dim() != expected {
            return Err(ArchiveError::InvalidFormat(format!(
                "PM25 has shape {:?}, expected {:?} from TFLAG and grid attributes",
                self.pm25.dim(),
                expected
            )));
        }
        Ok(())
    }

    pub fn timesteps(&self) -> usize {
        self.tflags.len()
    }

    pub fn slice(&self, tstep: usize) -> ArrayView2<'_, f32> {
        self.pm25.index_axis(Axis(0), tstep)
    }
}

/// Cheap content identity used to tell identical downloads from different ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub len: u64,
    pub crc32: u32,
}

impl Fingerprint {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            len: bytes.len() as u64,
            crc32: crc32fast::hash(bytes),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(Self::from_bytes(&[]));
        }

        // SAFETY: archive files are immutable once written
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self::from_bytes(&mmap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn geometry() -> GridGeometry {
        GridGeometry {
            xorig: -160.0,
            yorig: 32.0,
            xcell: 0.1,
            ycell: 0.1,
            ncols: 1041,
            nrows: 381,
        }
    }

    #[test]
    fn test_axes_from_geometry() {
        let g = geometry();
        let lons = g.longitudes();
        let lats = g.latitudes();

        assert_eq!(lons.len(), 1041);
        assert_eq!(lats.len(), 381);
        assert_eq!(lons[0], -160.0);
        assert!((lons[1040] - (-56.0)).abs() < 1e-9);
        assert!((lats[380] - 70.0).abs() < 1e-9);
        assert!((lons[1] - lons[0] - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_linspace_edges() {
        assert!(linspace(0.0, 1.0, 0).is_empty());
        assert_eq!(linspace(5.0, 9.0, 1), vec![5.0]);
        assert_eq!(linspace(0.0, 1.0, 5), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_extent_and_grid_comparison() {
        let g = geometry();
        let [min_lon, max_lon, min_lat, max_lat] = g.extent();
        assert_eq!(min_lon, -160.0);
        assert!((max_lon + 56.0).abs() < 1e-9);
        assert_eq!(min_lat, 32.0);
        assert!((max_lat - 70.0).abs() < 1e-9);

        let wider = GridGeometry { ncols: 1081, ..g };
        assert!(g.same_grid(&g));
        assert!(!g.same_grid(&wider));
    }

    #[test]
    fn test_dataset_shape_checked() {
        let g = GridGeometry {
            ncols: 3,
            nrows: 2,
            ..geometry()
        };
        let tflags = vec![PackedTimestamp::new(2021059, 10000).unwrap()];

        assert!(DispersionDataset::new(g, tflags.clone(), Array3::zeros((1, 2, 3))).is_ok());
        assert!(DispersionDataset::new(g, tflags, Array3::zeros((1, 3, 2))).is_err());
    }

    #[test]
    fn test_fingerprint_from_path_matches_bytes() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"CDF\x01 payload").unwrap();
        file.flush().unwrap();

        let from_path = Fingerprint::from_path(file.path()).unwrap();
        assert_eq!(from_path, Fingerprint::from_bytes(b"CDF\x01 payload"));
        assert_ne!(from_path, Fingerprint::from_bytes(b"CDF\x01 payloaD"));

        let empty = NamedTempFile::new().unwrap();
        assert_eq!(Fingerprint::from_path(empty.path()).unwrap().len, 0);
    }
}
