//! BlueSky/IOAPI dispersion files read through the native netcdf library.
//!
//! Layout relied on:
//! - global attributes `CDATE`, `CTIME` (creation stamp) and the grid attributes
//!   `XORIG`, `YORIG`, `XCELL`, `YCELL`, `NCOLS`, `NROWS`
//! - `TFLAG(TSTEP, VAR, DATE-TIME)` as `int`
//! - `PM25(TSTEP, LAY, ROW, COL)` as `float`; only the ground layer is kept

use ndarray::Array3;
use std::path::Path;
use tracing::debug;

use crate::error::{ArchiveError, Result};
use crate::models::{DispersionDataset, GridGeometry, PackedTimestamp};
use crate::readers::DispersionReader;

pub const PM25_VARIABLE: &str = "PM25";
pub const TFLAG_VARIABLE: &str = "TFLAG";

#[derive(Debug, Clone, Copy, Default)]
pub struct NetcdfReader;

impl NetcdfReader {
    pub fn new() -> Self {
        Self
    }

    fn open(path: &Path) -> Result<netcdf::File> {
        netcdf::open(path).map_err(|e| {
            ArchiveError::NetCdf(format!("Failed to open {}: {}", path.display(), e))
        })
    }
}

impl DispersionReader for NetcdfReader {
    fn read_timestamp(&self, path: &Path) -> Result<PackedTimestamp> {
        let file = Self::open(path)?;
        let cdate = i32_attr(&file, "CDATE")?;
        let ctime = i32_attr(&file, "CTIME")?;
        PackedTimestamp::new(cdate, ctime)
    }

    fn read_tflags(&self, path: &Path) -> Result<Vec<PackedTimestamp>> {
        let file = Self::open(path)?;
        read_tflags(&file)
    }

    fn read_dataset(&self, path: &Path) -> Result<DispersionDataset> {
        let file = Self::open(path)?;

        let geometry = GridGeometry {
            xorig: f64_attr(&file, "XORIG")?,
            yorig: f64_attr(&file, "YORIG")?,
            xcell: f64_attr(&file, "XCELL")?,
            ycell: f64_attr(&file, "YCELL")?,
            ncols: usize_attr(&file, "NCOLS")?,
            nrows: usize_attr(&file, "NROWS")?,
        };

        let tflags = read_tflags(&file)?;

        let pm25 = file
            .variable(PM25_VARIABLE)
            .ok_or_else(|| ArchiveError::MissingData(format!("{} variable", PM25_VARIABLE)))?;
        let dims: Vec<usize> = pm25.dimensions().iter().map(|d| d.len()).collect();
        if dims.len() != 4 {
            return Err(ArchiveError::InvalidFormat(format!(
                "{} has {} dimensions, expected (TSTEP, LAY, ROW, COL)",
                PM25_VARIABLE,
                dims.len()
            )));
        }
        let (tsteps, layers, rows, cols) = (dims[0], dims[1], dims[2], dims[3]);

        let values: Vec<f32> = pm25.get_values(..)?;
        let ground = ground_layer(&values, (tsteps, layers, rows, cols))?;

        debug!(
            path = %path.display(),
            tsteps, layers, rows, cols,
            "Read dispersion dataset"
        );

        DispersionDataset::new(
            geometry,
            tflags,
            Array3::from_shape_vec((tsteps, rows, cols), ground)?,
        )
    }
}

/// Keep layer 0 of a `(TSTEP, LAY, ROW, COL)` buffer.
fn ground_layer(values: &[f32], dims: (usize, usize, usize, usize)) -> Result<Vec<f32>> {
    let (tsteps, layers, rows, cols) = dims;
    if layers == 0 {
        return Err(ArchiveError::InvalidFormat(format!(
            "{} has no vertical layers",
            PM25_VARIABLE
        )));
    }
    let layer_len = rows * cols;
    if values.len() != tsteps * layers * layer_len {
        return Err(ArchiveError::InvalidFormat(format!(
            "{} holds {} values, expected {} for shape {:?}",
            PM25_VARIABLE,
            values.len(),
            tsteps * layers * layer_len,
            dims
        )));
    }

    let mut ground = Vec::with_capacity(tsteps * layer_len);
    for t in 0..tsteps {
        let start = t * layers * layer_len;
        ground.extend_from_slice(&values[start..start + layer_len]);
    }
    Ok(ground)
}

fn read_tflags(file: &netcdf::File) -> Result<Vec<PackedTimestamp>> {
    let tflag = file
        .variable(TFLAG_VARIABLE)
        .ok_or_else(|| ArchiveError::MissingData(format!("{} variable", TFLAG_VARIABLE)))?;
    let dims: Vec<usize> = tflag.dimensions().iter().map(|d| d.len()).collect();
    if dims.len() != 3 || dims[2] != 2 {
        return Err(ArchiveError::InvalidFormat(format!(
            "{} has shape {:?}, expected (TSTEP, VAR, 2)",
            TFLAG_VARIABLE, dims
        )));
    }

    let values: Vec<i32> = tflag.get_values(..)?;
    let stride = dims[1] * 2;

    // every variable carries the same stamp; the first one is authoritative
    (0..dims[0])
        .map(|t| PackedTimestamp::new(values[t * stride], values[t * stride + 1]))
        .collect()
}

fn global_attr(file: &netcdf::File, name: &str) -> Result<netcdf::AttributeValue> {
    let attr = file
        .attribute(name)
        .ok_or_else(|| ArchiveError::MissingData(format!("global attribute {}", name)))?;
    Ok(attr.value()?)
}

fn f64_attr(file: &netcdf::File, name: &str) -> Result<f64> {
    Ok(f64::try_from(global_attr(file, name)?)?)
}

fn i32_attr(file: &netcdf::File, name: &str) -> Result<i32> {
    Ok(i32::try_from(global_attr(file, name)?)?)
}

fn usize_attr(file: &netcdf::File, name: &str) -> Result<usize> {
    let value = i32_attr(file, name)?;
    usize::try_from(value)
        .map_err(|_| ArchiveError::InvalidFormat(format!("{} is negative: {}", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ground_layer_keeps_first_layer_of_each_step() -> Result<()> {
        // 2 steps, 2 layers, 1x2 grid
        let values = [1.0, 2.0, 9.0, 9.0, 3.0, 4.0, 9.0, 9.0];
        assert_eq!(ground_layer(&values, (2, 2, 1, 2))?, vec![1.0, 2.0, 3.0, 4.0]);
        Ok(())
    }

    #[test]
    fn test_ground_layer_rejects_empty_layer_axis() {
        let result = ground_layer(&[], (3, 0, 2, 2));
        assert!(matches!(result, Err(ArchiveError::InvalidFormat(_))));

        let result = ground_layer(&[1.0, 2.0], (1, 1, 2, 2));
        assert!(matches!(result, Err(ArchiveError::InvalidFormat(_))));
    }
}
