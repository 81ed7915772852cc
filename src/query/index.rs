use chrono::{NaiveDate, NaiveDateTime};
use ndarray::{s, Array2, Array3, ArrayView2, Axis};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{ArchiveError, Result};
use crate::models::{DispersionDataset, GridGeometry};
use crate::query::projection::{project_latitudes, project_longitudes};

/// One precomputed scale of the raster stack.
#[derive(Debug, Clone)]
pub struct ResolutionLevel {
    /// `(time, row, col)`
    pub data: Array3<f32>,
    pub longitudes: Vec<f64>,
    pub latitudes: Vec<f64>,
}

/// Read-only lookup from (time, resolution) to a concentration raster.
///
/// Level 0 is the native grid. Level `k` averages `2^k x 2^k` blocks, ignoring NaN
/// cells; edge blocks may be partial.
#[derive(Debug, Clone)]
pub struct QueryIndex {
    geometry: GridGeometry,
    times: Vec<NaiveDateTime>,
    levels: Vec<ResolutionLevel>,
}

impl QueryIndex {
    pub fn build(datasets: Vec<DispersionDataset>) -> Result<Self> {
        Self::build_with_max_level(datasets, None)
    }

    /// Datasets must share one grid. Where several carry the same timestamp the one
    /// later in the list wins. `max_level` caps the pyramid below its natural height.
    pub fn build_with_max_level(
        datasets: Vec<DispersionDataset>,
        max_level: Option<u32>,
    ) -> Result<Self> {
        let geometry = datasets
            .first()
            .map(|d| d.geometry)
            .ok_or_else(|| ArchiveError::MissingData("no datasets to index".to_string()))?;

        for dataset in &datasets {
            dataset.check_shape()?;
        }

        for dataset in &datasets[1..] {
            if !geometry.same_grid(&dataset.geometry) {
                return Err(ArchiveError::GeometryMismatch(format!(
                    "{}x{} grid at ({}, {}) vs {}x{} grid at ({}, {})",
                    geometry.nrows,
                    geometry.ncols,
                    geometry.xorig,
                    geometry.yorig,
                    dataset.geometry.nrows,
                    dataset.geometry.ncols,
                    dataset.geometry.xorig,
                    dataset.geometry.yorig
                )));
            }
        }

        let mut slots: BTreeMap<NaiveDateTime, (usize, usize)> = BTreeMap::new();
        for (d, dataset) in datasets.iter().enumerate() {
            for (t, tflag) in dataset.tflags.iter().enumerate() {
                slots.insert(tflag.decode()?, (d, t));
            }
        }

        let times: Vec<NaiveDateTime> = slots.keys().copied().collect();
        let mut native = Array3::<f32>::zeros((times.len(), geometry.nrows, geometry.ncols));
        for (i, (d, t)) in slots.values().enumerate() {
            native
                .index_axis_mut(Axis(0), i)
                .assign(&datasets[*d].slice(*t));
        }

        let natural = natural_max_level(geometry.nrows, geometry.ncols);
        let top = max_level.map_or(natural, |cap| cap.min(natural));

        let longitudes = geometry.longitudes();
        let latitudes = geometry.latitudes();
        let mut levels = Vec::with_capacity(top as usize + 1);
        for level in 1..=top {
            let factor = 1usize << level;
            levels.push(ResolutionLevel {
                data: block_mean_stack(native.view(), factor),
                longitudes: block_mean_axis(&longitudes, factor),
                latitudes: block_mean_axis(&latitudes, factor),
            });
        }
        levels.insert(
            0,
            ResolutionLevel {
                data: native,
                longitudes,
                latitudes,
            },
        );

        debug!(
            timesteps = times.len(),
            levels = levels.len(),
            rows = geometry.nrows,
            cols = geometry.ncols,
            "Built query index"
        );

        Ok(Self {
            geometry,
            times,
            levels,
        })
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    /// Sorted, without duplicates.
    pub fn times(&self) -> &[NaiveDateTime] {
        &self.times
    }

    pub fn max_resolution(&self) -> u32 {
        (self.levels.len() - 1) as u32
    }

    pub fn time_range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        Some((*self.times.first()?, *self.times.last()?))
    }

    pub fn date_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.time_range().map(|(a, b)| (a.date(), b.date()))
    }

    pub fn contains(&self, timestamp: &NaiveDateTime) -> bool {
        self.times.binary_search(timestamp).is_ok()
    }

    fn level(&self, resolution: u32) -> Result<&ResolutionLevel> {
        self.levels
            .get(resolution as usize)
            .ok_or(ArchiveError::ResolutionOutOfRange {
                requested: resolution,
                max: self.max_resolution(),
            })
    }

    /// `(longitudes, latitudes)` of the cells at a resolution level.
    pub fn coordinates(&self, resolution: u32) -> Result<(&[f64], &[f64])> {
        let level = self.level(resolution)?;
        Ok((&level.longitudes, &level.latitudes))
    }

    /// Cell coordinates projected to Web Mercator metres, `(xs, ys)`.
    pub fn mercator_coordinates(&self, resolution: u32) -> Result<(Vec<f64>, Vec<f64>)> {
        let (lons, lats) = self.coordinates(resolution)?;
        Ok((project_longitudes(lons), project_latitudes(lats)))
    }

    /// The raster for `hour` o'clock on `date`. Only exact timestamps match.
    pub fn query(&self, date: NaiveDate, hour: u32, resolution: u32) -> Result<ArrayView2<'_, f32>> {
        let timestamp = date.and_hms_opt(hour, 0, 0).ok_or_else(|| ArchiveError::InvalidDate {
            message: format!("hour {} is outside 0-23", hour),
        })?;
        self.query_at(timestamp, resolution)
    }

    pub fn query_at(&self, timestamp: NaiveDateTime, resolution: u32) -> Result<ArrayView2<'_, f32>> {
        let level = self.level(resolution)?;
        let t = self
            .times
            .binary_search(&timestamp)
            .map_err(|_| ArchiveError::NoDataForTimestamp { timestamp })?;
        Ok(level.data.index_axis(Axis(0), t))
    }
}

/// Index over a single dataset.
pub fn build_index(dataset: DispersionDataset) -> Result<QueryIndex> {
    QueryIndex::build(vec![dataset])
}

pub fn query(
    index: &QueryIndex,
    date: NaiveDate,
    hour: u32,
    resolution: u32,
) -> Result<ArrayView2<'_, f32>> {
    index.query(date, hour, resolution)
}

/// Largest `k` with `min(nrows, ncols) >> k >= 1`.
pub fn natural_max_level(nrows: usize, ncols: usize) -> u32 {
    let smallest = nrows.min(ncols);
    if smallest == 0 {
        0
    } else {
        smallest.ilog2()
    }
}

/// Mean of each `factor x factor` block, skipping NaN cells.
pub fn block_mean(grid: ArrayView2<'_, f32>, factor: usize) -> Array2<f32> {
    let (rows, cols) = grid.dim();
    let out_rows = rows.div_ceil(factor);
    let out_cols = cols.div_ceil(factor);

    Array2::from_shape_fn((out_rows, out_cols), |(r, c)| {
        let block = grid.slice(s![
            r * factor..((r + 1) * factor).min(rows),
            c * factor..((c + 1) * factor).min(cols)
        ]);
        let (sum, count) = block
            .iter()
            .filter(|v| !v.is_nan())
            .fold((0.0f64, 0usize), |(sum, count), v| (sum + *v as f64, count + 1));
        if count == 0 {
            f32::NAN
        } else {
            (sum / count as f64) as f32
        }
    })
}

fn block_mean_stack(stack: ndarray::ArrayView3<'_, f32>, factor: usize) -> Array3<f32> {
    let (times, rows, cols) = stack.dim();
    let mut out = Array3::<f32>::zeros((times, rows.div_ceil(factor), cols.div_ceil(factor)));
    for (t, grid) in stack.axis_iter(Axis(0)).enumerate() {
        out.index_axis_mut(Axis(0), t)
            .assign(&block_mean(grid, factor));
    }
    out
}

pub fn block_mean_axis(axis: &[f64], factor: usize) -> Vec<f64> {
    axis.chunks(factor)
        .map(|chunk| chunk.iter().sum::<f64>() / chunk.len() as f64)
        .collect()
}
