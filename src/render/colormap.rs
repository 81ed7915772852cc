use image::{Rgba, RgbaImage};
use ndarray::ArrayView2;

use crate::utils::constants::{DEFAULT_MAX_CONCENTRATION, DEFAULT_MIN_CONCENTRATION};

/// Base-10 logarithmic mapping of concentrations onto `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogScale {
    pub min: f32,
    pub max: f32,
}

impl LogScale {
    /// Falls back to the default range when `min`/`max` are not a usable positive
    /// interval.
    pub fn new(min: f32, max: f32) -> Self {
        if min > 0.0 && max > min && max.is_finite() {
            Self { min, max }
        } else {
            Self::default()
        }
    }

    /// Range of the positive, finite values of `data`.
    pub fn from_values(data: ArrayView2<'_, f32>) -> Self {
        let (min, max) = data
            .iter()
            .filter(|v| v.is_finite() && **v > 0.0)
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(*v), hi.max(*v))
            });

        if min.is_finite() && max > min {
            Self { min, max }
        } else if min.is_finite() {
            // uniform field: open a decade around it
            Self {
                min: min / 10.0,
                max: min * 10.0,
            }
        } else {
            Self::default()
        }
    }

    /// `None` for values that are not drawn (non-positive or NaN).
    pub fn normalize(&self, value: f32) -> Option<f32> {
        if !(value.is_finite() && value > 0.0) {
            return None;
        }
        let (lo, hi) = (self.min.log10(), self.max.log10());
        Some(((value.log10() - lo) / (hi - lo)).clamp(0.0, 1.0))
    }
}

impl Default for LogScale {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_CONCENTRATION,
            max: DEFAULT_MAX_CONCENTRATION,
        }
    }
}

/// The "hot" ramp: black through red and yellow to white.
pub fn hot(t: f32) -> [u8; 3] {
    let t = t.clamp(0.0, 1.0);
    let channel = |start: f32, end: f32| -> u8 {
        (((t - start) / (end - start)).clamp(0.0, 1.0) * 255.0).round() as u8
    };
    [
        channel(0.0, 0.365_079),
        channel(0.365_079, 0.746_032),
        channel(0.746_032, 1.0),
    ]
}

/// Colour a `(row, col)` raster. Row 0 is the southern edge, so it becomes the
/// bottom line of the image.
pub fn render_raster(data: ArrayView2<'_, f32>, scale: &LogScale) -> RgbaImage {
    let (rows, cols) = data.dim();
    RgbaImage::from_fn(cols as u32, rows as u32, |x, y| {
        let value = data[[rows - 1 - y as usize, x as usize]];
        match scale.normalize(value) {
            Some(t) => {
                let [r, g, b] = hot(t);
                Rgba([r, g, b, 255])
            }
            None => Rgba([0, 0, 0, 0]),
        }
    })
}
