//! WGS84 (EPSG:4326) to Web Mercator (EPSG:3857).

use crate::utils::constants::{EARTH_RADIUS_M, MAX_MERCATOR_LATITUDE};

/// `(lat, lon)` in degrees to `(x, y)` in metres. Latitudes beyond the Mercator
/// limit are clamped to it.
pub fn to_web_mercator(lat: f64, lon: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE);
    let x = EARTH_RADIUS_M * lon.to_radians();
    let y = EARTH_RADIUS_M * lat.to_radians().tan().asinh();
    (x, y)
}

/// Inverse of [`to_web_mercator`]: `(x, y)` in metres to `(lat, lon)` in degrees.
pub fn from_web_mercator(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS_M).to_degrees();
    let lat = (y / EARTH_RADIUS_M).sinh().atan().to_degrees();
    (lat, lon)
}

pub fn project_longitudes(longitudes: &[f64]) -> Vec<f64> {
    longitudes.iter().map(|lon| to_web_mercator(0.0, *lon).0).collect()
}

pub fn project_latitudes(latitudes: &[f64]) -> Vec<f64> {
    latitudes.iter().map(|lat| to_web_mercator(*lat, 0.0).1).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HALF_WORLD: f64 = 20_037_508.342_789_244;

    #[test]
    fn test_known_points() {
        let (x, y) = to_web_mercator(0.0, 0.0);
        assert!(x.abs() < 1e-9 && y.abs() < 1e-9);

        let (x, _) = to_web_mercator(0.0, 180.0);
        assert!((x - HALF_WORLD).abs() < 1e-6);

        let (_, y) = to_web_mercator(MAX_MERCATOR_LATITUDE, 0.0);
        assert!((y - HALF_WORLD).abs() < 1e-3);

        // Vancouver
        let (x, y) = to_web_mercator(49.2827, -123.1207);
        assert!((x - (-13_705_733.63)).abs() < 1.0);
        assert!((y - 6_322_966.52).abs() < 1.0);
    }

    #[test]
    fn test_round_trip_and_clamping() {
        for (lat, lon) in [(32.0, -160.0), (70.0, -52.0), (-33.9, 151.2)] {
            let (x, y) = to_web_mercator(lat, lon);
            let (lat2, lon2) = from_web_mercator(x, y);
            assert!((lat - lat2).abs() < 1e-9);
            assert!((lon - lon2).abs() < 1e-9);
        }

        assert_eq!(to_web_mercator(90.0, 0.0), to_web_mercator(MAX_MERCATOR_LATITUDE, 0.0));
    }
}
