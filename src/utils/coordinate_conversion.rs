//! Spherical Mercator tile pyramid math.
//!
//! Pixel space at `level` is a square of `PYRAMID_TILE_SIDE << level` pixels,
//! origin at the north-west corner, x growing east and y growing south.

use std::f64::consts::PI;

use crate::resources::constants::{
    EARTH_RADIUS, MAX_LATITUDE, MAX_LONGITUDE, MIN_LATITUDE, MIN_LONGITUDE, PYRAMID_TILE_SIDE,
};

/// Width and height of the pixel space at `level`
pub fn map_size(level: u8) -> i64 {
    i64::from(PYRAMID_TILE_SIDE) << level
}

/// Metres on the ground covered by one pixel at `lat`
pub fn ground_resolution(lat: f64, level: u8) -> f64 {
    let lat = lat.clamp(MIN_LATITUDE, MAX_LATITUDE);
    (lat * PI / 180.0).cos() * 2.0 * PI * EARTH_RADIUS / map_size(level) as f64
}

/// Scale denominator (1:N) of the map shown at `dpi`
pub fn map_scale(lat: f64, level: u8, dpi: f64) -> f64 {
    ground_resolution(lat, level) * dpi / 0.0254
}

/// Convert latitude/longitude (degrees) to pixel coordinates at `level`.
///
/// Points outside the Mercator band are clipped to its edge.
pub fn pixel_from_lat_lon(lat: f64, lon: f64, level: u8) -> (i64, i64) {
    let lat = lat.clamp(MIN_LATITUDE, MAX_LATITUDE);
    let lon = lon.clamp(MIN_LONGITUDE, MAX_LONGITUDE);

    let x = (lon + 180.0) / 360.0;
    let sin_lat = (lat * PI / 180.0).sin();
    let y = 0.5 - ((1.0 + sin_lat) / (1.0 - sin_lat)).ln() / (4.0 * PI);

    let size = map_size(level);
    let max = (size - 1) as f64;
    let px = (x * size as f64 + 0.5).clamp(0.0, max) as i64;
    let py = (y * size as f64 + 0.5).clamp(0.0, max) as i64;
    (px, py)
}

/// Convert pixel coordinates at `level` to latitude/longitude (degrees)
pub fn lat_lon_from_pixel(px: i64, py: i64, level: u8) -> (f64, f64) {
    let size = map_size(level);
    let x = px.clamp(0, size - 1) as f64 / size as f64 - 0.5;
    let y = 0.5 - py.clamp(0, size - 1) as f64 / size as f64;

    let lat = 90.0 - 360.0 * (-y * 2.0 * PI).exp().atan() / PI;
    let lon = 360.0 * x;
    (lat, lon)
}

/// Index of the tile containing a pixel
pub fn tile_from_pixel(px: i64, py: i64, tile_side: u32) -> (i64, i64) {
    let side = i64::from(tile_side);
    (px.div_euclid(side), py.div_euclid(side))
}

/// Pixel of a tile's north-west corner
pub fn pixel_from_tile(tx: i64, ty: i64, tile_side: u32) -> (i64, i64) {
    let side = i64::from(tile_side);
    (tx * side, ty * side)
}

/// Index of the tile containing a geographic point
pub fn tile_from_lat_lon(lat: f64, lon: f64, level: u8) -> (i64, i64) {
    let (px, py) = pixel_from_lat_lon(lat, lon, level);
    tile_from_pixel(px, py, PYRAMID_TILE_SIDE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_tile() {
        assert_eq!(tile_from_lat_lon(24.988625, 121.313181, 14), (13713, 7016));
    }

    #[test]
    fn test_origin_and_corners() {
        assert_eq!(pixel_from_lat_lon(0.0, 0.0, 0), (128, 128));
        assert_eq!(pixel_from_lat_lon(90.0, -180.0, 3), (0, 0));
        assert_eq!(pixel_from_lat_lon(-90.0, 180.0, 3), (2047, 2047));
    }

    #[test]
    fn test_pixel_round_trip_within_one_pixel() {
        for level in [0u8, 7, 14, 23] {
            let size = map_size(level);
            for (fx, fy) in [(0.1, 0.2), (0.5, 0.5), (0.83, 0.41), (0.999, 0.001)] {
                let px = (size as f64 * fx) as i64;
                let py = (size as f64 * fy) as i64;
                let (lat, lon) = lat_lon_from_pixel(px, py, level);
                let (rx, ry) = pixel_from_lat_lon(lat, lon, level);
                assert!((rx - px).abs() <= 1, "level {} x {} -> {}", level, px, rx);
                assert!((ry - py).abs() <= 1, "level {} y {} -> {}", level, py, ry);
            }
        }
    }

    #[test]
    fn test_tile_index_floors() {
        assert_eq!(tile_from_pixel(255, 256, 256), (0, 1));
        assert_eq!(tile_from_pixel(-1, 0, 256), (-1, 0));
        assert_eq!(pixel_from_tile(3, 4, 256), (768, 1024));
    }

    #[test]
    fn test_ground_resolution_halves_per_level() {
        let coarse = ground_resolution(24.0, 10);
        let fine = ground_resolution(24.0, 11);
        assert!((coarse / fine - 2.0).abs() < 1e-9);
        // About 156 km per pixel at the equator on level 0
        assert!((ground_resolution(0.0, 0) - 156_543.034).abs() < 0.01);
        assert!(map_scale(0.0, 0, 96.0) > 5.0e8);
    }
}
