//! An immutable geographic location.
//!
//! A point is built from one representation and normalised on construction to
//! a pixel pair at [`MAX_LEVEL`]. Pixel queries at coarser levels are right
//! shifts of that pair, so they agree exactly across levels. Geographic and
//! projected representations are derived on first use and memoised.

use std::sync::OnceLock;
use thiserror::Error;

use crate::resources::constants::MAX_LEVEL;
use crate::utils::coordinate_conversion::{
    lat_lon_from_pixel, map_size, pixel_from_lat_lon, tile_from_pixel,
};
use crate::utils::projection::{
    twd67_tm2_to_twd97_lat_lon, twd97_lat_lon_to_twd67_tm2, twd97_lat_lon_to_twd97_tm2,
    twd97_tm2_to_twd97_lat_lon,
};

#[derive(Debug, Error, PartialEq)]
pub enum GeoError {
    #[error("invalid geo point construction: {0}")]
    InvalidConstruction(String),
}

/// The representation a point was built from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeoInput {
    LatLon { lat: f64, lon: f64 },
    Pixel { px: i64, py: i64, level: u8 },
    Twd67Tm2 { x: f64, y: f64 },
    Twd97Tm2 { x: f64, y: f64 },
}

#[derive(Debug, Clone)]
pub struct GeoPoint {
    /// Pixel pair at MAX_LEVEL
    px: i64,
    py: i64,
    lat_lon: OnceLock<(f64, f64)>,
    twd67: OnceLock<(f64, f64)>,
    twd97: OnceLock<(f64, f64)>,
}

impl GeoPoint {
    pub fn new(input: GeoInput) -> Result<Self, GeoError> {
        let lat_lon = OnceLock::new();
        let twd67 = OnceLock::new();
        let twd97 = OnceLock::new();

        let (px, py) = match input {
            GeoInput::LatLon { lat, lon } => {
                check_finite(&[lat, lon])?;
                let _ = lat_lon.set((lat, lon));
                pixel_from_lat_lon(lat, lon, MAX_LEVEL)
            }
            GeoInput::Pixel { px, py, level } => {
                if level > MAX_LEVEL {
                    return Err(GeoError::InvalidConstruction(format!(
                        "level {} exceeds {}",
                        level, MAX_LEVEL
                    )));
                }
                let size = map_size(level);
                if !(0..size).contains(&px) || !(0..size).contains(&py) {
                    return Err(GeoError::InvalidConstruction(format!(
                        "pixel ({}, {}) outside level {}",
                        px, py, level
                    )));
                }
                let shift = MAX_LEVEL - level;
                (px << shift, py << shift)
            }
            GeoInput::Twd67Tm2 { x, y } => {
                check_finite(&[x, y])?;
                let _ = twd67.set((x, y));
                let (lat, lon) = twd67_tm2_to_twd97_lat_lon(x, y);
                let _ = lat_lon.set((lat, lon));
                pixel_from_lat_lon(lat, lon, MAX_LEVEL)
            }
            GeoInput::Twd97Tm2 { x, y } => {
                check_finite(&[x, y])?;
                let _ = twd97.set((x, y));
                let (lat, lon) = twd97_tm2_to_twd97_lat_lon(x, y);
                let _ = lat_lon.set((lat, lon));
                pixel_from_lat_lon(lat, lon, MAX_LEVEL)
            }
        };

        Ok(Self {
            px,
            py,
            lat_lon,
            twd67,
            twd97,
        })
    }

    pub fn from_lat_lon(lat: f64, lon: f64) -> Result<Self, GeoError> {
        Self::new(GeoInput::LatLon { lat, lon })
    }

    pub fn from_pixel(px: i64, py: i64, level: u8) -> Result<Self, GeoError> {
        Self::new(GeoInput::Pixel { px, py, level })
    }

    pub fn from_twd67_tm2(x: f64, y: f64) -> Result<Self, GeoError> {
        Self::new(GeoInput::Twd67Tm2 { x, y })
    }

    pub fn from_twd97_tm2(x: f64, y: f64) -> Result<Self, GeoError> {
        Self::new(GeoInput::Twd97Tm2 { x, y })
    }

    pub fn builder() -> GeoPointBuilder {
        GeoPointBuilder::default()
    }

    /// Latitude/longitude in degrees (WGS84 / TWD97)
    pub fn lat_lon(&self) -> (f64, f64) {
        *self
            .lat_lon
            .get_or_init(|| lat_lon_from_pixel(self.px, self.py, MAX_LEVEL))
    }

    pub fn lat(&self) -> f64 {
        self.lat_lon().0
    }

    pub fn lon(&self) -> f64 {
        self.lat_lon().1
    }

    /// Pixel coordinates at `level`; levels past MAX_LEVEL are treated as MAX_LEVEL
    pub fn pixel_at(&self, level: u8) -> (i64, i64) {
        let shift = MAX_LEVEL - level.min(MAX_LEVEL);
        (self.px >> shift, self.py >> shift)
    }

    /// Index of the tile holding this point at `level`
    pub fn tile_at(&self, level: u8, tile_side: u32) -> (i64, i64) {
        let (px, py) = self.pixel_at(level);
        tile_from_pixel(px, py, tile_side)
    }

    /// Signed pixel deltas `self - other` at `level`
    pub fn distance_pixels(&self, other: &GeoPoint, level: u8) -> (i64, i64) {
        let (x, y) = self.pixel_at(level);
        let (ox, oy) = other.pixel_at(level);
        (x - ox, y - oy)
    }

    /// A new point moved by pixel deltas at `level`
    pub fn offset_pixels(&self, dx: i64, dy: i64, level: u8) -> Result<GeoPoint, GeoError> {
        let level = level.min(MAX_LEVEL);
        let (px, py) = self.pixel_at(level);
        Self::from_pixel(px + dx, py + dy, level)
    }

    /// TWD97 TM2 grid coordinates in metres
    pub fn twd97_tm2(&self) -> (f64, f64) {
        *self.twd97.get_or_init(|| {
            let (lat, lon) = self.lat_lon();
            twd97_lat_lon_to_twd97_tm2(lat, lon)
        })
    }

    /// TWD67 TM2 grid coordinates in metres
    pub fn twd67_tm2(&self) -> (f64, f64) {
        *self.twd67.get_or_init(|| {
            let (lat, lon) = self.lat_lon();
            twd97_lat_lon_to_twd67_tm2(lat, lon)
        })
    }
}

impl PartialEq for GeoPoint {
    fn eq(&self, other: &Self) -> bool {
        self.px == other.px && self.py == other.py
    }
}

impl Eq for GeoPoint {}

fn check_finite(values: &[f64]) -> Result<(), GeoError> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(GeoError::InvalidConstruction(
            "coordinates must be finite".to_string(),
        ))
    }
}

/// Builds a point from whichever fields are at hand.
///
/// The first complete pair wins, in the order lat/lon, pixel + level, TWD67,
/// TWD97.
#[derive(Debug, Default, Clone)]
pub struct GeoPointBuilder {
    lat: Option<f64>,
    lon: Option<f64>,
    px: Option<i64>,
    py: Option<i64>,
    level: Option<u8>,
    twd67: (Option<f64>, Option<f64>),
    twd97: (Option<f64>, Option<f64>),
}

impl GeoPointBuilder {
    pub fn lat(mut self, lat: f64) -> Self {
        self.lat = Some(lat);
        self
    }

    pub fn lon(mut self, lon: f64) -> Self {
        self.lon = Some(lon);
        self
    }

    pub fn px(mut self, px: i64) -> Self {
        self.px = Some(px);
        self
    }

    pub fn py(mut self, py: i64) -> Self {
        self.py = Some(py);
        self
    }

    pub fn level(mut self, level: u8) -> Self {
        self.level = Some(level);
        self
    }

    pub fn twd67_x(mut self, x: f64) -> Self {
        self.twd67.0 = Some(x);
        self
    }

    pub fn twd67_y(mut self, y: f64) -> Self {
        self.twd67.1 = Some(y);
        self
    }

    pub fn twd97_x(mut self, x: f64) -> Self {
        self.twd97.0 = Some(x);
        self
    }

    pub fn twd97_y(mut self, y: f64) -> Self {
        self.twd97.1 = Some(y);
        self
    }

    pub fn build(self) -> Result<GeoPoint, GeoError> {
        let input = if let (Some(lat), Some(lon)) = (self.lat, self.lon) {
            GeoInput::LatLon { lat, lon }
        } else if let (Some(px), Some(py), Some(level)) = (self.px, self.py, self.level) {
            GeoInput::Pixel { px, py, level }
        } else if let (Some(x), Some(y)) = self.twd67 {
            GeoInput::Twd67Tm2 { x, y }
        } else if let (Some(x), Some(y)) = self.twd97 {
            GeoInput::Twd97Tm2 { x, y }
        } else {
            return Err(GeoError::InvalidConstruction(
                "no complete coordinate pair supplied".to_string(),
            ));
        };
        GeoPoint::new(input)
    }
}
