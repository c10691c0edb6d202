use image::RgbaImage;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::resources::constants::{MAGNIFY_DEPTH, MAX_LEVEL};
use crate::tile_system::storage::StoreError;

/// Represents a unique tile ID within one map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    /// Zoom level
    pub level: u8,
    /// Column (x), increasing eastward
    pub col: u32,
    /// Row (y), increasing southward
    pub row: u32,
}

impl TileId {
    /// Create a new tile ID
    pub fn new(level: u8, col: u32, row: u32) -> Self {
        Self { level, col, row }
    }

    /// The tile `depth` levels above this one that covers it
    pub fn ancestor(&self, depth: u8) -> TileId {
        TileId::new(self.level - depth, self.col >> depth, self.row >> depth)
    }

    /// Return the children tiles (one zoom level deeper), `None` if they
    /// can't be addressed
    pub fn children(&self) -> Option<[TileId; 4]> {
        let level = self.level.checked_add(1)?;
        let col = self.col.checked_mul(2)?;
        let row = self.row.checked_mul(2)?;
        let (col1, row1) = (col.checked_add(1)?, row.checked_add(1)?);

        Some([
            TileId::new(level, col, row),
            TileId::new(level, col1, row),
            TileId::new(level, col, row1),
            TileId::new(level, col1, row1),
        ])
    }

    /// Whether column and row lie inside the `2^level` square of this level
    pub fn is_in_pyramid(&self) -> bool {
        let side = 1u64.checked_shl(u32::from(self.level)).unwrap_or(u64::MAX);
        u64::from(self.col) < side && u64::from(self.row) < side
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.level, self.col, self.row)
    }
}

/// Error type for tile-related operations
#[derive(Debug, Error)]
pub enum TileError {
    /// Requested level lies outside the map's pyramid
    #[error("level {level} is out of range [{min}, {max}]")]
    LevelOutOfRange { level: u8, min: u8, max: u8 },
    /// Column or row lies outside the level's `2^level` square
    #[error("tile {level}-{col}-{row} is outside the pyramid")]
    TileOutOfRange { level: u8, col: u32, row: u32 },
    /// The download monitor thread could not be started
    #[error("failed to start download scheduler: {0}")]
    Scheduler(#[source] std::io::Error),
    /// Tile wasn't found (404)
    #[error("tile not found")]
    NotFound,
    /// Failed to download the tile
    #[error("download failed: {0}")]
    Download(String),
    /// Downloaded bytes are not a decodable image
    #[error("failed to decode tile: {0}")]
    Decode(String),
    /// The map descriptor can't back a tile pyramid
    #[error("invalid map descriptor: {0}")]
    InvalidDescriptor(String),
    /// Error in the persistent store
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// A decoded raster tile.
///
/// Clones share the pixel buffer. `approximate` marks placeholders synthesised
/// from neighbouring levels; it lives only in memory and is never persisted.
#[derive(Debug, Clone)]
pub struct TileImage {
    image: Arc<RgbaImage>,
    approximate: bool,
}

impl TileImage {
    /// A downloaded or cached tile
    pub fn authentic(image: RgbaImage) -> Self {
        Self {
            image: Arc::new(image),
            approximate: false,
        }
    }

    /// A synthesised stand-in for a tile that isn't available yet
    pub fn approximate(image: RgbaImage) -> Self {
        Self {
            image: Arc::new(image),
            approximate: true,
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn is_approximate(&self) -> bool {
        self.approximate
    }

    /// Side length in pixels
    pub fn side(&self) -> u32 {
        self.image.width()
    }

    /// Decode raw tile bytes, resampling to `side` if the server sent another size
    pub fn decode(bytes: &[u8], side: u32) -> Result<Self, TileError> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| TileError::Decode(e.to_string()))?
            .to_rgba8();

        let image = if decoded.width() != side || decoded.height() != side {
            image::imageops::resize(&decoded, side, side, image::imageops::FilterType::Triangle)
        } else {
            decoded
        };

        Ok(Self::authentic(image))
    }
}

/// Immutable description of one tiled map.
///
/// Built once and shared read-only (behind an `Arc`) by the facade, the
/// scheduler and the persistent store.
#[derive(Debug, Clone, PartialEq)]
pub struct MapDescriptor {
    /// Numeric identifier of the map
    pub uid: u32,
    /// Identifier used for cache file names
    pub map_id: String,
    /// Human readable title
    pub title: String,
    /// South-west corner as (lon, lat)
    pub lower_corner: (f64, f64),
    /// North-east corner as (lon, lat)
    pub upper_corner: (f64, f64),
    /// Tile URL with `{z}`/`{level}`, `{x}`/`{col}` and `{y}`/`{row}` placeholders
    pub url_template: String,
    pub level_min: u8,
    pub level_max: u8,
    /// Tile side length in pixels
    pub tile_side: u32,
    /// Image format of the tiles, e.g. `jpg` or `png`
    pub tile_format: String,
}

impl MapDescriptor {
    /// Check that the descriptor can back a tile pyramid
    pub fn validate(&self) -> Result<(), TileError> {
        if self.map_id.is_empty() {
            return Err(TileError::InvalidDescriptor("empty map id".to_string()));
        }
        if self.url_template.is_empty() {
            return Err(TileError::InvalidDescriptor("empty url template".to_string()));
        }
        if self.level_min > self.level_max {
            return Err(TileError::InvalidDescriptor(format!(
                "level_min {} is above level_max {}",
                self.level_min, self.level_max
            )));
        }
        if self.level_max > MAX_LEVEL {
            return Err(TileError::InvalidDescriptor(format!(
                "level_max {} exceeds {}",
                self.level_max, MAX_LEVEL
            )));
        }
        let granularity = 1u32 << MAGNIFY_DEPTH;
        if self.tile_side == 0 || self.tile_side % granularity != 0 {
            return Err(TileError::InvalidDescriptor(format!(
                "tile side {} is not a multiple of {}",
                self.tile_side, granularity
            )));
        }
        Ok(())
    }

    pub fn is_supported_level(&self, level: u8) -> bool {
        self.level_min <= level && level <= self.level_max
    }

    /// Reject ids outside the pyramid: bad level, or column/row past `2^level`
    pub fn check_tile(&self, id: TileId) -> Result<(), TileError> {
        self.check_level(id.level)?;
        if id.is_in_pyramid() {
            Ok(())
        } else {
            Err(TileError::TileOutOfRange {
                level: id.level,
                col: id.col,
                row: id.row,
            })
        }
    }

    /// Reject levels outside `[level_min, level_max]`
    pub fn check_level(&self, level: u8) -> Result<(), TileError> {
        if self.is_supported_level(level) {
            Ok(())
        } else {
            Err(TileError::LevelOutOfRange {
                level,
                min: self.level_min,
                max: self.level_max,
            })
        }
    }

    /// Build the URL for a tile
    pub fn tile_url(&self, id: TileId) -> String {
        let level = id.level.to_string();
        let col = id.col.to_string();
        let row = id.row.to_string();

        self.url_template
            .replace("{z}", &level)
            .replace("{level}", &level)
            .replace("{x}", &col)
            .replace("{col}", &col)
            .replace("{y}", &row)
            .replace("{row}", &row)
    }

    /// Location of this map's persistent store under the cache root
    pub fn cache_path(&self, cache_dir: &Path) -> PathBuf {
        cache_dir.join(&self.map_id)
    }

    /// Bounding box as `left,bottom,right,top`
    pub fn bounds_text(&self) -> String {
        let (left, bottom) = self.lower_corner;
        let (right, top) = self.upper_corner;
        format!("{:.6},{:.6},{:.6},{:.6}", left, bottom, right, top)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_ancestor_and_children() {
        let id = TileId::new(14, 13713, 7016);
        assert_eq!(id.ancestor(1), TileId::new(13, 6856, 3508));
        assert_eq!(id.ancestor(3), TileId::new(11, 1714, 877));

        let children = id.children().unwrap();
        assert_eq!(children[0], TileId::new(15, 27426, 14032));
        assert_eq!(children[3], TileId::new(15, 27427, 14033));
        assert!(children.iter().all(|c| c.ancestor(1) == id));

        assert!(TileId::new(14, u32::MAX, 0).children().is_none());
        assert!(TileId::new(14, 0, u32::MAX / 2 + 1).children().is_none());
    }

    #[test]
    fn test_check_tile_bounds() {
        let descriptor = test_descriptor();
        assert!(descriptor.check_tile(TileId::new(10, 1023, 1023)).is_ok());
        assert!(matches!(
            descriptor.check_tile(TileId::new(10, 1024, 0)),
            Err(TileError::TileOutOfRange { level: 10, col: 1024, row: 0 })
        ));
        assert!(matches!(
            descriptor.check_tile(TileId::new(10, 0, u32::MAX)),
            Err(TileError::TileOutOfRange { .. })
        ));
        assert!(matches!(
            descriptor.check_tile(TileId::new(6, 0, 0)),
            Err(TileError::LevelOutOfRange { .. })
        ));
    }

    #[test]
    fn test_scheduler_error_keeps_source() {
        use std::error::Error;
        let err = TileError::Scheduler(std::io::Error::new(std::io::ErrorKind::Other, "no threads"));
        assert_eq!(err.to_string(), "failed to start download scheduler: no threads");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_tile_url_substitutes_both_placeholder_styles() {
        let mut descriptor = test_descriptor();
        assert_eq!(
            descriptor.tile_url(TileId::new(14, 100, 200)),
            "http://tiles.test/14/100/200.png"
        );

        descriptor.url_template = "http://tiles.test/img=MAP-jpg-{level}-{col}-{row}".to_string();
        assert_eq!(
            descriptor.tile_url(TileId::new(9, 1, 2)),
            "http://tiles.test/img=MAP-jpg-9-1-2"
        );
    }

    #[test]
    fn test_check_level() {
        let descriptor = test_descriptor();
        assert!(descriptor.check_level(7).is_ok());
        assert!(descriptor.check_level(16).is_ok());
        assert!(matches!(
            descriptor.check_level(6),
            Err(TileError::LevelOutOfRange { level: 6, min: 7, max: 16 })
        ));
        assert!(matches!(
            descriptor.check_level(17),
            Err(TileError::LevelOutOfRange { level: 17, .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_descriptors() {
        assert!(test_descriptor().validate().is_ok());

        let mut inverted = test_descriptor();
        inverted.level_min = 10;
        inverted.level_max = 9;
        assert!(inverted.validate().is_err());

        let mut odd_side = test_descriptor();
        odd_side.tile_side = 100;
        assert!(odd_side.validate().is_err());

        let mut too_deep = test_descriptor();
        too_deep.level_max = MAX_LEVEL + 1;
        assert!(too_deep.validate().is_err());
    }

    #[test]
    fn test_bounds_text() {
        assert_eq!(
            test_descriptor().bounds_text(),
            "120.000000,21.000000,122.000000,25.000000"
        );
    }

    #[test]
    fn test_decode_resamples_to_tile_side() {
        let bytes = png_bytes(&solid(32, [10, 20, 30, 255]));
        let tile = TileImage::decode(&bytes, 16).unwrap();
        assert_eq!(tile.side(), 16);
        assert!(!tile.is_approximate());
        assert_eq!(tile.image().get_pixel(8, 8).0, [10, 20, 30, 255]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            TileImage::decode(b"TILE_DATA", 16),
            Err(TileError::Decode(_))
        ));
    }
}
