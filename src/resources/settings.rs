use std::path::PathBuf;
use std::time::Duration;

use crate::resources::constants::{
    DEFAULT_USER_AGENT, DOWNLOAD_TIMEOUT, MAX_WORKERS, PYRAMID_TILE_SIDE, STORE_READ_TIMEOUT,
};
use crate::tile_system::types::MapDescriptor;

/// Where downloaded tiles are kept on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    /// One MBTiles-style SQLite file per map
    #[default]
    Sqlite,
    /// One file per tile in a directory tree
    Files,
}

/// Settings for a [`crate::tile_system::TileMap`]
#[derive(Debug, Clone, PartialEq)]
pub struct TileMapSettings {
    /// Root directory for persistent stores
    pub cache_dir: PathBuf,
    pub storage: StorageBackend,
    /// Maximum concurrent downloads
    pub max_workers: usize,
    pub download_timeout: Duration,
    pub user_agent: String,
    /// How long a store read may wait on the storage thread
    pub store_read_timeout: Duration,
}

impl Default for TileMapSettings {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./cache"),
            storage: StorageBackend::default(),
            max_workers: MAX_WORKERS,
            download_timeout: DOWNLOAD_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            store_read_timeout: STORE_READ_TIMEOUT,
        }
    }
}

impl TileMapSettings {
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    pub fn with_storage(mut self, storage: StorageBackend) -> Self {
        self.storage = storage;
        self
    }
}

// Taiwan 1:25,000 topographic maps
const TM25K_LOWER_CORNER: (f64, f64) = (117.84953432, 21.65607265);
const TM25K_UPPER_CORNER: (f64, f64) = (123.85924109, 25.64233621);

fn tm25k(uid: u32, edition: &str, level_min: u8, level_max: u8) -> MapDescriptor {
    MapDescriptor {
        uid,
        map_id: format!("TM25K_{}", edition),
        title: format!("Taiwan 1:25,000 topographic map ({})", edition),
        lower_corner: TM25K_LOWER_CORNER,
        upper_corner: TM25K_UPPER_CORNER,
        url_template: format!(
            "http://gis.sinica.edu.tw/tileserver/file-exists.php?img=TM25K_{}-jpg-{{level}}-{{col}}-{{row}}",
            edition
        ),
        level_min,
        level_max,
        tile_side: PYRAMID_TILE_SIDE,
        tile_format: "jpg".to_string(),
    }
}

/// Built-in map presets
pub fn presets() -> Vec<MapDescriptor> {
    vec![
        tm25k(210, "2001", 7, 16),
        tm25k(211, "2003", 5, 17),
        MapDescriptor {
            uid: 1,
            map_id: "OSM".to_string(),
            title: "OpenStreetMap".to_string(),
            lower_corner: (-180.0, -85.05112878),
            upper_corner: (180.0, 85.05112878),
            url_template: "https://tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            level_min: 0,
            level_max: 19,
            tile_side: PYRAMID_TILE_SIDE,
            tile_format: "png".to_string(),
        },
    ]
}

/// Look up a preset by its map id
pub fn preset(map_id: &str) -> Option<MapDescriptor> {
    presets().into_iter().find(|d| d.map_id == map_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile_system::types::TileId;

    #[test]
    fn test_presets_are_valid() {
        for descriptor in presets() {
            assert!(descriptor.validate().is_ok(), "{}", descriptor.map_id);
        }
    }

    #[test]
    fn test_tm25k_url() {
        let descriptor = preset("TM25K_2001").unwrap();
        assert_eq!(descriptor.uid, 210);
        assert_eq!(
            descriptor.tile_url(TileId::new(14, 13713, 7016)),
            "http://gis.sinica.edu.tw/tileserver/file-exists.php?img=TM25K_2001-jpg-14-13713-7016"
        );
        assert_eq!(preset("TM25K_2003").unwrap().level_min, 5);
        assert!(preset("NOPE").is_none());
    }

    #[test]
    fn test_default_settings() {
        let settings = TileMapSettings::default()
            .with_cache_dir("/tmp/tiles")
            .with_storage(StorageBackend::Files);
        assert_eq!(settings.max_workers, 3);
        assert_eq!(settings.download_timeout, Duration::from_secs(30));
        assert_eq!(settings.cache_dir, PathBuf::from("/tmp/tiles"));
        assert_eq!(settings.storage, StorageBackend::Files);
    }
}
