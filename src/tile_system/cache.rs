use parking_lot::Mutex;
use std::collections::HashMap;

use crate::tile_system::types::{TileId, TileImage};

/// In-memory repository of decoded tiles.
///
/// Shared between the caller thread and the download workers. It only grows:
/// nothing is ever evicted, so callers that need a memory bound must layer
/// their own policy on top.
#[derive(Default)]
pub struct TileCache {
    /// Map of tile ID to decoded tile
    tiles: Mutex<HashMap<TileId, TileImage>>,
}

impl TileCache {
    /// Create a new empty tile cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a tile from the cache
    pub fn get(&self, id: &TileId) -> Option<TileImage> {
        self.tiles.lock().get(id).cloned()
    }

    /// Insert a tile into the cache, replacing any previous entry
    pub fn put(&self, id: TileId, tile: TileImage) {
        self.tiles.lock().insert(id, tile);
    }

    /// Check if a tile is in the cache
    pub fn contains(&self, id: &TileId) -> bool {
        self.tiles.lock().contains_key(id)
    }

    /// Get the number of tiles in the cache
    pub fn len(&self) -> usize {
        self.tiles.lock().len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.tiles.lock().is_empty()
    }
}
