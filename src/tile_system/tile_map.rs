//! Public entry point of the tile engine.
//!
//! A [`TileMap`] answers tile requests from memory, then from the persistent
//! store, and otherwise queues a background download and hands back a
//! placeholder built from neighbouring levels.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::resources::settings::{StorageBackend, TileMapSettings};
use crate::tile_system::cache::TileCache;
use crate::tile_system::downloader::TileCallback;
use crate::tile_system::loader::{HttpTileLoader, TileFetcher};
use crate::tile_system::placeholder;
use crate::tile_system::scheduler::TileScheduler;
use crate::tile_system::storage::{FileTileStore, SqliteTileStore, StoreError, TileStorage};
use crate::tile_system::types::{MapDescriptor, TileError, TileId, TileImage};

pub struct TileMap {
    descriptor: Arc<MapDescriptor>,
    cache: Arc<TileCache>,
    storage: Arc<dyn TileStorage>,
    scheduler: TileScheduler,
}

impl TileMap {
    /// Build a map that downloads over HTTP and persists with the configured
    /// backend. Nothing runs until [`TileMap::start`].
    pub fn new(descriptor: MapDescriptor, settings: &TileMapSettings) -> Result<Self, TileError> {
        descriptor.validate()?;
        let descriptor = Arc::new(descriptor);

        let fetcher = Arc::new(HttpTileLoader::new(
            settings.download_timeout,
            &settings.user_agent,
        )?);
        let storage: Arc<dyn TileStorage> = match settings.storage {
            StorageBackend::Sqlite => Arc::new(SqliteTileStore::new(
                &settings.cache_dir,
                Arc::clone(&descriptor),
                settings.store_read_timeout,
            )),
            StorageBackend::Files => Arc::new(FileTileStore::new(&settings.cache_dir, &descriptor)),
        };

        Self::with_parts(descriptor, storage, fetcher, settings.max_workers)
    }

    /// Build a map from explicit collaborators
    pub fn with_parts(
        descriptor: Arc<MapDescriptor>,
        storage: Arc<dyn TileStorage>,
        fetcher: Arc<dyn TileFetcher>,
        max_workers: usize,
    ) -> Result<Self, TileError> {
        descriptor.validate()?;
        let cache = Arc::new(TileCache::new());
        let scheduler = TileScheduler::new(
            Arc::clone(&descriptor),
            fetcher,
            Arc::clone(&cache),
            Arc::clone(&storage),
            max_workers,
        );
        Ok(Self {
            descriptor,
            cache,
            storage,
            scheduler,
        })
    }

    /// [`TileMap::new`] followed by [`TileMap::start`]
    pub fn open(descriptor: MapDescriptor, settings: &TileMapSettings) -> Result<Self, TileError> {
        let map = Self::new(descriptor, settings)?;
        map.start()?;
        Ok(map)
    }

    /// Open the persistent store and start the download monitor
    pub fn start(&self) -> Result<(), TileError> {
        self.storage.start()?;
        self.scheduler.start().map_err(TileError::Scheduler)?;
        info!(
            "Tile map {} ready, levels {}-{}",
            self.descriptor.map_id, self.descriptor.level_min, self.descriptor.level_max
        );
        Ok(())
    }

    pub fn descriptor(&self) -> &MapDescriptor {
        &self.descriptor
    }

    pub fn is_supported_level(&self, level: u8) -> bool {
        self.descriptor.is_supported_level(level)
    }

    pub fn tile_url(&self, level: u8, col: u32, row: u32) -> String {
        self.descriptor.tile_url(TileId::new(level, col, row))
    }

    /// Number of downloads waiting for a worker
    pub fn pending_downloads(&self) -> usize {
        self.scheduler.queued_count()
    }

    /// Get a tile without waiting on the network.
    ///
    /// Fails with `LevelOutOfRange` or `TileOutOfRange` for ids outside the
    /// pyramid.
    ///
    /// Returns the real tile if it is in memory or in the persistent store.
    /// Otherwise a download is queued, `callback` fires from a worker thread
    /// once the real tile is cached, and the result is a placeholder when
    /// `allow_approximate` is set or `None` when it isn't.
    pub fn get_tile(
        &self,
        level: u8,
        col: u32,
        row: u32,
        callback: Option<TileCallback>,
        allow_approximate: bool,
    ) -> Result<Option<TileImage>, TileError> {
        let id = TileId::new(level, col, row);
        self.descriptor.check_tile(id)?;

        if let Some(tile) = self.cached_tile(id) {
            return Ok(Some(tile));
        }

        self.scheduler.request(id, callback);

        if !allow_approximate {
            return Ok(None);
        }
        let tile = placeholder::synthesize(&self.descriptor, id, |neighbour| {
            self.cached_tile(neighbour)
        });
        Ok(Some(tile))
    }

    /// Stop downloading and close the persistent store.
    ///
    /// Downloads already running finish their fetch but skip their side
    /// effects.
    pub fn close(&self) {
        self.scheduler.close();
        self.storage.close();
        debug!("Tile map {} closed", self.descriptor.map_id);
    }

    /// Memory first, then the persistent store; store hits are promoted
    fn cached_tile(&self, id: TileId) -> Option<TileImage> {
        if let Some(tile) = self.cache.get(&id) {
            return Some(tile);
        }

        let bytes = match self.storage.get(id) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e @ (StoreError::Closed | StoreError::NotStarted)) => {
                debug!("Tile store unavailable for {}: {}", id, e);
                return None;
            }
            Err(e) => {
                warn!("Failed to read tile {} from store: {}", id, e);
                return None;
            }
        };
        match TileImage::decode(&bytes, self.descriptor.tile_side) {
            Ok(tile) => {
                self.cache.put(id, tile.clone());
                Some(tile)
            }
            Err(e) => {
                warn!("Stored tile {} is unreadable: {}", id, e);
                None
            }
        }
    }
}

impl Drop for TileMap {
    fn drop(&mut self) {
        self.close();
    }
}
