pub mod cache;
pub mod downloader;
pub mod loader;
pub mod placeholder;
pub mod scheduler;
pub mod storage;
pub mod tile_map;
pub mod types;

// Re-export main types
pub use cache::TileCache;
pub use downloader::{DownloadRequest, TileCallback, TileDownloadQueue};
pub use loader::{HttpTileLoader, TileFetcher};
pub use scheduler::TileScheduler;
pub use storage::{FileTileStore, SqliteTileStore, StoreError, TileStorage};
pub use tile_map::TileMap;
pub use types::{MapDescriptor, TileError, TileId, TileImage};
