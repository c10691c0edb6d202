//! Tile pyramid cache and download engine.
//!
//! [`TileMap`] serves raster map tiles from memory, from a per-map persistent
//! store, or from the network in the background, synthesising approximate
//! tiles from neighbouring levels while the real ones arrive. [`GeoPoint`]
//! and the [`utils`] conversions map geographic positions to pyramid pixels
//! and tiles.

pub mod geo_point;
pub mod resources;
pub mod tile_system;
pub mod utils;

pub use geo_point::{GeoError, GeoInput, GeoPoint, GeoPointBuilder};
pub use resources::settings::{presets, StorageBackend, TileMapSettings};
pub use tile_system::{MapDescriptor, TileCallback, TileError, TileId, TileImage, TileMap};
