use std::time::Duration;

/// Constants for the tile pyramid
pub const PYRAMID_TILE_SIDE: u32 = 256; // Pixel side of one tile in the Mercator pyramid
pub const MAX_LEVEL: u8 = 23; // Finest level a GeoPoint keeps pixels for

// Valid Mercator band, anything beyond is clipped
pub const MIN_LATITUDE: f64 = -85.05112878;
pub const MAX_LATITUDE: f64 = 85.05112878;
pub const MIN_LONGITUDE: f64 = -180.0;
pub const MAX_LONGITUDE: f64 = 180.0;

/// Mean earth radius used by the spherical Mercator projection, in metres
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Maximum number of concurrent downloads
pub const MAX_WORKERS: usize = 3;

/// Timeout for a single tile fetch
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a caller waits on the storage actor before giving up with `Busy`
pub const STORE_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Capacity of the storage actor's read queue
pub const STORE_READ_QUEUE: usize = 16;

/// How many coarser levels the placeholder synthesis looks at
pub const MAGNIFY_DEPTH: u8 = 3;
/// How many finer levels the placeholder synthesis looks at
pub const MINIFY_DEPTH: u8 = 1;

/// Light gray, the background of blank and partially composed placeholders
pub const BACKGROUND_COLOR: [u8; 4] = [211, 211, 211, 255];

pub const DEFAULT_USER_AGENT: &str = "tilecache/0.1.0";
