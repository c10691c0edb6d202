use crossbeam_channel::unbounded;
use image::{ImageFormat, Rgba, RgbaImage};
use parking_lot::Mutex;
use std::io::Cursor;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use tilecache::tile_system::{FileTileStore, SqliteTileStore, TileFetcher, TileStorage};
use tilecache::{GeoPoint, MapDescriptor, TileCallback, TileError, TileId, TileMap};

fn descriptor() -> MapDescriptor {
    MapDescriptor {
        uid: 7,
        map_id: "IT_MAP".to_string(),
        title: "Integration map".to_string(),
        lower_corner: (119.0, 21.5),
        upper_corner: (123.0, 25.5),
        url_template: "http://tiles.test/{level}/{col}/{row}.png".to_string(),
        level_min: 7,
        level_max: 16,
        tile_side: 32,
        tile_format: "png".to_string(),
    }
}

fn png(color: [u8; 4]) -> Vec<u8> {
    let image = RgbaImage::from_pixel(32, 32, Rgba(color));
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png).unwrap();
    bytes.into_inner()
}

/// Colours tiles by column parity and counts fetches per URL
struct FakeServer {
    fetched: Mutex<Vec<String>>,
    delay: Duration,
}

impl FakeServer {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            fetched: Mutex::new(Vec::new()),
            delay,
        })
    }

    fn fetch_count(&self) -> usize {
        self.fetched.lock().len()
    }
}

impl TileFetcher for FakeServer {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, TileError> {
        self.fetched.lock().push(url.to_string());
        thread::sleep(self.delay);
        let col: u32 = url
            .rsplit('/')
            .nth(1)
            .and_then(|c| c.parse().ok())
            .unwrap_or(0);
        Ok(png(if col % 2 == 0 {
            [200, 0, 0, 255]
        } else {
            [0, 0, 200, 255]
        }))
    }
}

fn sqlite_map(dir: &TempDir, server: Arc<FakeServer>) -> TileMap {
    let descriptor = Arc::new(descriptor());
    let storage = Arc::new(SqliteTileStore::new(
        dir.path(),
        Arc::clone(&descriptor),
        Duration::from_secs(2),
    ));
    let map = TileMap::with_parts(descriptor, storage, server, 3).unwrap();
    map.start().unwrap();
    map
}

fn download(map: &TileMap, level: u8, col: u32, row: u32) {
    let (tx, rx) = unbounded();
    let callback: TileCallback = Box::new(move |_, _, _| {
        let _ = tx.send(());
    });
    map.get_tile(level, col, row, Some(callback), true).unwrap();
    rx.recv_timeout(Duration::from_secs(5)).unwrap();
}

fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn cold_request_returns_placeholder_then_real_tile() {
    let dir = TempDir::new().unwrap();
    let server = FakeServer::new(Duration::from_millis(20));
    let map = sqlite_map(&dir, server.clone());
    let (tx, rx) = unbounded();

    let callback: TileCallback = Box::new(move |level, col, row| {
        let _ = tx.send((level, col, row));
    });
    let first = map.get_tile(14, 100, 200, Some(callback), true).unwrap().unwrap();
    assert!(first.is_approximate());
    assert_eq!(first.side(), 32);

    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), (14, 100, 200));
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    let second = map.get_tile(14, 100, 200, None, true).unwrap().unwrap();
    assert!(!second.is_approximate());
    assert_eq!(second.image().get_pixel(5, 5).0, [200, 0, 0, 255]);
    assert_eq!(server.fetch_count(), 1);
    map.close();
}

#[test]
fn repeated_requests_share_one_download() {
    let dir = TempDir::new().unwrap();
    let server = FakeServer::new(Duration::from_millis(150));
    let map = sqlite_map(&dir, server.clone());

    for _ in 0..5 {
        map.get_tile(12, 3, 4, None, true).unwrap();
    }
    assert!(wait_until(|| map
        .get_tile(12, 3, 4, None, false)
        .unwrap()
        .is_some()));
    assert_eq!(server.fetch_count(), 1);
}

#[test]
fn level_outside_pyramid_is_rejected() {
    let dir = TempDir::new().unwrap();
    let server = FakeServer::new(Duration::ZERO);
    let map = sqlite_map(&dir, server.clone());

    let err = map.get_tile(17, 0, 0, None, true).unwrap_err();
    assert!(matches!(err, TileError::LevelOutOfRange { level: 17, min: 7, max: 16 }));
    assert!(map.get_tile(6, 0, 0, None, true).is_err());
    assert_eq!(server.fetch_count(), 0);
}

#[test]
fn downloaded_tiles_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let map = sqlite_map(&dir, FakeServer::new(Duration::ZERO));
        download(&map, 10, 5, 6);
        download(&map, 10, 6, 6);
        // Close drains the pending writes
        map.close();
    }

    let descriptor = Arc::new(descriptor());
    let store = SqliteTileStore::new(dir.path(), Arc::clone(&descriptor), Duration::from_secs(2));
    assert_eq!(store.path(), dir.path().join("IT_MAP.mbtiles"));
    store.start().unwrap();
    assert_eq!(store.get(TileId::new(10, 5, 6)).unwrap(), Some(png([0, 0, 200, 255])));
    assert_eq!(store.get(TileId::new(10, 6, 6)).unwrap(), Some(png([200, 0, 0, 255])));
    assert_eq!(store.get(TileId::new(10, 7, 6)).unwrap(), None);
    store.close();

    let server = FakeServer::new(Duration::ZERO);
    let map = sqlite_map(&dir, server.clone());
    let tile = map.get_tile(10, 5, 6, None, true).unwrap().unwrap();
    assert!(!tile.is_approximate());
    assert_eq!(server.fetch_count(), 0);
}

#[test]
fn file_backend_serves_and_persists() {
    let dir = TempDir::new().unwrap();
    let descriptor = Arc::new(descriptor());
    let storage = Arc::new(FileTileStore::new(dir.path(), &descriptor));
    let server = FakeServer::new(Duration::ZERO);
    let map = TileMap::with_parts(Arc::clone(&descriptor), storage.clone(), server.clone(), 3).unwrap();
    map.start().unwrap();

    download(&map, 9, 11, 12);
    let path = dir.path().join("IT_MAP").join("11").join("9-11-12.png");
    assert!(wait_until(|| path.exists()));
    assert_eq!(storage.tile_path(TileId::new(9, 11, 12)), path);
}

#[test]
fn placeholder_composes_downloaded_children() {
    let dir = TempDir::new().unwrap();
    let map = sqlite_map(&dir, FakeServer::new(Duration::ZERO));

    // Children of (13, 50, 100): even columns red, odd columns blue
    for (col, row) in [(100, 200), (101, 200), (100, 201), (101, 201)] {
        download(&map, 14, col, row);
    }

    let parent = map.get_tile(13, 50, 100, None, true).unwrap().unwrap();
    assert!(parent.is_approximate());
    assert_eq!(parent.image().get_pixel(8, 8).0, [200, 0, 0, 255]);
    assert_eq!(parent.image().get_pixel(24, 8).0, [0, 0, 200, 255]);
    assert_eq!(parent.image().get_pixel(8, 24).0, [200, 0, 0, 255]);
    assert_eq!(parent.image().get_pixel(24, 24).0, [0, 0, 200, 255]);

    let child = map.get_tile(15, 201, 401, None, true).unwrap().unwrap();
    assert!(child.is_approximate());
    assert_eq!(child.image().get_pixel(16, 16).0, [200, 0, 0, 255]);
}

#[test]
fn geo_point_locates_requested_tile() {
    let dir = TempDir::new().unwrap();
    let server = FakeServer::new(Duration::ZERO);
    let map = sqlite_map(&dir, server.clone());

    let point = GeoPoint::from_lat_lon(24.988625, 121.313181).unwrap();
    let (col, row) = point.tile_at(14, map.descriptor().tile_side);
    // 32px tiles: eight times the columns of the 256px pyramid
    assert_eq!((col / 8, row / 8), (13713, 7016));

    download(&map, 14, col as u32, row as u32);
    let fetched = server.fetched.lock().clone();
    assert_eq!(fetched, vec![format!("http://tiles.test/14/{}/{}.png", col, row)]);
}
