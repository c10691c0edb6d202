use anyhow::{bail, Context, Result};
use crossbeam_channel::bounded;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use tilecache::resources::constants::DOWNLOAD_TIMEOUT;
use tilecache::utils::logging::init_logging;
use tilecache::{presets, GeoPoint, TileCallback, TileMap, TileMapSettings};

fn main() -> Result<()> {
    init_logging();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() < 3 {
        bail!("usage: tilecache <lat> <lon> <level> [cache_dir]");
    }
    let lat: f64 = args[0].parse().context("invalid latitude")?;
    let lon: f64 = args[1].parse().context("invalid longitude")?;
    let level: u8 = args[2].parse().context("invalid level")?;
    let cache_dir = args.get(3).map_or_else(|| PathBuf::from("./cache"), PathBuf::from);

    let descriptor = presets()
        .into_iter()
        .next()
        .context("no map presets available")?;
    let side = descriptor.tile_side;
    let settings = TileMapSettings::default().with_cache_dir(cache_dir);
    let map = TileMap::open(descriptor, &settings)?;

    let point = GeoPoint::from_lat_lon(lat, lon)?;
    let (col, row) = point.tile_at(level, side);
    let col = u32::try_from(col).context("column out of range")?;
    let row = u32::try_from(row).context("row out of range")?;
    info!("Point ({}, {}) is in tile {}-{}-{}", lat, lon, level, col, row);

    let (done_tx, done_rx) = bounded(1);
    let callback: TileCallback = Box::new(move |level, col, row| {
        let _ = done_tx.send((level, col, row));
    });

    let mut tile = map
        .get_tile(level, col, row, Some(callback), true)?
        .context("no tile returned")?;
    if tile.is_approximate() {
        info!("Waiting for {}", map.tile_url(level, col, row));
        done_rx
            .recv_timeout(DOWNLOAD_TIMEOUT + Duration::from_secs(5))
            .context("tile download did not complete")?;
        tile = map
            .get_tile(level, col, row, None, false)?
            .context("downloaded tile missing from cache")?;
    }

    let output = PathBuf::from(format!("{}-{}-{}-{}.png", map.descriptor().map_id, level, col, row));
    tile.image()
        .save(&output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    info!("Saved {}", output.display());

    map.close();
    Ok(())
}
