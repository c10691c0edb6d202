//! Approximate tiles for when the real one isn't available yet.
//!
//! Looks for already cached tiles on neighbouring levels: a coarser ancestor
//! is cropped and magnified, or the finer descendants are composed and
//! minified. If neither exists the result is a flat background tile.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use crate::resources::constants::{BACKGROUND_COLOR, MAGNIFY_DEPTH, MINIFY_DEPTH};
use crate::tile_system::types::{MapDescriptor, TileId, TileImage};

/// Resampling filter for both magnification and minification
pub const RESAMPLE_FILTER: FilterType = FilterType::Triangle;

/// Build a placeholder for `id`, consulting `lookup` for real tiles only.
///
/// The result is always marked approximate.
pub fn synthesize(
    descriptor: &MapDescriptor,
    id: TileId,
    lookup: impl Fn(TileId) -> Option<TileImage>,
) -> TileImage {
    let image = magnify(descriptor, id, &lookup)
        .or_else(|| minify(descriptor, id, &lookup))
        .unwrap_or_else(|| blank(descriptor.tile_side));
    TileImage::approximate(image)
}

/// Crop the covering sub-block out of the nearest cached ancestor and scale it up
pub fn magnify(
    descriptor: &MapDescriptor,
    id: TileId,
    lookup: impl Fn(TileId) -> Option<TileImage>,
) -> Option<RgbaImage> {
    let side = descriptor.tile_side;
    let depth = (id.level - descriptor.level_min).min(MAGNIFY_DEPTH);

    (1..=depth).find_map(|i| {
        let ancestor = lookup(id.ancestor(i))?;
        let scale = 1u32 << i;
        let step = side / scale;
        let px = step * (id.col % scale);
        let py = step * (id.row % scale);

        let block = imageops::crop_imm(ancestor.image(), px, py, step, step).to_image();
        Some(imageops::resize(&block, side, side, RESAMPLE_FILTER))
    })
}

/// Compose the cached descendants into one canvas and scale it down.
///
/// Missing descendants stay background coloured; `None` if none is cached.
pub fn minify(
    descriptor: &MapDescriptor,
    id: TileId,
    lookup: impl Fn(TileId) -> Option<TileImage>,
) -> Option<RgbaImage> {
    let side = descriptor.tile_side;
    let depth = (descriptor.level_max - id.level).min(MINIFY_DEPTH);

    (1..=depth).find_map(|i| {
        let scale = 1u32 << i;
        let mut canvas = RgbaImage::from_pixel(side * scale, side * scale, Rgba(BACKGROUND_COLOR));
        let mut has_tile = false;

        let level = id.level.checked_add(i)?;
        let col0 = id.col.checked_mul(scale)?;
        let row0 = id.row.checked_mul(scale)?;
        for p in 0..scale {
            for q in 0..scale {
                let child = TileId::new(level, col0.checked_add(p)?, row0.checked_add(q)?);
                if let Some(tile) = lookup(child) {
                    imageops::replace(
                        &mut canvas,
                        tile.image(),
                        i64::from(p * side),
                        i64::from(q * side),
                    );
                    has_tile = true;
                }
            }
        }

        has_tile.then(|| imageops::resize(&canvas, side, side, RESAMPLE_FILTER))
    })
}

/// A flat background tile
pub fn blank(side: u32) -> RgbaImage {
    RgbaImage::from_pixel(side, side, Rgba(BACKGROUND_COLOR))
}
