use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::preprocessing::channels::{self, Layout};
use crate::preprocessing::color::{lab_to_rgb, rgb_to_lab, Lab};
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use tracing::debug;

/// Contrast clip limit, relative to a uniform histogram
const CLIP_LIMIT: f32 = 2.0;
/// Tiles per axis
const TILE_GRID: u32 = 8;

/// Contrast-limited adaptive histogram equalization.
///
/// Grayscale input is equalized directly. Color input is equalized on its Lab
/// lightness and recomposed with the original chroma; alpha is dropped.
pub fn apply_clahe(cancel: &CancellationToken, image: &DynamicImage) -> Result<DynamicImage> {
    cancel.check()?;
    let layout = channels::layout_of(image)?;

    match layout {
        Layout::Gray => {
            let gray = channels::to_gray(image)?;
            Ok(DynamicImage::ImageLuma8(clahe(&gray, CLIP_LIMIT, TILE_GRID)))
        }
        Layout::Color => {
            let rgb = channels::to_rgb(image)?;
            let (w, h) = rgb.dimensions();
            let labs: Vec<Lab> = rgb.pixels().map(|p| rgb_to_lab(p.0)).collect();
            let lightness = GrayImage::from_fn(w, h, |x, y| {
                let l = labs[(y * w + x) as usize].l * 255.0 / 100.0;
                Luma([l.round().clamp(0.0, 255.0) as u8])
            });

            cancel.check()?;
            let equalized = clahe(&lightness, CLIP_LIMIT, TILE_GRID);

            cancel.check()?;
            let out = RgbImage::from_fn(w, h, |x, y| {
                let i = (y * w + x) as usize;
                let original = labs[i];
                let before = lightness.get_pixel(x, y).0[0];
                let after = equalized.get_pixel(x, y).0[0];
                if before == after {
                    return *rgb.get_pixel(x, y);
                }
                Rgb(lab_to_rgb(Lab {
                    l: after as f32 * 100.0 / 255.0,
                    ..original
                }))
            });
            Ok(DynamicImage::ImageRgb8(out))
        }
    }
}

/// CLAHE over a `grid` x `grid` tiling (fewer tiles when the image is
/// smaller than the grid), with bilinear interpolation between tile mappings.
pub fn clahe(gray: &GrayImage, clip_limit: f32, grid: u32) -> GrayImage {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return gray.clone();
    }
    let tile_w = w.div_ceil(grid.clamp(1, w));
    let tile_h = h.div_ceil(grid.clamp(1, h));
    let tiles_x = w.div_ceil(tile_w);
    let tiles_y = h.div_ceil(tile_h);
    debug!(tiles_x, tiles_y, tile_w, tile_h, "CLAHE tiling");

    let mut maps = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = (tx * tile_w).min(w);
            let y0 = (ty * tile_h).min(h);
            let x1 = ((tx + 1) * tile_w).min(w);
            let y1 = ((ty + 1) * tile_h).min(h);
            maps.push(tile_mapping(gray, x0, y0, x1, y1, clip_limit));
        }
    }

    let map_at = |tx: u32, ty: u32| &maps[(ty * tiles_x + tx) as usize];

    GrayImage::from_fn(w, h, |x, y| {
        let v = gray.get_pixel(x, y).0[0] as usize;

        let fx = (x as f32 + 0.5) / tile_w as f32 - 0.5;
        let fy = (y as f32 + 0.5) / tile_h as f32 - 0.5;
        let tx0 = fx.floor().clamp(0.0, (tiles_x - 1) as f32) as u32;
        let ty0 = fy.floor().clamp(0.0, (tiles_y - 1) as f32) as u32;
        let tx1 = (tx0 + 1).min(tiles_x - 1);
        let ty1 = (ty0 + 1).min(tiles_y - 1);
        let ax = (fx - tx0 as f32).clamp(0.0, 1.0);
        let ay = (fy - ty0 as f32).clamp(0.0, 1.0);

        let top = map_at(tx0, ty0)[v] as f32 * (1.0 - ax) + map_at(tx1, ty0)[v] as f32 * ax;
        let bottom = map_at(tx0, ty1)[v] as f32 * (1.0 - ax) + map_at(tx1, ty1)[v] as f32 * ax;
        let value = top * (1.0 - ay) + bottom * ay;
        Luma([value.round().clamp(0.0, 255.0) as u8])
    })
}

/// Clipped-histogram equalization lookup table for one tile
///
/// A tile with a single occupied bin has nothing to equalize and maps every
/// value to itself.
fn tile_mapping(
    gray: &GrayImage,
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
    clip_limit: f32,
) -> [u8; 256] {
    let mut identity = [0u8; 256];
    for (i, v) in identity.iter_mut().enumerate() {
        *v = i as u8;
    }

    let mut hist = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            hist[gray.get_pixel(x, y).0[0] as usize] += 1;
        }
    }
    let pixels: u32 = hist.iter().sum();
    if pixels == 0 || hist.iter().filter(|&&c| c > 0).count() <= 1 {
        return identity;
    }

    let clip = ((clip_limit * pixels as f32 / 256.0) as u32).max(1);
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > clip {
            excess += *bin - clip;
            *bin = clip;
        }
    }
    let per_bin = excess / 256;
    let remainder = (excess % 256) as usize;
    for (i, bin) in hist.iter_mut().enumerate() {
        *bin += per_bin;
        if i < remainder {
            *bin += 1;
        }
    }

    let scale = 255.0 / pixels as f32;
    let mut lut = [0u8; 256];
    let mut cumulative = 0u32;
    for (i, &count) in hist.iter().enumerate() {
        cumulative += count;
        lut[i] = (cumulative as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}
