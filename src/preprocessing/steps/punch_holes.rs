//! Binder-hole removal along the page edges
//!
//! Dark components inside the edge band are compared against a synthetic
//! template for each [`PunchSpec`]; the ones that match are inpainted from
//! the surrounding paper.

use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::preprocessing::blobs::{label_blobs, Blob};
use crate::preprocessing::channels::{self, Layout};
use crate::preprocessing::inpaint::{inpaint, inpaint_image};
use crate::preprocessing::morphology::dilate_brick;
use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use imageproc::contrast::otsu_level;
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
use imageproc::rect::Rect;
use std::borrow::Cow;
use tracing::{debug, info};

/// Below this gray-level spread the band holds no usable signal
const MIN_CONTRAST: u8 = 40;
/// Growth applied to matched holes before inpainting, covering their halo
const MASK_DILATION: u32 = 2;

/// Largest accepted template side, in pixels
pub const MAX_TEMPLATE_SIDE: u32 = 2000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PunchShape {
    Circle { diameter: u32 },
    Rect { width: u32, height: u32 },
}

impl PunchShape {
    /// Template width and height
    pub fn dimensions(&self) -> (u32, u32) {
        match *self {
            PunchShape::Circle { diameter } => (diameter.max(1), diameter.max(1)),
            PunchShape::Rect { width, height } => (width.max(1), height.max(1)),
        }
    }
}

/// One hole template to search for
#[derive(Debug, Clone, PartialEq)]
pub struct PunchSpec {
    pub shape: PunchShape,
    /// Expected fraction of the template covered by the hole (0-1)
    pub density: f64,
    /// Allowed relative deviation of the hole size from the template
    pub size_tolerance: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PunchHoleOptions {
    /// Minimum short/long side ratio of a circular hole
    pub roundness: f64,
    /// Global match threshold (0-1)
    pub fill_ratio: f64,
    /// Band widths in pixels, measured from each edge
    pub offset_top: u32,
    pub offset_bottom: u32,
    pub offset_left: u32,
    pub offset_right: u32,
}

impl Default for PunchHoleOptions {
    fn default() -> Self {
        Self {
            roundness: 0.7,
            fill_ratio: 0.7,
            offset_top: 200,
            offset_bottom: 200,
            offset_left: 200,
            offset_right: 200,
        }
    }
}

impl PunchHoleOptions {
    fn in_band(&self, x: u32, y: u32, width: u32, height: u32) -> bool {
        y < self.offset_top
            || y >= height.saturating_sub(self.offset_bottom)
            || x < self.offset_left
            || x >= width.saturating_sub(self.offset_right)
    }
}

/// A rendered template with its foreground pixel count
struct Template {
    mask: GrayImage,
    pixels: u32,
}

impl Template {
    fn render(shape: PunchShape) -> Template {
        let mask = match shape {
            PunchShape::Circle { .. } => {
                let (side, _) = shape.dimensions();
                let mut mask = GrayImage::new(side, side);
                let center = (side / 2) as i32;
                let radius = ((side as i32) - 1) / 2;
                draw_filled_circle_mut(&mut mask, (center, center), radius, Luma([255]));
                mask
            }
            PunchShape::Rect { .. } => {
                let (w, h) = shape.dimensions();
                let mut mask = GrayImage::new(w, h);
                draw_filled_rect_mut(&mut mask, Rect::at(0, 0).of_size(w, h), Luma([255]));
                mask
            }
        };
        let pixels = mask.pixels().filter(|p| p.0[0] > 0).count() as u32;
        Template { mask, pixels }
    }

    fn transposed(&self) -> Template {
        let (w, h) = self.mask.dimensions();
        let mask = GrayImage::from_fn(h, w, |x, y| *self.mask.get_pixel(y, x));
        Template {
            mask,
            pixels: self.pixels,
        }
    }
}

/// Detect and inpaint punch holes in the edge band.
///
/// `None` passes through as `None` and an empty image is returned as the same
/// instance. Otherwise the result is always a new buffer: an unchanged clone
/// when nothing is removed, or the repainted image (gray stays gray, color
/// becomes RGB).
pub fn remove_punch_holes<'a>(
    cancel: &CancellationToken,
    image: Option<&'a DynamicImage>,
    specs: &[PunchSpec],
    options: &PunchHoleOptions,
) -> Result<Option<Cow<'a, DynamicImage>>> {
    let Some(image) = image else {
        return Ok(None);
    };
    if channels::is_empty(image) {
        return Ok(Some(Cow::Borrowed(image)));
    }
    cancel.check()?;
    let layout = channels::layout_of(image)?;
    if specs.is_empty() {
        return Ok(Some(Cow::Owned(image.clone())));
    }

    let gray = channels::to_gray(image)?;
    let Some(signal) = band_signal(&gray, options) else {
        debug!("No contrast in the edge band");
        return Ok(Some(Cow::Owned(image.clone())));
    };

    let (labels, candidates) = label_blobs(&signal);
    debug!(candidates = candidates.len(), "Punch hole candidates");

    let (w, h) = gray.dimensions();
    let mut matched: Vec<u32> = Vec::new();
    for spec in specs {
        cancel.check()?;
        if !could_fit(spec, w, h) {
            debug!(shape = ?spec.shape, "Template cannot fit the page");
            continue;
        }
        let template = Template::render(spec.shape);
        let rotated = match spec.shape {
            PunchShape::Rect { width, height } if width != height => Some(template.transposed()),
            _ => None,
        };

        for blob in &candidates {
            cancel.check()?;
            if matched.contains(&blob.label) {
                continue;
            }
            let fits = |t: &Template| matches_template(blob, &labels, t, spec, options);
            if fits(&template) || rotated.as_ref().is_some_and(fits) {
                matched.push(blob.label);
            }
        }
    }

    if matched.is_empty() {
        return Ok(Some(Cow::Owned(image.clone())));
    }
    info!(holes = matched.len(), "Removing punch holes");

    let hole_mask = GrayImage::from_fn(w, h, |x, y| {
        let label = labels.get_pixel(x, y).0[0];
        Luma([if label != 0 && matched.contains(&label) { 255 } else { 0 }])
    });
    let size = 2 * MASK_DILATION + 1;
    let hole_mask = dilate_brick(&hole_mask, size, size);

    cancel.check()?;
    let repaired = match layout {
        Layout::Gray => DynamicImage::ImageLuma8(inpaint(&gray, &hole_mask)),
        Layout::Color => inpaint_image(image, &hole_mask)?,
    };
    Ok(Some(Cow::Owned(repaired)))
}

/// Dark pixels of the edge band at the band's Otsu level.
fn band_signal(gray: &GrayImage, options: &PunchHoleOptions) -> Option<GrayImage> {
    let (w, h) = gray.dimensions();
    let band: Vec<u8> = gray
        .enumerate_pixels()
        .filter(|(x, y, _)| options.in_band(*x, *y, w, h))
        .map(|(_, _, p)| p.0[0])
        .collect();
    let min = band.iter().copied().min()?;
    let max = band.iter().copied().max()?;
    if max - min < MIN_CONTRAST {
        return None;
    }

    let samples = GrayImage::from_raw(band.len() as u32, 1, band)?;
    let level = otsu_level(&samples);
    debug!(level, min, max, "Band threshold");

    Some(GrayImage::from_fn(w, h, |x, y| {
        let dark = gray.get_pixel(x, y).0[0] <= level;
        Luma([if dark && options.in_band(x, y, w, h) { 255 } else { 0 }])
    }))
}

/// Whether a blob inside a `w`x`h` page could pass the size check for `spec`,
/// in either orientation for rectangles
fn could_fit(spec: &PunchSpec, w: u32, h: u32) -> bool {
    let smallest = |side: u32| side as f64 * (1.0 - spec.size_tolerance.max(0.0));
    let fits = |a: u32, b: u32| smallest(a) <= w as f64 && smallest(b) <= h as f64;
    let (tw, th) = spec.shape.dimensions();
    tw.max(th) <= MAX_TEMPLATE_SIDE
        && (fits(tw, th) || (matches!(spec.shape, PunchShape::Rect { .. }) && fits(th, tw)))
}

fn within_tolerance(actual: u32, expected: u32, tolerance: f64) -> bool {
    (actual as f64 - expected as f64).abs() <= tolerance.max(0.0) * expected as f64
}

fn matches_template(
    blob: &Blob,
    labels: &ImageBuffer<Luma<u32>, Vec<u32>>,
    template: &Template,
    spec: &PunchSpec,
    options: &PunchHoleOptions,
) -> bool {
    let (tw, th) = template.mask.dimensions();
    let bbox = blob.bbox;
    if !within_tolerance(bbox.width, tw, spec.size_tolerance)
        || !within_tolerance(bbox.height, th, spec.size_tolerance)
    {
        return false;
    }

    if matches!(spec.shape, PunchShape::Circle { .. }) {
        let aspect = bbox.width.min(bbox.height) as f64 / bbox.width.max(bbox.height) as f64;
        if aspect < options.roundness {
            return false;
        }
    }

    // Template top-left in image coordinates, centers aligned
    let ox = (bbox.x + bbox.width / 2) as i64 - (tw / 2) as i64;
    let oy = (bbox.y + bbox.height / 2) as i64 - (th / 2) as i64;
    let (lw, lh) = (labels.width() as i64, labels.height() as i64);
    let is_blob = |x: i64, y: i64| {
        x >= 0 && y >= 0 && x < lw && y < lh && labels.get_pixel(x as u32, y as u32).0[0] == blob.label
    };

    let covered = template
        .mask
        .enumerate_pixels()
        .filter(|(tx, ty, p)| p.0[0] > 0 && is_blob(ox + *tx as i64, oy + *ty as i64))
        .count() as f64;
    let coverage = covered / template.pixels.max(1) as f64;

    let inside = (bbox.y..bbox.bottom())
        .flat_map(|y| (bbox.x..bbox.right()).map(move |x| (x, y)))
        .filter(|&(x, y)| labels.get_pixel(x, y).0[0] == blob.label)
        .filter(|&(x, y)| {
            let (tx, ty) = (x as i64 - ox, y as i64 - oy);
            tx >= 0
                && ty >= 0
                && tx < tw as i64
                && ty < th as i64
                && template.mask.get_pixel(tx as u32, ty as u32).0[0] > 0
        })
        .count() as f64;
    let containment = inside / blob.area.max(1) as f64;

    debug!(
        label = blob.label,
        coverage, containment, "Template comparison"
    );
    coverage >= spec.density * options.fill_ratio && containment >= options.fill_ratio
}
