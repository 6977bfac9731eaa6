//! Projection-profile deskew
//!
//! Keeps the canvas size. The skew is the angle whose row profile of
//! foreground pixels is most peaked, found by a coarse sweep and a halving
//! refinement.

use crate::error::Result;
use crate::preprocessing::blobs::content_mask;
use crate::preprocessing::channels::{self, Layout};
use image::{DynamicImage, GrayImage, Luma, Rgb};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use tracing::debug;

/// Widest skew considered, in degrees either way
const SEARCH_LIMIT: i32 = 8;
/// Refinement stops once the step drops below this many degrees
const FINEST_STEP: f32 = 0.1;
/// Rotations smaller than this are not worth resampling for
const MIN_ROTATION: f32 = 0.1;

/// Level rows of text without changing the canvas size.
///
/// Gray stays gray, color becomes RGB. Pages without foreground come back
/// unchanged.
pub fn deskew_projection(image: &DynamicImage) -> Result<DynamicImage> {
    let layout = channels::layout_of(image)?;
    channels::ensure_not_empty(image, "deskew")?;
    let gray = channels::to_gray(image)?;

    let skew = match content_mask(&gray) {
        Some(mask) => projection_skew(&mask),
        None => 0.0,
    };
    if skew.abs() < MIN_ROTATION {
        debug!(skew, "Projection skew negligible");
        return channels::normalize(image);
    }
    debug!(angle_degrees = skew, "Projection deskew");

    let theta = (-skew).to_radians();
    Ok(match layout {
        Layout::Gray => DynamicImage::ImageLuma8(rotate_about_center(
            &gray,
            theta,
            Interpolation::Bilinear,
            Luma([255]),
        )),
        Layout::Color => DynamicImage::ImageRgb8(rotate_about_center(
            &channels::to_rgb(image)?,
            theta,
            Interpolation::Bilinear,
            Rgb([255, 255, 255]),
        )),
    })
}

/// Skew in degrees of the bright foreground in `mask`, positive when rows
/// run downhill to the right.
pub fn projection_skew(mask: &GrayImage) -> f32 {
    let profile = RowProfile::new(mask);
    if profile.points.is_empty() {
        return 0.0;
    }

    let mut best = (0.0f32, profile.peakedness(0.0));
    for step in -SEARCH_LIMIT..=SEARCH_LIMIT {
        let angle = step as f32;
        let score = profile.peakedness(angle);
        if score > best.1 {
            best = (angle, score);
        }
    }

    let mut step = 0.5f32;
    while step >= FINEST_STEP {
        let center = best.0;
        for angle in [center - step, center + step] {
            let score = profile.peakedness(angle);
            if score > best.1 {
                best = (angle, score);
            }
        }
        step /= 2.0;
    }
    best.0
}

/// Foreground coordinates relative to the image center
struct RowProfile {
    points: Vec<(f32, f32)>,
    half_diagonal: f32,
}

impl RowProfile {
    fn new(mask: &GrayImage) -> Self {
        let (w, h) = mask.dimensions();
        let (cx, cy) = (w as f32 / 2.0, h as f32 / 2.0);
        let points = mask
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0[0] > 0)
            .map(|(x, y, _)| (x as f32 - cx, y as f32 - cy))
            .collect();
        Self {
            points,
            half_diagonal: cx.hypot(cy),
        }
    }

    /// Sum of squared row counts after leveling by `degrees`; grows as
    /// foreground collects into fewer rows
    fn peakedness(&self, degrees: f32) -> f64 {
        let (sin, cos) = degrees.to_radians().sin_cos();
        let rows = (2.0 * self.half_diagonal).ceil() as usize + 1;
        let mut counts = vec![0u32; rows];
        for &(dx, dy) in &self.points {
            let row = (dy * cos - dx * sin + self.half_diagonal).round();
            if let Some(count) = counts.get_mut(row.max(0.0) as usize) {
                *count += 1;
            }
        }
        counts.iter().map(|&c| (c as f64) * (c as f64)).sum()
    }
}
