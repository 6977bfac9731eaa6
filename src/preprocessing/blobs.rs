//! Foreground masks, connected components and contours

use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::contrast::otsu_level;
use imageproc::point::Point;
use imageproc::region_labelling::{connected_components, Connectivity};

/// Axis-aligned bounding box in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Grow by `margin` on every side, clamped to a `width` x `height` canvas.
    pub fn expanded(&self, margin: u32, width: u32, height: u32) -> BoundingBox {
        let x = self.x.saturating_sub(margin);
        let y = self.y.saturating_sub(margin);
        let right = (self.right() + margin).min(width);
        let bottom = (self.bottom() + margin).min(height);
        BoundingBox {
            x,
            y,
            width: right.saturating_sub(x),
            height: bottom.saturating_sub(y),
        }
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        BoundingBox {
            x,
            y,
            width: self.right().max(other.right()) - x,
            height: self.bottom().max(other.bottom()) - y,
        }
    }
}

/// One 8-connected foreground component
#[derive(Debug, Clone)]
pub struct Blob {
    pub label: u32,
    pub bbox: BoundingBox,
    /// Number of foreground pixels
    pub area: u32,
}

/// Dark content as bright foreground (255) at the Otsu level.
///
/// `None` for a flat image, which has no content to separate.
pub fn content_mask(gray: &GrayImage) -> Option<GrayImage> {
    let (min, max) = gray
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));
    if min >= max {
        return None;
    }
    Some(dark_foreground(gray, otsu_level(gray)))
}

/// Pixels at or below `level` become 255, the rest 0.
pub fn dark_foreground(gray: &GrayImage, level: u8) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        Luma([if gray.get_pixel(x, y).0[0] <= level { 255 } else { 0 }])
    })
}

/// Label the mask and collect per-component statistics.
///
/// Returns the label image alongside the blobs so callers can recover the
/// exact pixels of a component.
pub fn label_blobs(mask: &GrayImage) -> (image::ImageBuffer<Luma<u32>, Vec<u32>>, Vec<Blob>) {
    let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));
    let mut blobs: Vec<Option<(u32, u32, u32, u32, u32)>> = Vec::new();

    for (x, y, label) in labels.enumerate_pixels() {
        let label = label.0[0];
        if label == 0 {
            continue;
        }
        let idx = label as usize;
        if blobs.len() <= idx {
            blobs.resize(idx + 1, None);
        }
        let entry = blobs[idx].get_or_insert((x, y, x, y, 0));
        entry.0 = entry.0.min(x);
        entry.1 = entry.1.min(y);
        entry.2 = entry.2.max(x);
        entry.3 = entry.3.max(y);
        entry.4 += 1;
    }

    let blobs = blobs
        .into_iter()
        .enumerate()
        .filter_map(|(label, stats)| {
            stats.map(|(x0, y0, x1, y1, area)| Blob {
                label: label as u32,
                bbox: BoundingBox {
                    x: x0,
                    y: y0,
                    width: x1 - x0 + 1,
                    height: y1 - y0 + 1,
                },
                area,
            })
        })
        .collect();

    (labels, blobs)
}

/// Polygon area by the shoelace formula
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut area = 0.0f64;
    for i in 0..n {
        let j = (i + 1) % n;
        area += points[i].x as f64 * points[j].y as f64;
        area -= points[j].x as f64 * points[i].y as f64;
    }
    area.abs() / 2.0
}

/// Outer contour with the largest enclosed area, with that area.
pub fn largest_outer_contour(mask: &GrayImage) -> Option<(Vec<Point<i32>>, f64)> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|contour| matches!(contour.border_type, BorderType::Outer))
        .map(|contour| {
            let area = polygon_area(&contour.points);
            (contour.points, area)
        })
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
}

/// Bounding box of a point set; `None` when empty.
pub fn points_bbox(points: &[Point<i32>]) -> Option<BoundingBox> {
    let min_x = points.iter().map(|p| p.x).min()?;
    let min_y = points.iter().map(|p| p.y).min()?;
    let max_x = points.iter().map(|p| p.x).max()?;
    let max_y = points.iter().map(|p| p.y).max()?;
    Some(BoundingBox {
        x: min_x.max(0) as u32,
        y: min_y.max(0) as u32,
        width: (max_x - min_x + 1) as u32,
        height: (max_y - min_y + 1) as u32,
    })
}
