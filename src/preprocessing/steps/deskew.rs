use crate::error::Result;
use crate::preprocessing::blobs::{content_mask, largest_outer_contour, points_bbox, BoundingBox};
use crate::preprocessing::channels::{self, Layout};
use crate::preprocessing::morphology::close_brick;
use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Pixel, Rgb};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use imageproc::geometry::min_area_rect;
use imageproc::point::Point;
use tracing::{debug, info};

/// Content blobs smaller than this fraction of the page are ignored
const MIN_AREA_FRACTION: f64 = 0.001;
/// Margin kept around the content after rotation
const CROP_MARGIN: u32 = 10;

/// Estimate the skew of the dominant content block, rotate it level on an
/// expanded white canvas and crop back to the content.
///
/// Pages without a usable content blob come back unchanged (as a new buffer).
pub fn deskew(image: &DynamicImage) -> Result<DynamicImage> {
    let layout = channels::layout_of(image)?;
    channels::ensure_not_empty(image, "deskew")?;
    let gray = channels::to_gray(image)?;

    let Some(angle) = estimate_skew(&gray) else {
        debug!("No dominant content blob, skipping deskew");
        return channels::normalize(image);
    };
    info!(angle_degrees = angle, "Deskewing");

    let rotated = match layout {
        Layout::Gray => DynamicImage::ImageLuma8(rotate_on_canvas(&gray, -angle, Luma([255]))),
        Layout::Color => {
            let rgb = channels::to_rgb(image)?;
            DynamicImage::ImageRgb8(rotate_on_canvas(&rgb, -angle, Rgb([255, 255, 255])))
        }
    };

    let rotated_gray = channels::to_gray(&rotated)?;
    let (w, h) = rotated_gray.dimensions();
    let closing = (w / 40).max(7);
    match content_bbox(&rotated_gray, closing) {
        Some(bbox) => {
            let crop = bbox.expanded(CROP_MARGIN, w, h);
            debug!(?crop, "Cropping deskewed content");
            Ok(rotated.crop_imm(crop.x, crop.y, crop.width, crop.height))
        }
        None => Ok(rotated),
    }
}

/// Skew of the largest content block in degrees.
///
/// Positive angles mean the content runs downhill to the right (image
/// coordinates, y down). Wide blocks land in [-45, 45); a block taller than
/// it is wide reads as a quarter turn off level, see [`rect_skew`]. `None`
/// when the page is flat or has no block covering at least 0.1% of its area.
pub fn estimate_skew(gray: &GrayImage) -> Option<f32> {
    let (w, h) = gray.dimensions();
    let mask = content_mask(gray)?;
    let closed = close_brick(&mask, (w / 20).max(15), 3);

    let (points, area) = largest_outer_contour(&closed)?;
    let page_area = w as f64 * h as f64;
    if area < page_area * MIN_AREA_FRACTION {
        debug!(area, page_area, "Largest blob too small");
        return None;
    }

    rect_skew(&min_area_rect(&points))
}

/// Skew of a rotated rectangle given as [top left, top right, bottom right,
/// bottom left] corners.
///
/// The side whose direction falls in [-90, 0) is the rectangle's width and
/// sets the angle; 90 is added when that width is smaller than the height.
/// `None` for a single point.
fn rect_skew(corners: &[Point<i32>; 4]) -> Option<f32> {
    let side = |a: Point<i32>, b: Point<i32>| ((b.x - a.x) as f32, (b.y - a.y) as f32);
    let length = |(dx, dy): (f32, f32)| dx.hypot(dy);
    let (first, second) = (side(corners[0], corners[1]), side(corners[1], corners[2]));
    let (edge, other) = if length(first) > 0.0 {
        (first, second)
    } else {
        (second, first)
    };
    if length(edge) == 0.0 {
        return None;
    }
    let direction = edge.1.atan2(edge.0).to_degrees();
    Some(normalize_rect_angle(direction, length(edge), length(other)))
}

/// `direction` is the heading of a side of length `along`; the adjacent side
/// has length `across`.
fn normalize_rect_angle(direction: f32, along: f32, across: f32) -> f32 {
    let folded = (direction + 90.0).rem_euclid(180.0) - 90.0;
    let (angle, width, height) = if folded < 0.0 {
        (folded, along, across)
    } else {
        (folded - 90.0, across, along)
    };
    if width < height {
        angle + 90.0
    } else {
        angle
    }
}

fn content_bbox(gray: &GrayImage, closing_width: u32) -> Option<BoundingBox> {
    let mask = content_mask(gray)?;
    let closed = close_brick(&mask, closing_width, 3);
    let (points, _) = largest_outer_contour(&closed)?;
    points_bbox(&points)
}

/// Rotate by `degrees` about the image center onto a canvas large enough to
/// hold every source pixel, filling exposed background with `fill`.
fn rotate_on_canvas<P>(
    image: &ImageBuffer<P, Vec<u8>>,
    degrees: f32,
    fill: P,
) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + Send + Sync,
{
    let (w, h) = image.dimensions();
    let theta = degrees.to_radians();
    let (sin, cos) = (theta.sin().abs(), theta.cos().abs());
    let new_w = (w as f32 * cos + h as f32 * sin).round().max(1.0) as u32;
    let new_h = (w as f32 * sin + h as f32 * cos).round().max(1.0) as u32;

    let projection = Projection::translate(new_w as f32 / 2.0, new_h as f32 / 2.0)
        * Projection::rotate(theta)
        * Projection::translate(-(w as f32) / 2.0, -(h as f32) / 2.0);

    let mut out = ImageBuffer::from_pixel(new_w, new_h, fill);
    warp_into(image, &projection, Interpolation::Bilinear, fill, &mut out);
    out
}
