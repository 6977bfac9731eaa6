use crate::error::Result;
use crate::preprocessing::blobs::{content_mask, label_blobs};
use crate::preprocessing::channels;
use crate::preprocessing::inpaint::inpaint_image;
use crate::preprocessing::morphology::dilate_brick;
use image::{DynamicImage, GrayImage, Luma};
use std::collections::HashSet;
use tracing::debug;

/// Remove isolated dark components whose bounding box fits in a
/// `max_size` x `max_size` square.
pub fn remove_dots(image: &DynamicImage, max_size: u32) -> Result<DynamicImage> {
    channels::layout_of(image)?;
    channels::ensure_not_empty(image, "remove dots")?;
    let gray = channels::to_gray(image)?;

    let Some(mask) = content_mask(&gray) else {
        return channels::normalize(image);
    };
    let (labels, blobs) = label_blobs(&mask);
    let dots: HashSet<u32> = blobs
        .iter()
        .filter(|b| b.bbox.width <= max_size && b.bbox.height <= max_size)
        .map(|b| b.label)
        .collect();
    debug!(dots = dots.len(), components = blobs.len(), "Dot removal");
    if dots.is_empty() {
        return channels::normalize(image);
    }

    let dot_mask = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        Luma([if dots.contains(&labels.get_pixel(x, y).0[0]) { 255 } else { 0 }])
    });
    inpaint_image(image, &dilate_brick(&dot_mask, 3, 3))
}
