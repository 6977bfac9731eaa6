use crate::error::Result;
use crate::preprocessing::blobs::{content_mask, label_blobs, BoundingBox};
use crate::preprocessing::channels;
use image::DynamicImage;
use tracing::debug;

/// Crop to the union of all content blobs plus `margin` on each side.
///
/// A page without content comes back unchanged.
pub fn smart_crop(image: &DynamicImage, margin: u32) -> Result<DynamicImage> {
    channels::layout_of(image)?;
    channels::ensure_not_empty(image, "smart crop")?;
    let normalized = channels::normalize(image)?;
    let gray = channels::to_gray(image)?;

    let Some(mask) = content_mask(&gray) else {
        return Ok(normalized);
    };
    let (_, blobs) = label_blobs(&mask);
    let Some(content) = blobs
        .iter()
        .map(|blob| blob.bbox)
        .reduce(|acc, bbox| acc.union(&bbox))
    else {
        return Ok(normalized);
    };

    let BoundingBox {
        x,
        y,
        width,
        height,
    } = content.expanded(margin, gray.width(), gray.height());
    debug!(x, y, width, height, blobs = blobs.len(), "Smart crop");
    Ok(normalized.crop_imm(x, y, width, height))
}
