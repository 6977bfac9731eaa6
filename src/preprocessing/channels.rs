use crate::error::{ProcessingError, Result};
use image::{DynamicImage, GrayImage, RgbImage};

/// Semantic class of a supported 8-bit layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// One channel
    Gray,
    /// Three channels, or four with alpha
    Color,
}

/// Classify an image, rejecting anything that is not 8-bit 1/3/4-channel.
pub fn layout_of(image: &DynamicImage) -> Result<Layout> {
    match image {
        DynamicImage::ImageLuma8(_) => Ok(Layout::Gray),
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => Ok(Layout::Color),
        other => Err(ProcessingError::InvalidArgument(format!(
            "unsupported pixel layout {:?} (expected 8-bit with 1, 3 or 4 channels)",
            other.color()
        ))),
    }
}

pub fn is_empty(image: &DynamicImage) -> bool {
    image.width() == 0 || image.height() == 0
}

/// Fail with `InvalidState` when the image holds no pixels.
pub fn ensure_not_empty(image: &DynamicImage, operation: &str) -> Result<()> {
    if is_empty(image) {
        return Err(ProcessingError::InvalidState(format!(
            "{operation} requires a non-empty image"
        )));
    }
    Ok(())
}

/// Convert any supported layout to single-channel grayscale (Rec. 709 luma).
/// Alpha is ignored.
pub fn to_gray(image: &DynamicImage) -> Result<GrayImage> {
    layout_of(image)?;
    Ok(image.to_luma8())
}

/// Convert any supported layout to three-channel color, dropping alpha.
pub fn to_rgb(image: &DynamicImage) -> Result<RgbImage> {
    layout_of(image)?;
    Ok(image.to_rgb8())
}

/// Copy into the canonical layout: gray stays gray, color becomes RGB.
pub fn normalize(image: &DynamicImage) -> Result<DynamicImage> {
    match layout_of(image)? {
        Layout::Gray => Ok(DynamicImage::ImageLuma8(to_gray(image)?)),
        Layout::Color => Ok(DynamicImage::ImageRgb8(to_rgb(image)?)),
    }
}
