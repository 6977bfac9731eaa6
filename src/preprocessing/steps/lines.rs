use crate::error::Result;
use crate::preprocessing::blobs::content_mask;
use crate::preprocessing::channels;
use crate::preprocessing::inpaint::inpaint_image;
use crate::preprocessing::morphology::{dilate_brick, open_brick};
use image::{DynamicImage, GrayImage, Luma};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct LineOptions {
    /// Shortest run treated as a ruling line
    pub min_length: u32,
    pub horizontal: bool,
    pub vertical: bool,
}

impl Default for LineOptions {
    fn default() -> Self {
        Self {
            min_length: 50,
            horizontal: true,
            vertical: true,
        }
    }
}

/// Erase long horizontal/vertical rulings (form lines, table grids) and fill
/// them from the surrounding background.
pub fn remove_lines(image: &DynamicImage, options: &LineOptions) -> Result<DynamicImage> {
    channels::layout_of(image)?;
    channels::ensure_not_empty(image, "remove lines")?;
    let gray = channels::to_gray(image)?;

    let Some(mask) = line_mask(&gray, options) else {
        return channels::normalize(image);
    };
    let grown = dilate_brick(&mask, 3, 3);
    debug!(
        pixels = grown.pixels().filter(|p| p.0[0] > 0).count(),
        "Line pixels"
    );
    inpaint_image(image, &grown)
}

/// Foreground pixels lying on a run of at least `min_length`; `None` when
/// there are none.
pub fn line_mask(gray: &GrayImage, options: &LineOptions) -> Option<GrayImage> {
    let content = content_mask(gray)?;
    let length = options.min_length.max(2);
    let (w, h) = gray.dimensions();

    let horizontal = options
        .horizontal
        .then(|| open_brick(&content, length, 1));
    let vertical = options.vertical.then(|| open_brick(&content, 1, length));

    let on = |mask: &Option<GrayImage>, x: u32, y: u32| {
        mask.as_ref().is_some_and(|m| m.get_pixel(x, y).0[0] > 0)
    };
    let lines = GrayImage::from_fn(w, h, |x, y| {
        Luma([if on(&horizontal, x, y) || on(&vertical, x, y) { 255 } else { 0 }])
    });
    lines.pixels().any(|p| p.0[0] > 0).then_some(lines)
}
