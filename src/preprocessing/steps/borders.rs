use crate::error::Result;
use crate::preprocessing::channels::{self, Layout};
use image::{DynamicImage, GrayImage, Luma, Rgb};
use imageproc::contrast::otsu_level;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct BorderOptions {
    /// A row or column belongs to the border while at least this fraction of
    /// it is dark
    pub dark_fraction: f64,
    /// Widest border strip, as a fraction of the image dimension
    pub max_fraction: f64,
}

impl Default for BorderOptions {
    fn default() -> Self {
        Self {
            dark_fraction: 0.6,
            max_fraction: 0.2,
        }
    }
}

/// Strip widths found on each side
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Borders {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

impl Borders {
    fn contains(&self, x: u32, y: u32, width: u32, height: u32) -> bool {
        y < self.top || y >= height - self.bottom || x < self.left || x >= width - self.right
    }
}

/// Paint the dark scanner/copier frame around a page white.
pub fn remove_borders(image: &DynamicImage, options: &BorderOptions) -> Result<DynamicImage> {
    let layout = channels::layout_of(image)?;
    channels::ensure_not_empty(image, "remove borders")?;
    let gray = channels::to_gray(image)?;
    let borders = detect_borders(&gray, options);
    debug!(?borders, "Border strips");

    let (w, h) = gray.dimensions();
    let out = match layout {
        Layout::Gray => {
            let mut out = gray;
            for (x, y, p) in out.enumerate_pixels_mut() {
                if borders.contains(x, y, w, h) {
                    *p = Luma([255]);
                }
            }
            DynamicImage::ImageLuma8(out)
        }
        Layout::Color => {
            let mut out = channels::to_rgb(image)?;
            for (x, y, p) in out.enumerate_pixels_mut() {
                if borders.contains(x, y, w, h) {
                    *p = Rgb([255, 255, 255]);
                }
            }
            DynamicImage::ImageRgb8(out)
        }
    };
    Ok(out)
}

/// Scan inward from every edge while the row/column is dominated by dark
/// pixels. A flat page has no border.
pub fn detect_borders(gray: &GrayImage, options: &BorderOptions) -> Borders {
    let (w, h) = gray.dimensions();
    let (min, max) = gray
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));
    if min >= max {
        return Borders::default();
    }
    let level = otsu_level(gray);
    let is_dark = |x: u32, y: u32| gray.get_pixel(x, y).0[0] <= level;

    let row_dark = |y: u32| (0..w).filter(|&x| is_dark(x, y)).count() as f64 / w as f64;
    let col_dark = |x: u32| (0..h).filter(|&y| is_dark(x, y)).count() as f64 / h as f64;

    let max_rows = (h as f64 * options.max_fraction.clamp(0.0, 0.5)) as u32;
    let max_cols = (w as f64 * options.max_fraction.clamp(0.0, 0.5)) as u32;
    let threshold = options.dark_fraction;

    Borders {
        top: leading_run(max_rows, threshold, row_dark),
        bottom: leading_run(max_rows, threshold, |i| row_dark(h - 1 - i)),
        left: leading_run(max_cols, threshold, col_dark),
        right: leading_run(max_cols, threshold, |i| col_dark(w - 1 - i)),
    }
}

fn leading_run(limit: u32, threshold: f64, dark: impl Fn(u32) -> f64) -> u32 {
    (0..limit).take_while(|&i| dark(i) >= threshold).count() as u32
}
