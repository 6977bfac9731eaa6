use crate::error::Result;
use crate::preprocessing::channels;
use image::{DynamicImage, GrayImage, Luma};
use tracing::debug;

/// Sauvola dynamic range of the standard deviation (8-bit / 2)
const R: f64 = 128.0;
/// Smallest valid local window
const MIN_WINDOW: u32 = 3;

/// Thresholding strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BinarizeMethod {
    /// Global level (fixed value or histogram percentile)
    #[default]
    Threshold,
    /// Local mean minus an offset
    Adaptive,
    /// Local mean and standard deviation
    Sauvola,
}

impl BinarizeMethod {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "threshold" | "global" => Some(Self::Threshold),
            "adaptive" => Some(Self::Adaptive),
            "sauvola" => Some(Self::Sauvola),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinarizeParameters {
    pub method: BinarizeMethod,
    /// Fixed global level as a fraction of 255
    pub threshold_factor: f64,
    /// When set, the global level is the gray value at this percentile (0-100)
    pub threshold_percentile: Option<f64>,
    /// Adaptive window; adjusted to an odd size that fits the image
    pub block_size: u32,
    /// Subtracted from the adaptive local mean
    pub adaptive_offset: f64,
    /// Sauvola window; adjusted like `block_size`
    pub sauvola_window_size: u32,
    pub k: f64,
}

impl Default for BinarizeParameters {
    fn default() -> Self {
        Self {
            method: BinarizeMethod::Threshold,
            threshold_factor: 0.5,
            threshold_percentile: None,
            block_size: 15,
            adaptive_offset: 10.0,
            sauvola_window_size: 15,
            k: 0.2,
        }
    }
}

/// Binarize any supported image into a {0, 255} single-channel mask.
pub fn binarize(image: &DynamicImage, params: &BinarizeParameters) -> Result<DynamicImage> {
    channels::ensure_not_empty(image, "binarize")?;
    let gray = channels::to_gray(image)?;

    let binarized = match params.method {
        BinarizeMethod::Threshold => {
            let level = global_level(&gray, params);
            debug!(level, "Global threshold");
            global_threshold(&gray, level)
        }
        BinarizeMethod::Adaptive => {
            let window = effective_window(params.block_size, gray.width(), gray.height());
            debug!(requested = params.block_size, window, "Adaptive threshold");
            adaptive_threshold(&gray, window, params.adaptive_offset)
        }
        BinarizeMethod::Sauvola => {
            let window =
                effective_window(params.sauvola_window_size, gray.width(), gray.height());
            debug!(requested = params.sauvola_window_size, window, "Sauvola threshold");
            sauvola_threshold(&gray, window, params.k)
        }
    };

    Ok(DynamicImage::ImageLuma8(binarized))
}

/// Adjust a requested window to an odd size >= 3 that does not exceed the
/// smaller image dimension. Returns 1 when the image is too small for any
/// valid window.
pub fn effective_window(requested: u32, width: u32, height: u32) -> u32 {
    let mut size = requested.max(MIN_WINDOW);
    if size % 2 == 0 {
        size += 1;
    }
    let limit = width.min(height);
    let limit = if limit % 2 == 0 { limit.saturating_sub(1) } else { limit };
    size.min(limit).max(1)
}

fn global_level(gray: &GrayImage, params: &BinarizeParameters) -> f64 {
    match params.threshold_percentile {
        Some(pct) => percentile_level(gray, pct) as f64,
        None => params.threshold_factor.clamp(0.0, 1.0) * 255.0,
    }
}

/// Gray value at `pct` percent of the cumulative histogram
pub(crate) fn percentile_level(gray: &GrayImage, pct: f64) -> u8 {
    let mut histogram = [0u64; 256];
    for pixel in gray.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return 0;
    }
    let target = (pct.clamp(0.0, 100.0) / 100.0 * total as f64).ceil().max(1.0) as u64;
    let mut cumulative = 0u64;
    for (value, &count) in histogram.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return value as u8;
        }
    }
    255
}

fn global_threshold(gray: &GrayImage, level: f64) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        binary(gray.get_pixel(x, y).0[0] as f64 > level)
    })
}

fn binary(on: bool) -> Luma<u8> {
    if on {
        Luma([255u8])
    } else {
        Luma([0u8])
    }
}

/// Local mean thresholding: pixel > mean - offset becomes white
fn adaptive_threshold(img: &GrayImage, window_size: u32, offset: f64) -> GrayImage {
    let integrals = IntegralImages::new(img);
    let half = window_size / 2;

    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let (mean, _) = integrals.window_stats(x, y, half);
        binary(img.get_pixel(x, y).0[0] as f64 > mean - offset)
    })
}

/// Sauvola adaptive thresholding
///
/// For each pixel, threshold = mean * (1 + k * (std_dev / R - 1)).
/// A one-pixel window carries no local statistics, so the whole image is
/// used instead.
fn sauvola_threshold(img: &GrayImage, window_size: u32, k: f64) -> GrayImage {
    let (width, height) = img.dimensions();
    let integrals = IntegralImages::new(img);

    if window_size <= 1 {
        let (mean, std_dev) = integrals.rect_stats(0, 0, width, height);
        let threshold = mean * (1.0 + k * (std_dev / R - 1.0));
        return global_threshold(img, threshold);
    }

    let half = window_size / 2;
    GrayImage::from_fn(width, height, |x, y| {
        let (mean, std_dev) = integrals.window_stats(x, y, half);
        let threshold = mean * (1.0 + k * (std_dev / R - 1.0));
        binary(img.get_pixel(x, y).0[0] as f64 > threshold)
    })
}

/// Integral image and integral of squared values, `(w+1) x (h+1)` with a
/// zero border
struct IntegralImages {
    stride: usize,
    width: u32,
    height: u32,
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
}

impl IntegralImages {
    fn new(img: &GrayImage) -> Self {
        let (width, height) = img.dimensions();
        let stride = width as usize + 1;
        let mut sum = vec![0.0f64; stride * (height as usize + 1)];
        let mut sum_sq = vec![0.0f64; stride * (height as usize + 1)];

        for y in 0..height as usize {
            let mut row = 0.0;
            let mut row_sq = 0.0;
            for x in 0..width as usize {
                let val = img.get_pixel(x as u32, y as u32).0[0] as f64;
                row += val;
                row_sq += val * val;
                let idx = (y + 1) * stride + x + 1;
                sum[idx] = row + sum[idx - stride];
                sum_sq[idx] = row_sq + sum_sq[idx - stride];
            }
        }

        Self {
            stride,
            width,
            height,
            sum,
            sum_sq,
        }
    }

    /// Mean and standard deviation of the window of radius `half` around
    /// (x, y), clipped to the image.
    fn window_stats(&self, x: u32, y: u32, half: u32) -> (f64, f64) {
        let x1 = x.saturating_sub(half);
        let y1 = y.saturating_sub(half);
        let x2 = (x + half + 1).min(self.width);
        let y2 = (y + half + 1).min(self.height);
        self.rect_stats(x1, y1, x2, y2)
    }

    /// Statistics over the half-open rectangle [x1, x2) x [y1, y2)
    fn rect_stats(&self, x1: u32, y1: u32, x2: u32, y2: u32) -> (f64, f64) {
        let (x1, y1, x2, y2) = (x1 as usize, y1 as usize, x2 as usize, y2 as usize);
        let area = ((x2 - x1) * (y2 - y1)) as f64;
        if area == 0.0 {
            return (0.0, 0.0);
        }
        let s = self.stride;
        let sum = self.sum[y2 * s + x2] - self.sum[y1 * s + x2] - self.sum[y2 * s + x1]
            + self.sum[y1 * s + x1];
        let sum_sq = self.sum_sq[y2 * s + x2] - self.sum_sq[y1 * s + x2]
            - self.sum_sq[y2 * s + x1]
            + self.sum_sq[y1 * s + x1];

        let mean = sum / area;
        let variance = (sum_sq / area) - (mean * mean);
        (mean, variance.max(0.0).sqrt())
    }
}
