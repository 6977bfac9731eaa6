use crate::cancel::CancellationToken;
use crate::error::{ProcessingError, Result};
use crate::preprocessing::channels::{self, Layout};
use crate::preprocessing::color::lightness_8u;
use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use imageproc::filter::gaussian_blur_f32;
use tracing::debug;

/// Below this spread a signal is treated as flat
const FLAT_EPSILON: f32 = 1e-6;
/// Largest accepted Gaussian sigma, in pixels
pub const MAX_SIGMA: f32 = 1000.0;

/// Single-channel f32 plane holding the log-domain signal
type LogImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// What the homomorphic filter output is normalized from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetinexOutput {
    /// The filtered log-domain signal
    #[default]
    Filtered,
    /// `exp` of the filtered signal, back in the intensity domain
    ReconstructExp,
}

impl RetinexOutput {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "filtered" => Some(Self::Filtered),
            "reconstructexp" | "reconstruct_exp" | "exp" => Some(Self::ReconstructExp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetinexOptions {
    pub output_mode: RetinexOutput,
    /// Use Lab lightness instead of plain luma as the illumination channel
    pub use_lab_l: bool,
    /// Percentile clipping instead of min-max scaling
    pub robust_normalize: bool,
    /// Gaussian sigma separating illumination (low) from reflectance (high)
    pub sigma: f32,
    /// Gain applied to the low-frequency component (< 1 attenuates)
    pub gamma_low: f32,
    /// Gain applied to the high-frequency component
    pub gamma_high: f32,
    /// Percentile clip bounds for robust normalization (0-100)
    pub low_pct: f32,
    pub high_pct: f32,
}

impl Default for RetinexOptions {
    fn default() -> Self {
        Self {
            output_mode: RetinexOutput::Filtered,
            use_lab_l: true,
            robust_normalize: true,
            sigma: 15.0,
            gamma_low: 0.5,
            gamma_high: 1.5,
            low_pct: 1.0,
            high_pct: 99.0,
        }
    }
}

/// Homomorphic retinex illumination correction.
///
/// Always returns a single-channel image with the input's dimensions; an empty
/// input yields an empty output. `sigma` must lie in `(0, MAX_SIGMA]`; a blur
/// wider than the image is capped at the image's larger side.
pub fn homomorphic_retinex(
    cancel: &CancellationToken,
    image: &DynamicImage,
    options: &RetinexOptions,
) -> Result<DynamicImage> {
    cancel.check()?;
    let layout = channels::layout_of(image)?;
    validate_sigma(options.sigma)?;
    let (w, h) = (image.width(), image.height());
    if channels::is_empty(image) {
        return Ok(DynamicImage::ImageLuma8(GrayImage::new(w, h)));
    }

    let log = log_illumination(image, layout, options.use_lab_l)?;

    cancel.check()?;
    let sigma = options.sigma.min(w.max(h) as f32);
    let low = gaussian_blur_f32(&log, sigma);
    let filtered: Vec<f32> = log
        .as_raw()
        .iter()
        .zip(low.as_raw())
        .map(|(&x, &l)| options.gamma_low * l + options.gamma_high * (x - l))
        .collect();

    cancel.check()?;
    let signal = match options.output_mode {
        RetinexOutput::Filtered => filtered,
        RetinexOutput::ReconstructExp => filtered.iter().map(|v| v.exp_m1()).collect(),
    };

    cancel.check()?;
    let (lo, hi) = if options.robust_normalize {
        percentile_range(&signal, options.low_pct, options.high_pct)
    } else {
        min_max(&signal)
    };
    debug!(lo, hi, mode = ?options.output_mode, "Retinex normalization range");

    let out = to_8u(&signal, w, h, lo, hi);
    Ok(DynamicImage::ImageLuma8(out))
}

/// Check a Gaussian sigma taken from caller input
pub fn validate_sigma(sigma: f32) -> Result<()> {
    if sigma.is_finite() && sigma > 0.0 && sigma <= MAX_SIGMA {
        Ok(())
    } else {
        Err(ProcessingError::InvalidArgument(format!(
            "retinex sigma must be in (0, {MAX_SIGMA}], got {sigma}"
        )))
    }
}

/// `ln(1 + v)` of the illumination channel: Lab lightness or plain luma
fn log_illumination(image: &DynamicImage, layout: Layout, use_lab_l: bool) -> Result<LogImage> {
    let log = |v: f32| Luma([v.ln_1p()]);
    let plane = match (use_lab_l, layout) {
        (false, _) => {
            let gray = channels::to_gray(image)?;
            LogImage::from_fn(gray.width(), gray.height(), |x, y| {
                log(gray.get_pixel(x, y).0[0] as f32)
            })
        }
        (true, Layout::Gray) => {
            let gray = channels::to_gray(image)?;
            LogImage::from_fn(gray.width(), gray.height(), |x, y| {
                let v = gray.get_pixel(x, y).0[0];
                log(lightness_8u([v, v, v]))
            })
        }
        (true, Layout::Color) => {
            let rgb = channels::to_rgb(image)?;
            LogImage::from_fn(rgb.width(), rgb.height(), |x, y| {
                log(lightness_8u(rgb.get_pixel(x, y).0))
            })
        }
    };
    Ok(plane)
}

fn min_max(values: &[f32]) -> (f32, f32) {
    values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

/// Values at the given percentiles; falls back to min-max when the clipped
/// range collapses.
fn percentile_range(values: &[f32], low_pct: f32, high_pct: f32) -> (f32, f32) {
    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);
    let n = sorted.len();
    let at = |pct: f32| {
        let pos = (pct.clamp(0.0, 100.0) / 100.0 * (n - 1) as f32).round() as usize;
        sorted[pos.min(n - 1)]
    };
    let (lo, hi) = (at(low_pct.min(high_pct)), at(low_pct.max(high_pct)));
    if hi - lo <= FLAT_EPSILON {
        (sorted[0], sorted[n - 1])
    } else {
        (lo, hi)
    }
}

fn to_8u(values: &[f32], w: u32, h: u32, lo: f32, hi: f32) -> GrayImage {
    let range = hi - lo;
    GrayImage::from_fn(w, h, |x, y| {
        if range <= FLAT_EPSILON {
            return Luma([0]);
        }
        let v = values[(y * w + x) as usize];
        Luma([((v - lo) / range * 255.0).round().clamp(0.0, 255.0) as u8])
    })
}
