use crate::cancel::CancellationToken;
use crate::error::{ProcessingError, Result};
use crate::preprocessing::steps::threshold::percentile_level;
use image::{DynamicImage, GrayImage, Luma};
use tracing::debug;

/// Neutral gamma: the levels stretch is applied unchanged
pub const DEFAULT_GAMMA: f64 = 1.0;

/// Percentile levels stretch followed by gamma correction.
///
/// Accepts single-channel 8-bit input only. `black_pct` and `white_pct` are
/// percentages (0-100) of the cumulative histogram.
pub fn levels_and_gamma_8u(
    image: &DynamicImage,
    cancel: &CancellationToken,
    black_pct: f64,
    white_pct: f64,
) -> Result<DynamicImage> {
    levels_and_gamma_8u_with(image, cancel, black_pct, white_pct, DEFAULT_GAMMA)
}

/// [`levels_and_gamma_8u`] with an explicit gamma (> 1 brightens mid-tones).
pub fn levels_and_gamma_8u_with(
    image: &DynamicImage,
    cancel: &CancellationToken,
    black_pct: f64,
    white_pct: f64,
    gamma: f64,
) -> Result<DynamicImage> {
    let DynamicImage::ImageLuma8(gray) = image else {
        return Err(ProcessingError::InvalidArgument(format!(
            "levels and gamma require single-channel 8-bit input, got {:?}",
            image.color()
        )));
    };
    cancel.check()?;
    if gray.width() == 0 || gray.height() == 0 {
        return Ok(DynamicImage::ImageLuma8(gray.clone()));
    }

    let (black, white) = clip_levels(gray, black_pct, white_pct);
    let gamma = if gamma.is_finite() && gamma > 0.0 {
        gamma
    } else {
        DEFAULT_GAMMA
    };
    debug!(black, white, gamma, "Levels");

    let lut = levels_lut(black, white, gamma);
    let out = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        Luma([lut[gray.get_pixel(x, y).0[0] as usize]])
    });
    Ok(DynamicImage::ImageLuma8(out))
}

/// Ordered, non-degenerate black/white levels
fn clip_levels(gray: &GrayImage, black_pct: f64, white_pct: f64) -> (u8, u8) {
    let a = percentile_level(gray, sanitize_pct(black_pct, 0.0));
    let b = percentile_level(gray, sanitize_pct(white_pct, 100.0));
    let (black, white) = (a.min(b), a.max(b));
    if black < white {
        (black, white)
    } else if white < 255 {
        (black, white + 1)
    } else {
        (black - 1, white)
    }
}

fn sanitize_pct(pct: f64, fallback: f64) -> f64 {
    if pct.is_finite() {
        pct.clamp(0.0, 100.0)
    } else {
        fallback
    }
}

fn levels_lut(black: u8, white: u8, gamma: f64) -> [u8; 256] {
    let range = (white - black) as f64;
    let inv_gamma = 1.0 / gamma;
    let mut lut = [0u8; 256];
    for (i, out) in lut.iter_mut().enumerate() {
        let x = ((i as f64 - black as f64) / range).clamp(0.0, 1.0);
        *out = (255.0 * x.powf(inv_gamma)).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn find_min_max(img: &GrayImage) -> (u8, u8) {
        let mut min = 255u8;
        let mut max = 0u8;
        for pixel in img.pixels() {
            min = min.min(pixel.0[0]);
            max = max.max(pixel.0[0]);
        }
        (min, max)
    }

    #[test]
    fn test_levels_stretch_histogram() {
        let img = GrayImage::from_fn(10, 10, |x, _| Luma([50 + (x as u8 * 15).min(150)]));

        let result = levels_and_gamma_8u(
            &DynamicImage::ImageLuma8(img),
            &CancellationToken::new(),
            0.0,
            100.0,
        )
        .unwrap()
        .to_luma8();

        assert_eq!(find_min_max(&result), (0, 255));
    }

    #[test]
    fn test_handles_uniform_image() {
        let img = GrayImage::from_pixel(10, 10, Luma([128]));
        let result = levels_and_gamma_8u(
            &DynamicImage::ImageLuma8(img),
            &CancellationToken::new(),
            1.0,
            99.0,
        )
        .unwrap()
        .to_luma8();
        assert_eq!(result.dimensions(), (10, 10));
    }

    #[test]
    fn test_inverted_percentiles_do_not_crash() {
        let img = GrayImage::from_fn(16, 16, |x, y| Luma([(x * 16 + y) as u8]));
        let result = levels_and_gamma_8u(
            &DynamicImage::ImageLuma8(img),
            &CancellationToken::new(),
            90.0,
            10.0,
        )
        .unwrap()
        .to_luma8();
        assert_eq!(find_min_max(&result), (0, 255));
    }

    #[test]
    fn test_white_saturated_image() {
        let img = GrayImage::from_pixel(4, 4, Luma([255]));
        let result = levels_and_gamma_8u(
            &DynamicImage::ImageLuma8(img),
            &CancellationToken::new(),
            50.0,
            50.0,
        )
        .unwrap()
        .to_luma8();
        assert!(result.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn test_gamma_brightens_midtones() {
        let img = GrayImage::from_fn(256, 1, |x, _| Luma([x as u8]));
        let token = CancellationToken::new();
        let plain = levels_and_gamma_8u(&DynamicImage::ImageLuma8(img.clone()), &token, 0.0, 100.0)
            .unwrap()
            .to_luma8();
        let bright =
            levels_and_gamma_8u_with(&DynamicImage::ImageLuma8(img), &token, 0.0, 100.0, 2.0)
                .unwrap()
                .to_luma8();
        assert!(bright.get_pixel(128, 0).0[0] > plain.get_pixel(128, 0).0[0]);
    }

    #[test]
    fn test_rejects_color_input() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([1, 2, 3])));
        assert!(matches!(
            levels_and_gamma_8u(&img, &CancellationToken::new(), 1.0, 99.0),
            Err(ProcessingError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_pre_cancelled_token() {
        let token = CancellationToken::new();
        token.cancel();
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([9])));
        assert_eq!(
            levels_and_gamma_8u(&img, &token, 1.0, 99.0),
            Err(ProcessingError::Cancelled)
        );
    }
}
