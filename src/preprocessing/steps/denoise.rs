use crate::error::Result;
use crate::preprocessing::channels::{self, Layout};
use image::DynamicImage;
use imageproc::filter::median_filter;
use tracing::debug;

/// Largest median radius accepted from command parameters
pub const MAX_DESPECKLE_RADIUS: u32 = 64;

/// Median filter over a `(2 * radius + 1)` square window.
/// Removes salt-and-pepper specks while keeping stroke edges. The radius is
/// clamped to `1..=min(width, height)`.
pub fn despeckle(image: &DynamicImage, radius: u32) -> Result<DynamicImage> {
    let layout = channels::layout_of(image)?;
    channels::ensure_not_empty(image, "despeckle")?;
    let radius = radius.clamp(1, image.width().min(image.height()).max(1));
    debug!(radius, "Despeckle");

    let out = match layout {
        Layout::Gray => {
            let gray = channels::to_gray(image)?;
            DynamicImage::ImageLuma8(median_filter(&gray, radius, radius))
        }
        Layout::Color => {
            let rgb = channels::to_rgb(image)?;
            DynamicImage::ImageRgb8(median_filter(&rgb, radius, radius))
        }
    };
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessingError;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    #[test]
    fn test_despeckle_reduces_salt_pepper_noise() {
        let mut img = GrayImage::from_pixel(10, 10, Luma([128]));
        img.put_pixel(5, 5, Luma([0]));
        img.put_pixel(6, 5, Luma([255]));

        let result = despeckle(&DynamicImage::ImageLuma8(img.clone()), 1).unwrap();
        let result_gray = result.to_luma8();

        assert!(calculate_variance(&result_gray) <= calculate_variance(&img));
        assert_eq!(result_gray.get_pixel(5, 5).0[0], 128);
    }

    #[test]
    fn test_color_stays_color() {
        let mut img = RgbImage::from_pixel(9, 9, Rgb([200, 190, 180]));
        img.put_pixel(4, 4, Rgb([0, 0, 0]));
        let result = despeckle(&DynamicImage::ImageRgb8(img), 1).unwrap();
        let DynamicImage::ImageRgb8(rgb) = result else {
            panic!("expected RGB output");
        };
        assert_eq!(rgb.get_pixel(4, 4).0, [200, 190, 180]);
    }

    #[test]
    fn test_huge_radius_is_clamped() {
        let mut img = GrayImage::from_pixel(8, 8, Luma([100]));
        img.put_pixel(3, 3, Luma([255]));
        let result = despeckle(&DynamicImage::ImageLuma8(img), 4_000_000_000).unwrap();
        let gray = result.to_luma8();
        assert_eq!(gray.dimensions(), (8, 8));
        assert!(gray.pixels().all(|p| p.0[0] == 100));
    }

    #[test]
    fn test_rejects_empty() {
        assert!(matches!(
            despeckle(&DynamicImage::ImageLuma8(GrayImage::new(0, 3)), 1),
            Err(ProcessingError::InvalidState(_))
        ));
    }

    fn calculate_variance(img: &GrayImage) -> f64 {
        let pixels: Vec<f64> = img.pixels().map(|p| p.0[0] as f64).collect();
        let mean = pixels.iter().sum::<f64>() / pixels.len() as f64;
        pixels.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / pixels.len() as f64
    }
}
