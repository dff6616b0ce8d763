//! Gaussian blur and colour bilateral filter on top of `imageproc::filter`.
//! Borders replicate the outermost pixels. Filtering runs on `f32`
//! subpixels and rounds once at the end.

use crate::RasterImage;
use image::{Pixel, RgbImage};
use imageproc::{
    definitions::Image,
    filter::{self, bilateral::GaussianEuclideanColorDistance},
    map::{ChannelMap, WithChannel, map_subpixels},
};

/// Odd window size, at least 3.
pub fn coerce_odd(size: u32) -> u32 {
    let size = size.max(3);
    if size % 2 == 0 { size.saturating_add(1) } else { size }
}

/// Longest window worth running on a `width x height` image; every tap past
/// it reads a replicated border pixel.
pub fn max_window(width: u32, height: u32) -> u32 {
    width.max(height).saturating_mul(2).saturating_add(1)
}

/// Odd window no longer than [`max_window`].
pub fn fit_window(size: u32, width: u32, height: u32) -> u32 {
    let limit = max_window(width, height);
    let fitted = coerce_odd(size.min(limit));
    if fitted != size {
        log::debug!("window {size} -> {fitted} for {width}x{height}");
    }
    fitted
}

pub fn gaussian_kernel(size: usize, sigma: f32) -> Vec<f32> {
    let center = (size as f32 - 1.0) / 2.0;
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        // sigma derived from the kernel size
        0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8
    };

    let mut kernel = (0..size)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect::<Vec<f32>>();

    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= sum);
    kernel
}

fn to_byte(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Separable Gaussian blur with an explicit kernel size.
pub fn gaussian_blur<P>(image: &Image<P>, kernel_size: u32, sigma: f32) -> Image<P>
where
    P: Pixel<Subpixel = u8> + WithChannel<f32>,
    ChannelMap<P, f32>: WithChannel<u8, Pixel = P>,
{
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    let size = fit_window(kernel_size, width, height);
    let kernel = gaussian_kernel(size as usize, sigma);

    let lifted = map_subpixels(image, f32::from);
    let blurred = filter::separable_filter_equal(&lifted, &kernel);
    map_subpixels(&blurred, to_byte)
}

/// [`gaussian_blur`] over every channel of a raster, alpha included.
pub fn gaussian_blur_raster(image: &RasterImage, kernel_size: u32, sigma: f32) -> RasterImage {
    match image.channels() {
        4 => RasterImage::from(gaussian_blur(&image.to_rgba8(), kernel_size, sigma)),
        _ => RasterImage::from(gaussian_blur(&image.to_rgb8(), kernel_size, sigma)),
    }
}

/// Edge-preserving smoothing over a square window of the given diameter.
pub fn bilateral_filter(
    image: &RgbImage,
    diameter: u32,
    sigma_color: f32,
    sigma_space: f32,
) -> RgbImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    let sigma_color = if sigma_color > 0.0 { sigma_color } else { 1.0 };
    let sigma_space = if sigma_space > 0.0 { sigma_space } else { 1.0 };
    let radius = (fit_window(diameter.max(1), width, height) / 2).min(u8::MAX as u32) as u8;

    let lifted = map_subpixels(image, f32::from);
    let smoothed = filter::bilateral_filter(
        &lifted,
        radius,
        sigma_space,
        GaussianEuclideanColorDistance::new(sigma_color),
    );
    map_subpixels(&smoothed, to_byte)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb};

    #[test]
    fn test_coerce_odd() {
        assert_eq!(coerce_odd(0), 3);
        assert_eq!(coerce_odd(2), 3);
        assert_eq!(coerce_odd(3), 3);
        assert_eq!(coerce_odd(8), 9);
        assert_eq!(coerce_odd(175), 175);
        assert_eq!(coerce_odd(u32::MAX), u32::MAX);
    }

    #[test]
    fn test_fit_window_is_bounded_by_image() {
        assert_eq!(max_window(8, 6), 17);
        assert_eq!(fit_window(175, 8, 6), 17);
        assert_eq!(fit_window(u32::MAX, 8, 6), 17);
        assert_eq!(fit_window(6, 100, 100), 7);
        assert_eq!(fit_window(175, 640, 480), 175);
    }

    #[test]
    fn test_kernel_is_normalized_and_symmetric() {
        let kernel = gaussian_kernel(175, 20.0);
        assert_eq!(kernel.len(), 175);
        assert!((kernel.iter().sum::<f32>() - 1.0).abs() < 1e-4);
        assert!((kernel[0] - kernel[174]).abs() < 1e-9);
        assert!(kernel[87] > kernel[86]);
    }

    #[test]
    fn test_blur_keeps_flat_image() {
        let image = RgbImage::from_pixel(10, 6, Rgb([120, 120, 120]));
        let blurred = gaussian_blur(&image, 175, 20.0);

        assert_eq!(blurred.dimensions(), (10, 6));
        assert!(blurred.pixels().all(|p| p.0 == [120, 120, 120]));
    }

    #[test]
    fn test_blur_spreads_a_dot() {
        let mut image = GrayImage::new(9, 9);
        image.put_pixel(4, 4, Luma([255]));
        let blurred = gaussian_blur(&image, 5, 1.0);

        assert!(blurred.get_pixel(4, 4)[0] < 255);
        assert!(blurred.get_pixel(5, 4)[0] > 0);
        assert_eq!(blurred.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_huge_kernel_finishes_on_tiny_image() {
        let image = RgbImage::from_fn(8, 8, |x, y| Rgb([(x * 30) as u8, (y * 30) as u8, 7]));
        let blurred = gaussian_blur(&image, 20_000_001, 20.0);
        assert_eq!(blurred.dimensions(), (8, 8));
    }

    #[test]
    fn test_raster_blur_keeps_channels() {
        let image = RasterImage::new(3, 2, 4, vec![200; 24]).unwrap();
        let blurred = gaussian_blur_raster(&image, 9, 3.0);
        assert_eq!(blurred.channels(), 4);
        assert_eq!(blurred.dimensions(), (3, 2));
    }

    #[test]
    fn test_bilateral_keeps_hard_edge() {
        let image = RgbImage::from_fn(12, 4, |x, _| {
            if x < 6 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) }
        });

        let smoothed = bilateral_filter(&image, 7, 20.0, 250.0);
        assert_eq!(smoothed.get_pixel(5, 1).0, [0, 0, 0]);
        assert_eq!(smoothed.get_pixel(6, 1).0, [255, 255, 255]);
    }
}
