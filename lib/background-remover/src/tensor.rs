use crate::{Error, Model, Result};
use fast_image_resize::{PixelType, ResizeOptions, Resizer, images::Image as FrImage};
use image::{GrayImage, RgbImage};
use ndarray::{Array4, ArrayViewD};

pub fn fast_resize(image: &RgbImage, target_width: u32, target_height: u32) -> Result<RgbImage> {
    let (width, height) = image.dimensions();
    if width == target_width && height == target_height {
        return Ok(image.clone());
    }

    let src_image = FrImage::from_vec_u8(width, height, image.as_raw().clone(), PixelType::U8x3)?;
    let mut dst_image = FrImage::new(target_width, target_height, PixelType::U8x3);
    Resizer::new().resize(&src_image, &mut dst_image, &ResizeOptions::new())?;

    RgbImage::from_raw(target_width, target_height, dst_image.into_vec())
        .ok_or_else(|| Error::ImageProcessing("Failed to create resized image".to_string()))
}

pub fn fast_resize_mask(mask: &GrayImage, target_width: u32, target_height: u32) -> Result<GrayImage> {
    let (width, height) = mask.dimensions();
    if width == target_width && height == target_height {
        return Ok(mask.clone());
    }

    let src_image = FrImage::from_vec_u8(width, height, mask.as_raw().clone(), PixelType::U8)?;
    let mut dst_image = FrImage::new(target_width, target_height, PixelType::U8);
    Resizer::new().resize(&src_image, &mut dst_image, &ResizeOptions::new())?;

    GrayImage::from_raw(target_width, target_height, dst_image.into_vec())
        .ok_or_else(|| Error::ImageProcessing("Failed to create resized mask".to_string()))
}

/// `(1, 3, H, W)` tensor normalised the way `model` expects.
pub fn to_nchw(image: &RgbImage, model: Model) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let (mean, std) = model.normalization();
    let mut array = Array4::zeros((1, 3, height as usize, width as usize));

    for (x, y, pixel) in image.enumerate_pixels() {
        for c in 0..3 {
            array[[0, c, y as usize, x as usize]] = (pixel[c] as f32 / 255.0 - mean[c]) / std[c];
        }
    }

    array
}

/// Turns the first channel of a model prediction into a 0..=255 mask.
pub fn mask_from_output(output: ArrayViewD<'_, f32>, rescale: bool) -> Result<GrayImage> {
    let shape = output.shape().to_vec();
    let (width, height) = match shape.len() {
        4 => (shape[3], shape[2]),
        3 => (shape[2], shape[1]),
        2 => (shape[1], shape[0]),
        _ => {
            return Err(Error::InvalidOutput(format!(
                "Unsupported output shape: {shape:?}",
            )));
        }
    };

    let plane = width * height;
    let values = output.iter().take(plane).copied().collect::<Vec<f32>>();
    if values.len() != plane || plane == 0 {
        return Err(Error::InvalidOutput(format!(
            "Output {shape:?} holds no {width}x{height} plane"
        )));
    }

    let (low, high) = if rescale {
        values
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(*v), hi.max(*v)))
    } else {
        (0.0, 1.0)
    };
    let range = if high - low > f32::EPSILON { high - low } else { 1.0 };

    let mask = values
        .iter()
        .map(|v| (((v - low) / range).clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect::<Vec<u8>>();

    GrayImage::from_raw(width as u32, height as u32, mask)
        .ok_or_else(|| Error::ImageProcessing("Failed to create mask image".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};
    use ndarray::Array2;

    #[test]
    fn test_nchw_layout_and_normalization() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(1, 0, Rgb([255, 0, 51]));

        let tensor = to_nchw(&image, Model::Rmbg14);
        assert_eq!(tensor.shape(), &[1, 3, 1, 2]);
        assert!((tensor[[0, 0, 0, 1]] - 0.5).abs() < 1e-6);
        assert!((tensor[[0, 1, 0, 1]] + 0.5).abs() < 1e-6);
        assert!((tensor[[0, 2, 0, 1]] + 0.3).abs() < 1e-6);
        assert!((tensor[[0, 0, 0, 0]] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_mask_from_4d_output() {
        let output = Array4::from_shape_vec((1, 1, 2, 3), vec![0.0f32, 0.5, 1.0, -1.0, 2.0, 0.25]).unwrap();
        let mask = mask_from_output(output.view().into_dyn(), false).unwrap();

        assert_eq!(mask.dimensions(), (3, 2));
        assert_eq!(mask.as_raw(), &vec![0, 128, 255, 0, 255, 64]);
    }

    #[test]
    fn test_mask_rescale_uses_min_max() {
        let output = Array2::from_shape_vec((1, 3), vec![2.0f32, 3.0, 4.0]).unwrap();
        let mask = mask_from_output(output.view().into_dyn(), true).unwrap();
        assert_eq!(mask.as_raw(), &vec![0, 128, 255]);
    }

    #[test]
    fn test_unsupported_shape() {
        let output = ndarray::Array1::from_vec(vec![0.0f32; 4]);
        assert!(matches!(
            mask_from_output(output.view().into_dyn(), false),
            Err(Error::InvalidOutput(_))
        ));
    }

    #[test]
    fn test_mask_resize_keeps_flat_value() {
        let mask = GrayImage::from_pixel(8, 8, Luma([200]));
        let resized = fast_resize_mask(&mask, 20, 12).unwrap();

        assert_eq!(resized.dimensions(), (20, 12));
        assert!(resized.pixels().all(|p| p[0].abs_diff(200) <= 1));
    }

    #[test]
    fn test_rgb_resize() {
        let image = RgbImage::from_pixel(10, 10, Rgb([10, 20, 30]));
        let resized = fast_resize(&image, 4, 6).unwrap();
        assert_eq!(resized.dimensions(), (4, 6));
    }
}
