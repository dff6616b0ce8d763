use super::SegmentationMask;
use crate::{ImageEffectResult, RasterImage, blur};
use rayon::prelude::*;

pub const FOCUS_KERNEL_SIZE: u32 = 175;
pub const FOCUS_SIGMA: f32 = 20.0;

/// Keeps foreground pixels verbatim and zeroes every channel of the rest.
pub fn remove_background(
    image: &RasterImage,
    mask: &SegmentationMask,
) -> ImageEffectResult<RasterImage> {
    let (width, height) = image.dimensions();
    mask.ensure_dimensions(width, height)?;

    let channels = image.channels() as usize;
    let mut data = image.as_raw().to_vec();

    data.par_chunks_exact_mut(channels)
        .zip(mask.as_slice().par_iter())
        .filter(|(_, probability)| **probability <= super::FOREGROUND_THRESHOLD)
        .for_each(|(pixel, _)| pixel.fill(0));

    RasterImage::new(width, height, image.channels(), data)
}

/// Foreground from the source, background from a Gaussian blurred copy.
pub fn apply_focus_blur(
    image: &RasterImage,
    mask: &SegmentationMask,
    kernel_size: u32,
    sigma: f32,
) -> ImageEffectResult<RasterImage> {
    let (width, height) = image.dimensions();
    mask.ensure_dimensions(width, height)?;

    let channels = image.channels() as usize;
    let mut blurred = blur::gaussian_blur_raster(image, kernel_size, sigma).into_raw();

    blurred
        .par_chunks_exact_mut(channels)
        .zip(image.as_raw().par_chunks_exact(channels))
        .zip(mask.as_slice().par_iter())
        .filter(|(_, probability)| **probability > super::FOREGROUND_THRESHOLD)
        .for_each(|((dst, src), _)| dst.copy_from_slice(src));

    RasterImage::new(width, height, image.channels(), blurred)
}
