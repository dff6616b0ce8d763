use crate::{
    blur::{coerce_odd, fit_window},
    colour_space,
};
use derivative::Derivative;
use derive_setters::Setters;
use image::{GrayImage, RgbImage};
use imageproc::{contrast, filter};

pub const EDGE: u8 = 255;
pub const FLAT: u8 = 0;

/// Binary edge map from luminance: median smoothing followed by an adaptive
/// mean threshold. Even or too small window sizes are coerced to the next odd
/// value of at least 3, and no window grows past twice the longer image side.
#[derive(Debug, Clone, Derivative, Setters)]
#[derivative(Default)]
#[setters(prefix = "with_")]
#[non_exhaustive]
pub struct EdgeMaskConfig {
    // threshold block size, controls line thickness
    #[derivative(Default(value = "7"))]
    line_size: u32,

    // median kernel size
    #[derivative(Default(value = "5"))]
    blur_value: u32,

    // a pixel must be this much darker than its block mean to count as edge,
    // follows the median kernel size when unset
    #[setters(strip_option)]
    threshold_offset: Option<i32>,
}

impl EdgeMaskConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block_sizes(&self) -> (u32, u32) {
        (coerce_odd(self.line_size), coerce_odd(self.blur_value))
    }

    /// 255 = edge, 0 = flat; same resolution as the source.
    pub fn extract(&self, image: &RgbImage) -> GrayImage {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return GrayImage::new(width, height);
        }

        let line_size = fit_window(self.line_size, width, height);
        let blur_value = fit_window(self.blur_value, width, height);
        if (line_size, blur_value) != (self.line_size, self.blur_value) {
            log::debug!(
                "edge mask: line_size {} -> {line_size}, blur_value {} -> {blur_value}",
                self.line_size,
                self.blur_value
            );
        }

        let offset = self
            .threshold_offset
            .unwrap_or(blur_value.min(u8::MAX as u32) as i32);

        let gray = colour_space::to_luma_image(image);
        let radius = blur_value / 2;
        let smoothed = filter::median_filter(&gray, radius, radius);

        let mut mask = contrast::adaptive_threshold(&smoothed, line_size / 2, offset);
        for pixel in mask.pixels_mut() {
            pixel[0] = if pixel[0] == 0 { EDGE } else { FLAT };
        }

        mask
    }
}
