use crate::{Effect, ImageEffectResult, colour_space};
use derivative::Derivative;
use derive_setters::Setters;
use image::{GrayImage, Luma, Rgb, RgbImage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrayscaleMode {
    Average,
    Luminance,
}

#[derive(Debug, Clone, Derivative, Setters)]
#[derivative(Default)]
#[setters(prefix = "with_")]
#[non_exhaustive]
pub struct GrayscaleConfig {
    #[derivative(Default(value = "GrayscaleMode::Luminance"))]
    mode: GrayscaleMode,

    // 3x3 median pass after the conversion ("black and white" look)
    #[derivative(Default(value = "false"))]
    denoise: bool,
}

impl GrayscaleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_gray(&self, image: &RgbImage) -> GrayImage {
        let gray = match self.mode {
            GrayscaleMode::Luminance => colour_space::to_luma_image(image),
            GrayscaleMode::Average => {
                let (width, height) = image.dimensions();
                let mut gray = GrayImage::new(width, height);
                for (dst, src) in gray.pixels_mut().zip(image.pixels()) {
                    let sum = src[0] as u32 + src[1] as u32 + src[2] as u32;
                    *dst = Luma([(sum / 3) as u8]);
                }
                gray
            }
        };

        if self.denoise {
            imageproc::filter::median_filter(&gray, 1, 1)
        } else {
            gray
        }
    }
}

impl Effect for GrayscaleConfig {
    fn apply(&self, image: RgbImage) -> ImageEffectResult<RgbImage> {
        let gray = self.to_gray(&image);
        let mut result = image;

        for (pixel, gray_pixel) in result.pixels_mut().zip(gray.pixels()) {
            let value = gray_pixel[0];
            *pixel = Rgb([value, value, value]);
        }

        Ok(result)
    }
}
