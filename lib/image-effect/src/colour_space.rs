//! Colour space helpers using the 8-bit HSV convention:
//! hue in `[0, 179]` (degrees halved), saturation and value in `[0, 255]`.

use image::{GrayImage, Luma, RgbImage};
use palette::{FromColor, Srgb};

pub const HUE_MAX: u8 = 179;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hsv {
    pub h: u8,
    pub s: u8,
    pub v: u8,
}

pub fn rgb_to_hsv(rgb: [u8; 3]) -> Hsv {
    let [r, g, b] = rgb;
    let hsv: palette::Hsv = palette::Hsv::from_color(Srgb::new(r, g, b).into_format::<f32>());
    let degrees = hsv.hue.into_positive_degrees();

    Hsv {
        h: ((degrees / 2.0).round() as u32 % 180) as u8,
        s: unit_to_byte(hsv.saturation),
        v: unit_to_byte(hsv.value),
    }
}

pub fn hsv_to_rgb(hsv: Hsv) -> [u8; 3] {
    let degrees = hsv.h.min(HUE_MAX) as f32 * 2.0;
    let hsv: palette::Hsv = palette::Hsv::new(degrees, hsv.s as f32 / 255.0, hsv.v as f32 / 255.0);

    let rgb: Srgb = Srgb::from_color(hsv);
    let (r, g, b) = rgb.into_format::<u8>().into_components();
    [r, g, b]
}

fn unit_to_byte(value: f32) -> u8 {
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Rec.601 luma: 0.299*R + 0.587*G + 0.114*B
pub fn luma(rgb: [u8; 3]) -> u8 {
    (0.299 * rgb[0] as f32 + 0.587 * rgb[1] as f32 + 0.114 * rgb[2] as f32)
        .round()
        .clamp(0.0, 255.0) as u8
}

pub fn to_luma_image(image: &RgbImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut gray = GrayImage::new(width, height);

    for (dst, src) in gray.pixels_mut().zip(image.pixels()) {
        *dst = Luma([luma(src.0)]);
    }

    gray
}
