//! Foreground/background separation and the compositing built on it.

mod compositor;
mod graph_cut;
mod matting;

pub use compositor::{FOCUS_KERNEL_SIZE, FOCUS_SIGMA, apply_focus_blur, remove_background};
pub use matting::{MattingLabel, RectPriorMatting};

use crate::{ImageEffectError, ImageEffectResult};
use image::{GrayImage, Luma, RgbImage};

/// Probability above which a pixel counts as foreground.
pub const FOREGROUND_THRESHOLD: f32 = 0.5;

/// Per-pixel foreground likelihood in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationMask {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl SegmentationMask {
    /// Values are clamped to `[0, 1]`; NaN becomes background.
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> ImageEffectResult<Self> {
        if data.len() != width as usize * height as usize {
            return Err(ImageEffectError::Parameter(format!(
                "mask holds {} values, {width}x{height} needs {}",
                data.len(),
                width as usize * height as usize
            )));
        }

        let data = data
            .into_iter()
            .map(|v| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) })
            .collect();

        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn filled(width: u32, height: u32, probability: f32) -> Self {
        let probability = if probability.is_nan() {
            0.0
        } else {
            probability.clamp(0.0, 1.0)
        };

        Self {
            width,
            height,
            data: vec![probability; width as usize * height as usize],
        }
    }

    /// 0..=255 mapped onto 0..=1.
    pub fn from_gray(image: &GrayImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.pixels().map(|p| p[0] as f32 / 255.0).collect(),
        }
    }

    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> f32) -> Self {
        let data = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y).clamp(0.0, 1.0))
            .collect();

        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn probability(&self, x: u32, y: u32) -> f32 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        self.probability(x, y) > FOREGROUND_THRESHOLD
    }

    pub fn foreground_ratio(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }

        let count = self.data.iter().filter(|&&v| v > FOREGROUND_THRESHOLD).count();
        count as f32 / self.data.len() as f32
    }

    /// 255 = foreground, 0 = background.
    pub fn to_binary_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            Luma([if self.is_foreground(x, y) { 255 } else { 0 }])
        })
    }

    pub(crate) fn ensure_dimensions(&self, width: u32, height: u32) -> ImageEffectResult<()> {
        if self.dimensions() != (width, height) {
            return Err(ImageEffectError::DimensionMismatch {
                expected: (width, height),
                actual: self.dimensions(),
            });
        }
        Ok(())
    }
}

/// Produces a foreground mask for an image. `SegmentationUnavailable` tells
/// the caller to use a fallback strategy.
pub trait Segmenter: Send + Sync {
    fn name(&self) -> &str;

    fn segment(&self, image: &RgbImage) -> ImageEffectResult<SegmentationMask>;
}

/// No model configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSegmenter;

impl Segmenter for NoSegmenter {
    fn name(&self) -> &str {
        "none"
    }

    fn segment(&self, _image: &RgbImage) -> ImageEffectResult<SegmentationMask> {
        Err(ImageEffectError::SegmentationUnavailable(
            "no segmentation model configured".to_string(),
        ))
    }
}

/// Returns a precomputed mask.
#[derive(Debug, Clone)]
pub struct StaticMaskSegmenter {
    mask: SegmentationMask,
}

impl StaticMaskSegmenter {
    pub fn new(mask: SegmentationMask) -> Self {
        Self { mask }
    }
}

impl Segmenter for StaticMaskSegmenter {
    fn name(&self) -> &str {
        "static"
    }

    fn segment(&self, image: &RgbImage) -> ImageEffectResult<SegmentationMask> {
        let (width, height) = image.dimensions();
        self.mask.ensure_dimensions(width, height)?;
        Ok(self.mask.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_values_are_clamped() {
        let mask = SegmentationMask::new(2, 2, vec![-0.5, 0.25, 1.5, f32::NAN]).unwrap();
        assert_eq!(mask.as_slice(), &[0.0, 0.25, 1.0, 0.0]);
        assert!(mask.is_foreground(0, 1));
        assert!(!mask.is_foreground(1, 0));
    }

    #[test]
    fn test_mask_length_is_checked() {
        assert!(matches!(
            SegmentationMask::new(3, 3, vec![0.0; 8]),
            Err(ImageEffectError::Parameter(_))
        ));
    }

    #[test]
    fn test_threshold_is_strict() {
        let mask = SegmentationMask::filled(1, 1, FOREGROUND_THRESHOLD);
        assert!(!mask.is_foreground(0, 0));
        assert_eq!(mask.foreground_ratio(), 0.0);
    }

    #[test]
    fn test_gray_round_trip_to_binary() {
        let gray = GrayImage::from_fn(4, 1, |x, _| Luma([(x * 80) as u8]));
        let binary = SegmentationMask::from_gray(&gray).to_binary_image();
        assert_eq!(binary.as_raw(), &vec![0, 0, 255, 255]);
    }

    #[test]
    fn test_no_segmenter_is_unavailable() {
        let result = NoSegmenter.segment(&RgbImage::new(2, 2));
        assert!(matches!(
            result,
            Err(ImageEffectError::SegmentationUnavailable(_))
        ));
    }

    #[test]
    fn test_static_segmenter_checks_size() {
        let segmenter = StaticMaskSegmenter::new(SegmentationMask::filled(4, 4, 1.0));
        assert!(segmenter.segment(&RgbImage::new(4, 4)).is_ok());
        assert!(matches!(
            segmenter.segment(&RgbImage::new(4, 5)),
            Err(ImageEffectError::DimensionMismatch { .. })
        ));
    }
}
