use crate::{
    Effect, ImageEffectError, ImageEffectResult,
    colour_space::{self, HUE_MAX, Hsv},
};
use derive_setters::Setters;
use image::RgbImage;
use rayon::prelude::*;
use std::str::FromStr;

/// Half width of the hue window around the target hue.
pub const HUE_TOLERANCE: u8 = 10;

/// Pixels below this saturation or value never count as a colour match.
pub const MIN_SATURATION: u8 = 50;
pub const MIN_VALUE: u8 = 50;

/// Target colour in RGB order together with its 8-bit hue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorTarget {
    rgb: [u8; 3],
    hue: u8,
}

impl ColorTarget {
    pub fn new(rgb: [u8; 3]) -> Self {
        Self {
            rgb,
            hue: colour_space::rgb_to_hsv(rgb).h,
        }
    }

    pub fn rgb(&self) -> [u8; 3] {
        self.rgb
    }

    pub fn hue(&self) -> u8 {
        self.hue
    }

    /// Inclusive window, each end clamped on its own (no wraparound at 0/179).
    pub fn hue_window(&self) -> (u8, u8) {
        (
            self.hue.saturating_sub(HUE_TOLERANCE),
            self.hue.saturating_add(HUE_TOLERANCE).min(HUE_MAX),
        )
    }
}

impl FromStr for ColorTarget {
    type Err = ImageEffectError;

    /// Accepts `rgb(r, g, b)`, `[r, g, b]` and `r, g, b`.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let invalid = || ImageEffectError::Parameter(format!("invalid color `{text}`"));

        let trimmed = text.trim();
        let lower = trimmed.to_ascii_lowercase();
        let body = if let Some(rest) = lower.strip_prefix("rgb(") {
            rest.strip_suffix(')').ok_or_else(invalid)?
        } else if let Some(rest) = lower.strip_prefix('[') {
            rest.strip_suffix(']').ok_or_else(invalid)?
        } else {
            lower.as_str()
        };

        let channels = body
            .split(',')
            .map(|part| part.trim().parse::<u8>().map_err(|_| invalid()))
            .collect::<Result<Vec<u8>, _>>()?;

        match channels.as_slice() {
            [r, g, b] => Ok(Self::new([*r, *g, *b])),
            _ => Err(invalid()),
        }
    }
}

/// Boosts the saturation of pixels close to a target hue and, unless
/// disabled, mutes everything else by the same factor.
#[derive(Debug, Clone, Setters)]
#[setters(prefix = "with_")]
#[non_exhaustive]
pub struct HueSelectiveConfig {
    target: ColorTarget,
    factor: f32,
    suppress_others: bool,
}

impl HueSelectiveConfig {
    pub const DEFAULT_FACTOR: f32 = 7.5;

    pub fn new(target: ColorTarget) -> Self {
        Self {
            target,
            factor: Self::DEFAULT_FACTOR,
            suppress_others: true,
        }
    }

    pub fn target(&self) -> ColorTarget {
        self.target
    }

    pub fn factor(&self) -> f32 {
        self.factor
    }

    pub fn is_match(&self, hsv: Hsv) -> bool {
        let (low, high) = self.target.hue_window();
        (low..=high).contains(&hsv.h) && hsv.s >= MIN_SATURATION && hsv.v >= MIN_VALUE
    }

    /// Rescales the saturation of one HSV pixel. Hue and value are kept.
    pub fn enhance_hsv(&self, hsv: Hsv) -> Hsv {
        let scale = if self.is_match(hsv) {
            self.factor
        } else if self.suppress_others {
            1.0 / self.factor
        } else {
            1.0
        };

        Hsv {
            s: (hsv.s as f32 * scale).floor().clamp(0.0, 255.0) as u8,
            ..hsv
        }
    }

    fn validate(&self) -> ImageEffectResult<()> {
        if !self.factor.is_finite() || self.factor <= 0.0 {
            return Err(ImageEffectError::Parameter(format!(
                "enhancement factor must be positive, got {}",
                self.factor
            )));
        }
        Ok(())
    }
}

impl Effect for HueSelectiveConfig {
    fn apply(&self, image: RgbImage) -> ImageEffectResult<RgbImage> {
        self.validate()?;

        log::debug!(
            "hue selective: target={:?} hue={} window={:?} factor={}",
            self.target.rgb(),
            self.target.hue(),
            self.target.hue_window(),
            self.factor
        );

        let (width, height) = image.dimensions();
        let mut pixels = image.into_raw();

        pixels.par_chunks_exact_mut(3).for_each(|pixel| {
            let hsv = colour_space::rgb_to_hsv([pixel[0], pixel[1], pixel[2]]);
            let rgb = colour_space::hsv_to_rgb(self.enhance_hsv(hsv));
            pixel.copy_from_slice(&rgb);
        });

        RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| ImageEffectError::Processing("Failed to rebuild image".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_parse_color_encodings() {
        let expected = [0, 255, 0];
        assert_eq!("rgb(0, 255, 0)".parse::<ColorTarget>().unwrap().rgb(), expected);
        assert_eq!("RGB(0,255,0)".parse::<ColorTarget>().unwrap().rgb(), expected);
        assert_eq!("[0, 255, 0]".parse::<ColorTarget>().unwrap().rgb(), expected);
        assert_eq!(" 0,255,0 ".parse::<ColorTarget>().unwrap().rgb(), expected);
    }

    #[test]
    fn test_parse_color_rejects_garbage() {
        for text in [
            "",
            "rgb(0, 255)",
            "rgb(0, 255, 0, 1)",
            "rgb(0, 256, 0)",
            "rgb(-1, 0, 0)",
            "rgb(1.5, 0, 0)",
            "rgb(0, 255, 0",
            "green",
        ] {
            assert!(
                matches!(text.parse::<ColorTarget>(), Err(ImageEffectError::Parameter(_))),
                "{text} should be rejected"
            );
        }
    }

    #[test]
    fn test_hue_window_is_clamped_without_wraparound() {
        assert_eq!(ColorTarget::new([255, 0, 0]).hue_window(), (0, 10));
        assert_eq!(ColorTarget::new([0, 255, 0]).hue_window(), (50, 70));

        // hue 175 -> window reaches 179 only
        let magenta_red = ColorTarget::new([255, 0, 43]);
        assert_eq!(magenta_red.hue(), 175);
        assert_eq!(magenta_red.hue_window(), (165, 179));
    }

    #[test]
    fn test_unit_factor_is_noop_on_saturation() {
        let config = HueSelectiveConfig::new(ColorTarget::new([0, 255, 0])).with_factor(1.0);

        for rgb in [[120, 200, 120], [200, 100, 100], [10, 10, 10], [0, 0, 255]] {
            let hsv = colour_space::rgb_to_hsv(rgb);
            assert_eq!(config.enhance_hsv(hsv), hsv);
        }
    }

    #[test]
    fn test_scaled_saturation_truncates() {
        let config = HueSelectiveConfig::new(ColorTarget::new([0, 255, 0])).with_factor(2.0);

        // 255 / 2 = 127.5 and 101 * 1.5 = 151.5
        assert_eq!(config.enhance_hsv(Hsv { h: 0, s: 255, v: 200 }).s, 127);
        let boosted = config.clone().with_factor(1.5);
        assert_eq!(boosted.enhance_hsv(Hsv { h: 60, s: 101, v: 200 }).s, 151);
    }

    #[test]
    fn test_gate_excludes_dull_pixels() {
        let config = HueSelectiveConfig::new(ColorTarget::new([0, 255, 0]));

        assert!(config.is_match(Hsv { h: 60, s: 200, v: 200 }));
        assert!(!config.is_match(Hsv { h: 60, s: 49, v: 200 }));
        assert!(!config.is_match(Hsv { h: 60, s: 200, v: 49 }));
        assert!(!config.is_match(Hsv { h: 71, s: 200, v: 200 }));
    }

    #[test]
    fn test_boost_only_leaves_others() {
        let config = HueSelectiveConfig::new(ColorTarget::new([0, 255, 0]))
            .with_factor(2.0)
            .with_suppress_others(false);

        let other = Hsv { h: 0, s: 128, v: 200 };
        assert_eq!(config.enhance_hsv(other), other);

        let matched = Hsv { h: 60, s: 100, v: 200 };
        assert_eq!(config.enhance_hsv(matched).s, 200);
    }

    #[test]
    fn test_never_brightens() {
        let config = HueSelectiveConfig::new(ColorTarget::new([0, 0, 255])).with_factor(3.0);
        let image = RgbImage::from_fn(16, 16, |x, y| {
            Rgb([(x * 16) as u8, (y * 16) as u8, ((x + y) * 8) as u8])
        });

        let result = config.apply(image.clone()).unwrap();
        for (before, after) in image.pixels().zip(result.pixels()) {
            let v_before = *before.0.iter().max().unwrap();
            let v_after = *after.0.iter().max().unwrap();
            assert_eq!(v_before, v_after);
        }
    }

    #[test]
    fn test_rejects_non_positive_factor() {
        let config = HueSelectiveConfig::new(ColorTarget::new([0, 255, 0])).with_factor(0.0);
        let image = RgbImage::new(2, 2);
        assert!(matches!(
            config.apply(image),
            Err(ImageEffectError::Parameter(_))
        ));
    }
}
