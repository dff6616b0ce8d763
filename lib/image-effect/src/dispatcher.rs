use crate::{
    CancelToken, ColorTarget, Effect, ImageEffectError, ImageEffectResult, RasterImage, cancel,
    edge::EdgeMaskConfig,
    monochrome::{GrayscaleConfig, GrayscaleMode},
    segmentation::{
        self, FOCUS_KERNEL_SIZE, FOCUS_SIGMA, NoSegmenter, RectPriorMatting, SegmentationMask,
        Segmenter,
    },
    selective::HueSelectiveConfig,
    stylized::{CartoonComposite, CartoonConfig},
};
use image::RgbImage;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::{collections::BTreeMap, fmt, str::FromStr, sync::Arc, time::Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum EffectKind {
    Grayscale = 0,
    ColorEnhancer,
    Cartoonify,
    BackgroundRemoval,
    FocusEffect,
}

/// One accepted parameter of an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub required: bool,
    pub default: Option<&'static str>,
    pub help: &'static str,
}

impl ParamSpec {
    const fn optional(name: &'static str, default: &'static str, help: &'static str) -> Self {
        Self {
            name,
            required: false,
            default: Some(default),
            help,
        }
    }
}

const GRAYSCALE_PARAMS: &[ParamSpec] = &[
    ParamSpec::optional("mode", "luminance", "luminance or average"),
    ParamSpec::optional("denoise", "false", "3x3 median pass after the conversion"),
];

const COLOR_ENHANCER_PARAMS: &[ParamSpec] = &[
    ParamSpec {
        name: "color",
        required: true,
        default: None,
        help: "target color: rgb(r, g, b), [r, g, b] or r,g,b",
    },
    ParamSpec::optional("enhancement_factor", "7.5", "saturation multiplier"),
    ParamSpec::optional(
        "suppress_others",
        "true",
        "divide the saturation of non-matching pixels by the factor",
    ),
];

const CARTOONIFY_PARAMS: &[ParamSpec] = &[
    ParamSpec::optional("colors", "10", "palette size"),
    ParamSpec::optional("line_size", "7", "edge threshold block size"),
    ParamSpec::optional("blur_value", "5", "median kernel size before edge detection"),
    ParamSpec::optional("composite", "edges", "edges or ink"),
];

const BACKGROUND_REMOVAL_PARAMS: &[ParamSpec] = &[ParamSpec::optional(
    "strategy",
    "auto",
    "auto, model or rect",
)];

const FOCUS_EFFECT_PARAMS: &[ParamSpec] = &[
    ParamSpec::optional("strategy", "auto", "auto, model or rect"),
    ParamSpec::optional("blur_kernel", "175", "background Gaussian kernel size"),
    ParamSpec::optional("blur_sigma", "20", "background Gaussian sigma"),
];

impl EffectKind {
    pub fn name(&self) -> &'static str {
        match self {
            EffectKind::Grayscale => "Grayscale",
            EffectKind::ColorEnhancer => "Color Enhancer",
            EffectKind::Cartoonify => "Cartoonify",
            EffectKind::BackgroundRemoval => "Background Removal",
            EffectKind::FocusEffect => "Focus Effect",
        }
    }

    pub fn all() -> &'static [EffectKind] {
        &[
            EffectKind::Grayscale,
            EffectKind::ColorEnhancer,
            EffectKind::Cartoonify,
            EffectKind::BackgroundRemoval,
            EffectKind::FocusEffect,
        ]
    }

    pub fn params(&self) -> &'static [ParamSpec] {
        match self {
            EffectKind::Grayscale => GRAYSCALE_PARAMS,
            EffectKind::ColorEnhancer => COLOR_ENHANCER_PARAMS,
            EffectKind::Cartoonify => CARTOONIFY_PARAMS,
            EffectKind::BackgroundRemoval => BACKGROUND_REMOVAL_PARAMS,
            EffectKind::FocusEffect => FOCUS_EFFECT_PARAMS,
        }
    }

    pub fn needs_segmentation(&self) -> bool {
        matches!(
            self,
            EffectKind::BackgroundRemoval | EffectKind::FocusEffect
        )
    }

    /// Case-insensitive; "Black and White" is accepted for Grayscale.
    pub fn from_name(name: &str) -> ImageEffectResult<Self> {
        let wanted = name.trim();

        if wanted.eq_ignore_ascii_case("Black and White") {
            return Ok(EffectKind::Grayscale);
        }

        Self::all()
            .iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(wanted))
            .copied()
            .ok_or_else(|| ImageEffectError::UnsupportedEffect(name.to_string()))
    }
}

impl FromStr for EffectKind {
    type Err = ImageEffectError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::from_name(name)
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Textual effect parameters, the shape a form-field transport delivers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectParams(BTreeMap<String, String>);

impl EffectParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Own values win; missing keys are taken from `defaults`.
    pub fn or_defaults(&self, defaults: &EffectParams) -> EffectParams {
        let mut merged = defaults.clone();
        for (key, value) in &self.0 {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }

    pub fn parse<T: FromStr>(&self, key: &str) -> ImageEffectResult<Option<T>> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };

        value.trim().parse::<T>().map(Some).map_err(|_| {
            ImageEffectError::Parameter(format!("invalid value `{value}` for `{key}`"))
        })
    }

    pub fn parse_or<T: FromStr>(&self, key: &str, default: T) -> ImageEffectResult<T> {
        Ok(self.parse(key)?.unwrap_or(default))
    }

    pub fn parse_bool(&self, key: &str, default: bool) -> ImageEffectResult<bool> {
        let Some(value) = self.get(key) else {
            return Ok(default);
        };

        match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ImageEffectError::Parameter(format!(
                "invalid boolean `{value}` for `{key}`"
            ))),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EffectParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Where the foreground mask comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskStrategy {
    /// Configured segmenter, rectangle prior when it is unavailable.
    Auto,
    Model,
    Rect,
}

impl FromStr for MaskStrategy {
    type Err = ImageEffectError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(MaskStrategy::Auto),
            "model" => Ok(MaskStrategy::Model),
            "rect" => Ok(MaskStrategy::Rect),
            _ => Err(ImageEffectError::Parameter(format!(
                "unknown mask strategy `{text}`, expected auto, model or rect"
            ))),
        }
    }
}

impl FromStr for GrayscaleMode {
    type Err = ImageEffectError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text.trim().to_ascii_lowercase().as_str() {
            "luminance" => Ok(GrayscaleMode::Luminance),
            "average" => Ok(GrayscaleMode::Average),
            _ => Err(ImageEffectError::Parameter(format!(
                "unknown grayscale mode `{text}`"
            ))),
        }
    }
}

impl FromStr for CartoonComposite {
    type Err = ImageEffectError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text.trim().to_ascii_lowercase().as_str() {
            "edges" => Ok(CartoonComposite::KeepEdges),
            "ink" => Ok(CartoonComposite::InkLines),
            _ => Err(ImageEffectError::Parameter(format!(
                "unknown composite `{text}`, expected edges or ink"
            ))),
        }
    }
}

/// A fully parsed effect, ready to run.
#[derive(Debug, Clone)]
pub enum ImageEffect {
    Grayscale(GrayscaleConfig),
    ColorEnhancer(HueSelectiveConfig),
    Cartoonify(CartoonConfig),
    BackgroundRemoval {
        strategy: MaskStrategy,
    },
    FocusEffect {
        strategy: MaskStrategy,
        kernel_size: u32,
        sigma: f32,
    },
}

impl ImageEffect {
    pub fn parse(name: &str, params: &EffectParams) -> ImageEffectResult<Self> {
        Self::from_kind(EffectKind::from_name(name)?, params)
    }

    pub fn from_kind(kind: EffectKind, params: &EffectParams) -> ImageEffectResult<Self> {
        for key in params.keys() {
            if !kind.params().iter().any(|spec| spec.name == key) {
                log::debug!("{kind}: ignoring unknown parameter `{key}`");
            }
        }

        let effect = match kind {
            EffectKind::Grayscale => ImageEffect::Grayscale(
                GrayscaleConfig::new()
                    .with_mode(params.parse_or("mode", GrayscaleMode::Luminance)?)
                    .with_denoise(params.parse_bool("denoise", false)?),
            ),

            EffectKind::ColorEnhancer => {
                let target = params
                    .parse::<ColorTarget>("color")?
                    .ok_or_else(|| ImageEffectError::Parameter("missing `color`".to_string()))?;

                ImageEffect::ColorEnhancer(
                    HueSelectiveConfig::new(target)
                        .with_factor(
                            params.parse_or("enhancement_factor", HueSelectiveConfig::DEFAULT_FACTOR)?,
                        )
                        .with_suppress_others(params.parse_bool("suppress_others", true)?),
                )
            }

            EffectKind::Cartoonify => {
                let defaults = CartoonConfig::new();
                let mut edges = EdgeMaskConfig::new();
                if let Some(line_size) = params.parse::<u32>("line_size")? {
                    edges = edges.with_line_size(line_size);
                }
                if let Some(blur_value) = params.parse::<u32>("blur_value")? {
                    edges = edges.with_blur_value(blur_value);
                }

                let mut config = defaults.with_edges(edges);
                if let Some(colors) = params.parse::<usize>("colors")? {
                    config = config.with_colors(colors);
                }
                if let Some(composite) = params.parse::<CartoonComposite>("composite")? {
                    config = config.with_composite(composite);
                }

                ImageEffect::Cartoonify(config)
            }

            EffectKind::BackgroundRemoval => ImageEffect::BackgroundRemoval {
                strategy: params.parse_or("strategy", MaskStrategy::Auto)?,
            },

            EffectKind::FocusEffect => {
                let sigma = params.parse_or("blur_sigma", FOCUS_SIGMA)?;
                if !sigma.is_finite() || sigma <= 0.0 {
                    return Err(ImageEffectError::Parameter(format!(
                        "blur_sigma must be positive, got {sigma}"
                    )));
                }

                ImageEffect::FocusEffect {
                    strategy: params.parse_or("strategy", MaskStrategy::Auto)?,
                    kernel_size: params.parse_or("blur_kernel", FOCUS_KERNEL_SIZE)?,
                    sigma,
                }
            }
        };

        Ok(effect)
    }

    pub fn kind(&self) -> EffectKind {
        match self {
            ImageEffect::Grayscale(_) => EffectKind::Grayscale,
            ImageEffect::ColorEnhancer(_) => EffectKind::ColorEnhancer,
            ImageEffect::Cartoonify(_) => EffectKind::Cartoonify,
            ImageEffect::BackgroundRemoval { .. } => EffectKind::BackgroundRemoval,
            ImageEffect::FocusEffect { .. } => EffectKind::FocusEffect,
        }
    }
}

/// Maps an effect name plus parameters onto an effect and runs it. Output
/// always has the input's width and height and three channels.
#[derive(Clone)]
pub struct EffectDispatcher {
    segmenter: Arc<dyn Segmenter>,
    matting: RectPriorMatting,
    seed: Option<u64>,
}

impl Default for EffectDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectDispatcher {
    pub fn new() -> Self {
        Self {
            segmenter: Arc::new(NoSegmenter),
            matting: RectPriorMatting::new(),
            seed: None,
        }
    }

    pub fn with_segmenter(mut self, segmenter: Arc<dyn Segmenter>) -> Self {
        self.segmenter = segmenter;
        self
    }

    pub fn with_matting(mut self, matting: RectPriorMatting) -> Self {
        self.matting = matting;
        self
    }

    /// Fixed seed for k-means and matting initialisation.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn segmenter_name(&self) -> &str {
        self.segmenter.name()
    }

    pub fn apply(
        &self,
        name: &str,
        image: RasterImage,
        params: &EffectParams,
    ) -> ImageEffectResult<RasterImage> {
        self.run(name, image, params, None)
    }

    pub fn apply_cancellable(
        &self,
        name: &str,
        image: RasterImage,
        params: &EffectParams,
        cancel: &CancelToken,
    ) -> ImageEffectResult<RasterImage> {
        self.run(name, image, params, Some(cancel.clone()))
    }

    fn run(
        &self,
        name: &str,
        image: RasterImage,
        params: &EffectParams,
        cancel: Option<CancelToken>,
    ) -> ImageEffectResult<RasterImage> {
        let kind = EffectKind::from_name(name)?;

        let (width, height) = image.dimensions();
        if image.is_empty() || width == 0 || height == 0 {
            return Err(ImageEffectError::Processing(format!(
                "{kind}: empty {width}x{height} image"
            )));
        }

        let effect = ImageEffect::from_kind(kind, params)?;
        cancel::check(&cancel)?;

        log::info!("{kind}: start {width}x{height}x{}", image.channels());
        let started = Instant::now();

        let output = self.apply_effect(effect, image, cancel)?;

        log::info!("{kind}: done in {:.2?}", started.elapsed());
        Ok(output)
    }

    pub fn apply_effect(
        &self,
        effect: ImageEffect,
        image: RasterImage,
        cancel: Option<CancelToken>,
    ) -> ImageEffectResult<RasterImage> {
        let output = match effect {
            ImageEffect::Grayscale(config) => config.apply(image.into_rgb8())?,
            ImageEffect::ColorEnhancer(config) => config.apply(image.into_rgb8())?,

            ImageEffect::Cartoonify(mut config) => {
                if let Some(seed) = self.seed {
                    config = config.with_seed(seed);
                }
                if let Some(cancel) = cancel {
                    config = config.with_cancel(cancel);
                }
                config.apply(image.into_rgb8())?
            }

            ImageEffect::BackgroundRemoval { strategy } => {
                let mask = self.mask(strategy, &image.to_rgb8(), &cancel)?;
                cancel::check(&cancel)?;
                segmentation::remove_background(&image, &mask)?.into_rgb8()
            }

            ImageEffect::FocusEffect {
                strategy,
                kernel_size,
                sigma,
            } => {
                let mask = self.mask(strategy, &image.to_rgb8(), &cancel)?;
                cancel::check(&cancel)?;
                segmentation::apply_focus_blur(&image, &mask, kernel_size, sigma)?.into_rgb8()
            }
        };

        Ok(RasterImage::from(output))
    }

    fn mask(
        &self,
        strategy: MaskStrategy,
        image: &RgbImage,
        cancel: &Option<CancelToken>,
    ) -> ImageEffectResult<SegmentationMask> {
        match strategy {
            MaskStrategy::Rect => self.matting(cancel).matte(image),
            MaskStrategy::Model => self.segmenter.segment(image),
            MaskStrategy::Auto => match self.segmenter.segment(image) {
                Err(ImageEffectError::SegmentationUnavailable(reason)) => {
                    log::warn!(
                        "segmenter `{}` unavailable: {reason}; using rectangle prior",
                        self.segmenter.name()
                    );
                    self.matting(cancel).matte(image)
                }
                other => other,
            },
        }
    }

    fn matting(&self, cancel: &Option<CancelToken>) -> RectPriorMatting {
        let mut matting = self.matting.clone();
        if let Some(seed) = self.seed {
            matting = matting.with_seed(seed);
        }
        if let Some(cancel) = cancel {
            matting = matting.with_cancel(cancel.clone());
        }
        matting
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_resolve_case_insensitively() {
        for kind in EffectKind::all() {
            assert_eq!(EffectKind::from_name(kind.name()).unwrap(), *kind);
            assert_eq!(
                EffectKind::from_name(&format!("  {}  ", kind.name().to_uppercase())).unwrap(),
                *kind
            );
        }

        assert_eq!(
            EffectKind::from_name("black and white").unwrap(),
            EffectKind::Grayscale
        );
        assert!(matches!(
            EffectKind::from_name("Sepia"),
            Err(ImageEffectError::UnsupportedEffect(_))
        ));
    }

    #[test]
    fn test_kind_codes_round_trip() {
        for kind in EffectKind::all() {
            let code: u8 = (*kind).into();
            assert_eq!(EffectKind::try_from(code).unwrap(), *kind);
        }
    }

    #[test]
    fn test_color_enhancer_requires_color() {
        let result = ImageEffect::parse("Color Enhancer", &EffectParams::new());
        assert!(matches!(result, Err(ImageEffectError::Parameter(_))));

        let result = ImageEffect::parse(
            "Color Enhancer",
            &EffectParams::new().with("color", "rgb(0, 255)"),
        );
        assert!(matches!(result, Err(ImageEffectError::Parameter(_))));
    }

    #[test]
    fn test_parse_defaults() {
        let effect = ImageEffect::parse("Focus Effect", &EffectParams::new()).unwrap();
        match effect {
            ImageEffect::FocusEffect {
                strategy,
                kernel_size,
                sigma,
            } => {
                assert_eq!(strategy, MaskStrategy::Auto);
                assert_eq!(kernel_size, 175);
                assert_eq!(sigma, 20.0);
            }
            other => panic!("unexpected {other:?}"),
        }

        let effect = ImageEffect::parse("Background Removal", &EffectParams::new()).unwrap();
        assert!(matches!(
            effect,
            ImageEffect::BackgroundRemoval {
                strategy: MaskStrategy::Auto
            }
        ));
    }

    #[test]
    fn test_bad_values_are_parameter_errors() {
        for (name, key, value) in [
            ("Grayscale", "denoise", "maybe"),
            ("Cartoonify", "colors", "many"),
            ("Cartoonify", "composite", "watercolor"),
            ("Focus Effect", "strategy", "magic"),
            ("Focus Effect", "blur_sigma", "-1"),
        ] {
            let params = EffectParams::new().with(key, value);
            assert!(
                matches!(
                    ImageEffect::parse(name, &params),
                    Err(ImageEffectError::Parameter(_))
                ),
                "{name} {key}={value}"
            );
        }
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let params = EffectParams::new().with("bogus", "1");
        let effect = ImageEffect::parse("Grayscale", &params).unwrap();
        assert_eq!(effect.kind(), EffectKind::Grayscale);
    }

    #[test]
    fn test_or_defaults_prefers_own_values() {
        let defaults = EffectParams::new()
            .with("enhancement_factor", "2.0")
            .with("color", "1,2,3");
        let own = EffectParams::new().with("color", "rgb(0, 255, 0)");

        let merged = own.or_defaults(&defaults);
        assert_eq!(merged.get("color"), Some("rgb(0, 255, 0)"));
        assert_eq!(merged.get("enhancement_factor"), Some("2.0"));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_unsupported_effect_before_pixel_work() {
        let dispatcher = EffectDispatcher::new();
        let empty = RasterImage::new(0, 0, 3, vec![]).unwrap();

        assert!(matches!(
            dispatcher.apply("Vintage", empty.clone(), &EffectParams::new()),
            Err(ImageEffectError::UnsupportedEffect(_))
        ));
        assert!(matches!(
            dispatcher.apply("Grayscale", empty, &EffectParams::new()),
            Err(ImageEffectError::Processing(_))
        ));
    }

    #[test]
    fn test_rgba_input_yields_rgb_output() {
        let image = RasterImage::new(2, 2, 4, vec![255, 0, 0, 128].repeat(4)).unwrap();
        let output = EffectDispatcher::new()
            .apply("Grayscale", image, &EffectParams::new())
            .unwrap();

        assert_eq!(output.channels(), 3);
        assert_eq!(output.dimensions(), (2, 2));
        assert!(output.pixels().all(|p| p == [76, 76, 76]));
    }
}
