//! Pixel-level image effects.
//!
//! Every effect takes a decoded raster and returns a new raster of the same
//! width and height. The [`dispatcher::EffectDispatcher`] is the single entry
//! point that maps an effect name plus textual parameters onto one of the
//! effect configurations in this crate.

pub mod blur;
pub mod cancel;
pub mod colour_space;
pub mod dispatcher;
pub mod edge;
pub mod monochrome;
pub mod quantize;
pub mod raster;
pub mod segmentation;
pub mod selective;
pub mod stylized;

pub use cancel::CancelToken;
pub use dispatcher::{EffectDispatcher, EffectKind, EffectParams, ImageEffect, MaskStrategy, ParamSpec};
pub use raster::RasterImage;
pub use segmentation::{SegmentationMask, Segmenter};
pub use selective::ColorTarget;

use image::RgbImage;

pub type ImageEffectResult<T> = Result<T, ImageEffectError>;

#[derive(thiserror::Error, Debug)]
pub enum ImageEffectError {
    #[error("Invalid parameter: {0}")]
    Parameter(String),

    #[error("Unsupported effect: {0}")]
    UnsupportedEffect(String),

    #[error("Dimension mismatch: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Segmentation unavailable: {0}")]
    SegmentationUnavailable(String),

    #[error("Image processing error: {0}")]
    Processing(String),

    #[error("Operation cancelled")]
    Cancelled,
}

pub trait Effect {
    fn apply(&self, image: RgbImage) -> ImageEffectResult<RgbImage>;
}
