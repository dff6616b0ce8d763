//! Model based foreground segmentation.
//!
//! The model catalog and the tensor pre/post-processing are always built; the
//! ONNX Runtime session that drives them sits behind the `onnx` feature.

pub mod model;
pub mod tensor;

#[cfg(feature = "onnx")]
pub mod segmenter;

pub use model::Model;

#[cfg(feature = "onnx")]
pub use segmenter::OnnxSegmenter;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Model file not found: {0}")]
    ModelNotFound(std::path::PathBuf),

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Invalid model output: {0}")]
    InvalidOutput(String),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[cfg(feature = "onnx")]
    #[error("ONNX Runtime error: {0}")]
    OnnxRuntime(#[from] ort::Error),

    #[error("Image resize error: {0}")]
    ImageResize(#[from] fast_image_resize::ResizeError),

    #[error("Image buffer error: {0}")]
    ImageBufferError(#[from] fast_image_resize::ImageBufferError),

    #[error("{0}")]
    Generic(String),
}
