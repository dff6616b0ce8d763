use crate::{Error, Model, Result, tensor};
use image::{GrayImage, RgbImage};
use image_effect::{
    ImageEffectError, ImageEffectResult,
    segmentation::{SegmentationMask, Segmenter},
};
use ort::{session::Session, value::TensorRef};
use std::{path::Path, sync::Mutex, time::Instant};

const COMMON_INPUT_NAMES: [&str; 4] = ["input", "input.1", "image", "x"];
const COMMON_OUTPUT_NAMES: [&str; 4] = ["output", "mask", "foreground", "alpha"];

/// ONNX segmentation model behind the engine's `Segmenter` capability.
/// Inference needs `&mut Session`, so concurrent callers take turns.
#[derive(Debug)]
#[non_exhaustive]
pub struct OnnxSegmenter {
    model: Model,
    session: Mutex<Session>,
    input_name: String,
    output_names: Vec<String>,
}

impl OnnxSegmenter {
    pub fn new<P: AsRef<Path>>(model: Model, model_path: P) -> Result<Self> {
        let model_path = model_path.as_ref();

        if !model_path.exists() {
            return Err(Error::ModelNotFound(model_path.to_path_buf()));
        }

        log::info!("Loading ONNX model from: {}", model_path.display());

        let session = Session::builder()?.commit_from_file(model_path)?;
        let input_name = Self::get_input_name(&session);
        let output_names = session
            .outputs()
            .iter()
            .map(|output| output.name().to_string())
            .collect::<Vec<String>>();

        Ok(Self {
            model,
            session: Mutex::new(session),
            input_name,
            output_names,
        })
    }

    pub fn model(&self) -> Model {
        self.model
    }

    /// Grayscale mask at the source resolution, 255 = foreground.
    pub fn get_mask(&self, image: &RgbImage) -> Result<GrayImage> {
        let (target_width, target_height) = self.model.to_input_size();
        let resized = tensor::fast_resize(image, target_width, target_height)?;
        let input = tensor::to_nchw(&resized, self.model);

        let mut session = self
            .session
            .lock()
            .map_err(|_| Error::Generic("ONNX session lock poisoned".to_string()))?;

        let input_tensor = TensorRef::from_array_view(input.view())?;
        let outputs = session.run(ort::inputs! { &self.input_name => input_tensor })?;

        let mut extracted = None;
        for name in COMMON_OUTPUT_NAMES {
            if outputs.contains_key(name)
                && let Ok(array) = outputs[name].try_extract_array::<f32>()
            {
                extracted = Some(tensor::mask_from_output(array, self.model.rescale_output())?);
                break;
            }
        }

        // fallback
        if extracted.is_none() {
            for name in &self.output_names {
                if let Ok(array) = outputs[name.as_str()].try_extract_array::<f32>() {
                    extracted = Some(tensor::mask_from_output(array, self.model.rescale_output())?);
                    break;
                }
            }
        }

        let mask = extracted.ok_or_else(|| {
            Error::InvalidOutput("Failed to extract any output from model".to_string())
        })?;

        tensor::fast_resize_mask(&mask, image.width(), image.height())
    }

    fn get_input_name(session: &Session) -> String {
        let model_inputs = session
            .inputs()
            .iter()
            .map(|input| input.name().to_string())
            .collect::<Vec<String>>();

        for common_name in COMMON_INPUT_NAMES {
            if model_inputs.iter().any(|name| name == common_name) {
                return common_name.to_string();
            }
        }

        model_inputs
            .first()
            .cloned()
            .unwrap_or_else(|| "input".to_string())
    }
}

impl Segmenter for OnnxSegmenter {
    fn name(&self) -> &str {
        self.model.to_str()
    }

    fn segment(&self, image: &RgbImage) -> ImageEffectResult<SegmentationMask> {
        let start = Instant::now();
        let mask = self
            .get_mask(image)
            .map_err(|e| ImageEffectError::SegmentationUnavailable(e.to_string()))?;
        log::info!("{} inference spent: {:.2?}", self.model, start.elapsed());

        Ok(SegmentationMask::from_gray(&mask))
    }
}
