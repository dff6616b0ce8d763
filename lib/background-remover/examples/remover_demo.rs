use anyhow::{Context, Result};
use background_remover::{Model, OnnxSegmenter};
use image_effect::{
    RasterImage,
    segmentation::{self, Segmenter},
};
use std::{fs, path::PathBuf, time::Instant};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let input_file = "./examples/test-rgb.png";
    let output_dir = PathBuf::from("./output");
    if !output_dir.exists() {
        fs::create_dir(&output_dir)?;
    }

    let img = image::open(input_file).with_context(|| input_file.to_string())?;
    let rgb = img.to_rgb8();
    log::info!("Image size: {}x{}", rgb.width(), rgb.height());

    for model in Model::all_models() {
        let model_name = model.to_str().trim_end_matches(".onnx");
        let model_path = PathBuf::from("./models").join(model.to_str());
        if !model_path.exists() {
            log::warn!("Model file not found: {}", model_path.display());
            continue;
        }

        let segmenter = OnnxSegmenter::new(model, &model_path)?;

        let start = Instant::now();
        let mask = segmenter.segment(&rgb)?;
        log::info!("Segmentation spent: {:?}", start.elapsed());

        let removed = segmentation::remove_background(&RasterImage::from(rgb.clone()), &mask)?;
        let output_path = output_dir.join(format!("removed_{model_name}.png"));
        removed
            .into_rgb8()
            .save(&output_path)
            .with_context(|| output_path.display().to_string())?;

        let mask_path = output_dir.join(format!("mask_{model_name}.png"));
        mask.to_binary_image().save(&mask_path)?;
        log::info!("Saved {} and {}", output_path.display(), mask_path.display());
    }

    Ok(())
}
