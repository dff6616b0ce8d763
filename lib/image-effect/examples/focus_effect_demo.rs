use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use image_effect::{
    EffectDispatcher, EffectParams, RasterImage,
    segmentation::{RectPriorMatting, Segmenter},
};
use std::{fs, path::Path, time::Instant};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let output_dir = Path::new("tmp");
    fs::create_dir_all(output_dir)?;

    let img = match image::open("data/test.png") {
        Ok(img) => img.to_rgb8(),
        Err(_) => RgbImage::from_fn(320, 240, |x, y| {
            if (110..210).contains(&x) && (70..170).contains(&y) {
                Rgb([220, 60, 60])
            } else {
                Rgb([((x / 16 + y / 16) % 2 * 120 + 60) as u8, 140, 90])
            }
        }),
    };

    let start = Instant::now();
    let mask = RectPriorMatting::new().with_seed(1).segment(&img)?;
    log::info!(
        "rect prior matting spent: {:?}, foreground {:.1}%",
        start.elapsed(),
        mask.foreground_ratio() * 100.0
    );

    let mask_path = output_dir.join("focus_mask.png");
    mask.to_binary_image().save(&mask_path)?;

    let dispatcher = EffectDispatcher::new().with_seed(Some(1));
    for (name, effect) in [("focus", "Focus Effect"), ("removed", "Background Removal")] {
        let output = dispatcher.apply(
            effect,
            RasterImage::from(img.clone()),
            &EffectParams::new().with("strategy", "rect"),
        )?;

        let path = output_dir.join(format!("{name}.png"));
        output
            .into_rgb8()
            .save(&path)
            .with_context(|| path.display().to_string())?;
        log::info!("saved {}", path.display());
    }

    Ok(())
}
