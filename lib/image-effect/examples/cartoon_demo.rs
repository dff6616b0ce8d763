use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use image_effect::{EffectDispatcher, EffectParams, RasterImage};
use std::{fs, path::Path, time::Instant};

// Stripes and a disc: enough structure for edges and a small palette.
fn sample_image() -> RgbImage {
    RgbImage::from_fn(320, 240, |x, y| {
        let (dx, dy) = (x as i32 - 160, y as i32 - 120);
        if dx * dx + dy * dy < 70 * 70 {
            Rgb([230, 180, 40])
        } else {
            Rgb([(x * 255 / 320) as u8, 90, (y * 255 / 240) as u8])
        }
    })
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let output_dir = Path::new("tmp");
    fs::create_dir_all(output_dir)?;

    let img = match image::open("data/test.png") {
        Ok(img) => img.to_rgb8(),
        Err(_) => sample_image(),
    };

    let dispatcher = EffectDispatcher::new().with_seed(Some(7));

    for composite in ["edges", "ink"] {
        let params = EffectParams::new()
            .with("colors", "8")
            .with("composite", composite);

        let start = Instant::now();
        let output = dispatcher.apply("Cartoonify", RasterImage::from(img.clone()), &params)?;
        log::info!("cartoonify ({composite}) spent: {:?}", start.elapsed());

        let path = output_dir.join(format!("cartoon_{composite}.png"));
        output
            .into_rgb8()
            .save(&path)
            .with_context(|| path.display().to_string())?;
        log::info!("saved {}", path.display());
    }

    Ok(())
}
