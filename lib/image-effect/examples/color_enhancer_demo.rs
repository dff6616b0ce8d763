use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use image_effect::{EffectDispatcher, EffectParams, RasterImage};
use std::{fs, path::Path};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let output_dir = Path::new("tmp");
    fs::create_dir_all(output_dir)?;

    let img = match image::open("data/test.png") {
        Ok(img) => img.to_rgb8(),
        Err(_) => RgbImage::from_fn(300, 100, |x, _| match x / 100 {
            0 => Rgb([200, 90, 90]),
            1 => Rgb([110, 190, 110]),
            _ => Rgb([90, 90, 200]),
        }),
    };

    let dispatcher = EffectDispatcher::new();
    let cases = [
        ("red", "rgb(255, 0, 0)", "true"),
        ("green", "[0, 255, 0]", "true"),
        ("blue_boost_only", "0,0,255", "false"),
    ];

    for (name, color, suppress_others) in cases {
        let params = EffectParams::new()
            .with("color", color)
            .with("enhancement_factor", "2.5")
            .with("suppress_others", suppress_others);

        let output = dispatcher.apply("Color Enhancer", RasterImage::from(img.clone()), &params)?;

        let path = output_dir.join(format!("color_enhancer_{name}.png"));
        output
            .into_rgb8()
            .save(&path)
            .with_context(|| path.display().to_string())?;
        log::info!("saved {}", path.display());
    }

    Ok(())
}
