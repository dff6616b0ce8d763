// cargo test -p imagefx --test batch_test

use anyhow::Result;
use image::{Rgb, RgbImage};
use image_effect::EffectParams;
use imagefx::{
    config::Engine,
    runner::{self, Runner},
};

fn engine() -> Engine {
    Engine {
        worker_threads: 2,
        timeout_secs: 60,
        seed: Some(5),
    }
}

#[test]
fn test_batch_writes_every_image() -> Result<()> {
    let input = tempfile::tempdir()?;
    let output = tempfile::tempdir()?;
    let out_dir = output.path().join("gray");

    for (index, color) in [[255, 0, 0], [0, 255, 0], [0, 0, 255]].into_iter().enumerate() {
        RgbImage::from_pixel(12, 9, Rgb(color)).save(input.path().join(format!("{index}.png")))?;
    }

    let jobs = runner::collect_jobs(input.path(), &out_dir)?;
    assert_eq!(jobs.len(), 3);

    let runner = Runner::new(runner::build_dispatcher(&Default::default(), None)?, &engine())?;
    let results = runner.run_batch("Grayscale", &EffectParams::new(), &jobs);
    runner::summarize(&jobs, &results)?;

    for (job, expected) in jobs.iter().zip([76u8, 150, 29]) {
        let image = image::open(&job.output)?.into_rgb8();
        assert_eq!(image.dimensions(), (12, 9));
        assert!(image.pixels().all(|p| p.0 == [expected; 3]));
    }
    Ok(())
}

#[test]
fn test_batch_reports_failures() -> Result<()> {
    let input = tempfile::tempdir()?;
    let output = tempfile::tempdir()?;

    RgbImage::from_pixel(4, 4, Rgb([10, 20, 30])).save(input.path().join("ok.png"))?;
    std::fs::write(input.path().join("broken.png"), b"not a png")?;

    let jobs = runner::collect_jobs(input.path(), output.path())?;
    let runner = Runner::new(runner::build_dispatcher(&Default::default(), None)?, &engine())?;
    let results = runner.run_batch("Cartoonify", &EffectParams::new(), &jobs);

    assert_eq!(results.len(), 2);
    assert!(results[0].is_err());
    assert!(results[1].is_ok());
    assert!(runner::summarize(&jobs, &results).is_err());
    Ok(())
}
