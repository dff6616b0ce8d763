use crate::config::{Config, Engine};
use anyhow::{Context, Result, bail};
use background_remover::Model;
use crossbeam::channel::{RecvTimeoutError, bounded};
use image::{DynamicImage, ImageFormat};
use image_effect::{
    CancelToken, EffectDispatcher, EffectParams, ImageEffectResult, RasterImage,
};
use rayon::prelude::*;
use std::{
    fs,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub input: PathBuf,
    pub output: PathBuf,
}

/// Builds the dispatcher from the config. `model` overrides the configured
/// segmentation model.
pub fn build_dispatcher(config: &Config, model: Option<&Path>) -> Result<EffectDispatcher> {
    let dispatcher = EffectDispatcher::new().with_seed(config.engine.seed);

    let Some(model_path) = model.map(Path::to_path_buf).or_else(|| config.model_path()) else {
        return Ok(dispatcher);
    };

    let file_name = model_path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("invalid model path {}", model_path.display()))?;
    let model = file_name
        .parse::<Model>()
        .with_context(|| format!("unsupported segmentation model {}", model_path.display()))?;

    attach_segmenter(dispatcher, model, &model_path)
}

#[cfg(feature = "onnx")]
fn attach_segmenter(dispatcher: EffectDispatcher, model: Model, path: &Path) -> Result<EffectDispatcher> {
    use background_remover::OnnxSegmenter;
    use std::sync::Arc;

    let segmenter = OnnxSegmenter::new(model, path)
        .with_context(|| format!("load segmentation model {} failed", path.display()))?;

    Ok(dispatcher.with_segmenter(Arc::new(segmenter)))
}

#[cfg(not(feature = "onnx"))]
fn attach_segmenter(dispatcher: EffectDispatcher, model: Model, path: &Path) -> Result<EffectDispatcher> {
    log::warn!(
        "built without the `onnx` feature, ignoring {model} at {}",
        path.display()
    );
    Ok(dispatcher)
}

pub fn load_image(path: &Path) -> Result<RasterImage> {
    let image = image::open(path).with_context(|| format!("decode {} failed", path.display()))?;

    let raster = match image {
        DynamicImage::ImageRgb8(rgb) => RasterImage::from(rgb),
        other if other.color().has_alpha() => RasterImage::from(other.into_rgba8()),
        other => RasterImage::from(other.into_rgb8()),
    };

    Ok(raster)
}

pub fn save_image(image: RasterImage, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        fs::create_dir_all(dir).with_context(|| format!("create {} failed", dir.display()))?;
    }

    image
        .into_rgb8()
        .save(path)
        .with_context(|| format!("encode {} failed", path.display()))
}

/// Images in `input_dir` whose extension names a known format, sorted by path.
pub fn collect_jobs(input_dir: &Path, output_dir: &Path) -> Result<Vec<Job>> {
    let entries = fs::read_dir(input_dir)
        .with_context(|| format!("read directory {} failed", input_dir.display()))?;

    let mut jobs = vec![];
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() || ImageFormat::from_path(&path).is_err() {
            continue;
        }

        if let Some(name) = path.file_name() {
            jobs.push(Job {
                output: output_dir.join(name),
                input: path,
            });
        }
    }

    jobs.sort_by(|a, b| a.input.cmp(&b.input));
    Ok(jobs)
}

pub struct Runner {
    dispatcher: EffectDispatcher,
    timeout: Option<Duration>,
    pool: rayon::ThreadPool,
}

impl Runner {
    pub fn new(dispatcher: EffectDispatcher, engine: &Engine) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(engine.worker_threads)
            .thread_name(|index| format!("imagefx-worker-{index}"))
            .build()
            .context("create worker pool failed")?;

        let timeout = (engine.timeout_secs > 0).then(|| Duration::from_secs(engine.timeout_secs));

        Ok(Self {
            dispatcher,
            timeout,
            pool,
        })
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn dispatcher(&self) -> &EffectDispatcher {
        &self.dispatcher
    }

    /// Runs the effect; once the timeout elapses a watchdog cancels it.
    pub fn apply(
        &self,
        effect: &str,
        image: RasterImage,
        params: &EffectParams,
    ) -> ImageEffectResult<RasterImage> {
        let Some(timeout) = self.timeout else {
            return self.dispatcher.apply(effect, image, params);
        };

        let token = CancelToken::new();
        let (done_tx, done_rx) = bounded::<()>(1);

        let watchdog = {
            let token = token.clone();
            thread::spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = done_rx.recv_timeout(timeout) {
                    log::warn!("job exceeded {timeout:?}, cancelling");
                    token.cancel();
                }
            })
        };

        let result = self
            .dispatcher
            .apply_cancellable(effect, image, params, &token);

        _ = done_tx.send(());
        if watchdog.join().is_err() {
            log::warn!("watchdog thread panicked");
        }

        result
    }

    pub fn run(&self, effect: &str, params: &EffectParams, job: &Job) -> Result<()> {
        let start = Instant::now();

        let image = load_image(&job.input)?;
        let output = self
            .apply(effect, image, params)
            .with_context(|| format!("{effect} on {} failed", job.input.display()))?;
        save_image(output, &job.output)?;

        log::info!(
            "{} -> {} spent: {:.2?}",
            job.input.display(),
            job.output.display(),
            start.elapsed()
        );

        Ok(())
    }

    /// Jobs run in parallel on the worker pool. Results keep the job order.
    pub fn run_batch(
        &self,
        effect: &str,
        params: &EffectParams,
        jobs: &[Job],
    ) -> Vec<Result<()>> {
        self.pool.install(|| {
            jobs.par_iter()
                .map(|job| self.run(effect, params, job))
                .collect()
        })
    }
}

/// Fails when any job failed, after logging each failure.
pub fn summarize(jobs: &[Job], results: &[Result<()>]) -> Result<()> {
    let mut failed = 0;
    for (job, result) in jobs.iter().zip(results) {
        if let Err(e) = result {
            failed += 1;
            log::warn!("{}: {e:#}", job.input.display());
        }
    }

    log::info!("{} of {} images processed", jobs.len() - failed, jobs.len());

    if failed > 0 {
        bail!("{failed} of {} images failed", jobs.len());
    }

    Ok(())
}
