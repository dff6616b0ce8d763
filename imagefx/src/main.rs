use anyhow::{Context, Result, bail};
use clap::Parser;
use image_effect::{EffectKind, EffectParams};
use imagefx::{
    cli::{Cli, Commands, EffectArgs},
    config::Config,
    runner::{self, Job, Runner},
};

fn main() -> Result<()> {
    imagefx::init_logger();

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)?;
    if cli.seed.is_some() {
        config.engine.seed = cli.seed;
    }

    match &cli.command {
        Commands::List => {
            list_effects();
            Ok(())
        }
        Commands::Apply {
            input,
            output,
            effect,
        } => {
            let (kind, params) = effect_params(&config, effect)?;
            let dispatcher = runner::build_dispatcher(&config, cli.model.as_deref())?;
            let runner = Runner::new(dispatcher, &config.engine)?;

            let job = Job {
                input: input.clone(),
                output: output.clone(),
            };
            runner.run(kind.name(), &params, &job)
        }
        Commands::Batch {
            input,
            output,
            effect,
        } => {
            let (kind, params) = effect_params(&config, effect)?;
            let jobs = runner::collect_jobs(input, output)?;
            if jobs.is_empty() {
                bail!("no images found in {}", input.display());
            }

            let dispatcher = runner::build_dispatcher(&config, cli.model.as_deref())?;
            let runner = Runner::new(dispatcher, &config.engine)?;

            log::info!(
                "{kind}: {} images with segmenter `{}`",
                jobs.len(),
                runner.dispatcher().segmenter_name()
            );

            let results = runner.run_batch(kind.name(), &params, &jobs);
            runner::summarize(&jobs, &results)
        }
    }
}

/// Resolves the effect name and layers command line parameters over the
/// configured defaults.
fn effect_params(config: &Config, args: &EffectArgs) -> Result<(EffectKind, EffectParams)> {
    let kind = EffectKind::from_name(&args.effect)
        .context("`imagefx list` shows the supported effects")?;

    let params = args.effect_params().or_defaults(&config.defaults_for(kind));
    Ok((kind, params))
}

fn list_effects() {
    for kind in EffectKind::all() {
        println!("{kind}");
        for spec in kind.params() {
            let default = match (spec.required, spec.default) {
                (true, _) => "required".to_string(),
                (false, Some(value)) => format!("default: {value}"),
                (false, None) => "optional".to_string(),
            };
            println!("    {:<20} {} ({default})", spec.name, spec.help);
        }
    }
}
