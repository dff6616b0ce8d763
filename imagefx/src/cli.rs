//! Command-line interface definitions.

use clap::{Parser, Subcommand};
use image_effect::EffectParams;
use std::path::PathBuf;

/// Apply image effects from the command line
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Config file path (default: imagefx.toml, optional)
    #[arg(short = 'C', long, global = true, default_value = "imagefx.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Segmentation model file, overrides `[segmentation]` in the config
    #[arg(short, long, global = true, value_hint = clap::ValueHint::FilePath)]
    pub model: Option<PathBuf>,

    /// Fixed seed for k-means and matting, overrides `[engine]` in the config
    #[arg(long, global = true)]
    pub seed: Option<u64>,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List the effects and their parameters
    #[command(visible_alias = "l")]
    List,

    /// Apply an effect to one image
    #[command(visible_alias = "a")]
    Apply {
        /// Input image
        #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
        input: PathBuf,

        /// Output image, format follows the extension
        #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
        output: PathBuf,

        #[command(flatten)]
        effect: EffectArgs,
    },

    /// Apply an effect to every image in a directory
    #[command(visible_alias = "b")]
    Batch {
        /// Input directory
        #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
        input: PathBuf,

        /// Output directory, created when missing
        #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
        output: PathBuf,

        #[command(flatten)]
        effect: EffectArgs,
    },
}

/// Effect selection shared by `apply` and `batch`
#[derive(clap::Args, Debug, Clone)]
pub struct EffectArgs {
    /// Effect name, e.g. "Cartoonify" or "Color Enhancer"
    #[arg(short, long)]
    pub effect: String,

    /// Effect parameter as key=value, repeatable
    #[arg(short, long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, String)>,
}

impl EffectArgs {
    pub fn effect_params(&self) -> EffectParams {
        self.params.iter().cloned().collect()
    }
}

fn parse_param(text: &str) -> Result<(String, String), String> {
    let (key, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{text}`"))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in `{text}`"));
    }

    Ok((key.to_string(), value.trim().to_string()))
}
