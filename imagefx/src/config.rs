use anyhow::{Context, Result};
use image_effect::{EffectKind, EffectParams};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct Config {
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub engine: Engine,

    #[serde(default)]
    pub segmentation: Segmentation,

    /// Per-effect default parameters keyed by effect name.
    #[serde(default)]
    pub defaults: BTreeMap<String, BTreeMap<String, String>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Derivative)]
#[derivative(Default)]
#[serde(default)]
pub struct Engine {
    // 0 = number of cores
    pub worker_threads: usize,

    // 0 = no timeout
    #[derivative(Default(value = "120"))]
    pub timeout_secs: u64,

    pub seed: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Derivative)]
#[derivative(Default)]
#[serde(default)]
pub struct Segmentation {
    /// Catalog name such as `u2netp.onnx`.
    pub model: Option<String>,

    #[derivative(Default(value = "PathBuf::from(\"models\")"))]
    pub model_dir: PathBuf,
}

impl Config {
    /// A missing file yields the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let mut config = if path.exists() {
            let text = fs::read_to_string(path)
                .with_context(|| format!("read config {} failed", path.display()))?;
            Self::from_toml(&text).with_context(|| format!("parse config {} failed", path.display()))?
        } else {
            log::debug!("config {} not found, using defaults", path.display());
            Config::default()
        };

        config.config_path = path.to_path_buf();
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str::<Config>(text)?)
    }

    pub fn save(&self) -> Result<()> {
        let text = toml::to_string_pretty(self).context("convert config to toml failed")?;
        fs::write(&self.config_path, text)
            .with_context(|| format!("save config {} failed", self.config_path.display()))
    }

    /// Defaults configured for `kind`. Section names match effect names
    /// case-insensitively.
    pub fn defaults_for(&self, kind: EffectKind) -> EffectParams {
        self.defaults
            .iter()
            .filter(|(name, _)| {
                EffectKind::from_name(name)
                    .map(|k| k == kind)
                    .unwrap_or(false)
            })
            .flat_map(|(_, params)| params.iter())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Absolute or relative to `model_dir`.
    pub fn model_path(&self) -> Option<PathBuf> {
        self.segmentation
            .model
            .as_ref()
            .map(|model| self.segmentation.model_dir.join(model))
    }
}
