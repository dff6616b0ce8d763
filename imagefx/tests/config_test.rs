// cargo test -p imagefx --test config_test

use anyhow::Result;
use image_effect::{EffectKind, EffectParams};
use imagefx::config::Config;
use std::fs;

#[test]
fn test_missing_file_gives_defaults() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("imagefx.toml");

    let config = Config::load(&path)?;
    assert_eq!(config.config_path, path);
    assert_eq!(config.engine.timeout_secs, 120);
    assert!(config.segmentation.model.is_none());
    Ok(())
}

#[test]
fn test_load_and_merge_defaults() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("imagefx.toml");
    fs::write(
        &path,
        r#"
[engine]
worker_threads = 3
timeout_secs = 0
seed = 42

[segmentation]
model = "u2netp.onnx"
model_dir = "/opt/models"

[defaults."Color Enhancer"]
enhancement_factor = "2.0"
color = "rgb(255, 0, 0)"
"#,
    )?;

    let config = Config::load(&path)?;
    assert_eq!(config.engine.worker_threads, 3);
    assert_eq!(config.engine.timeout_secs, 0);
    assert_eq!(config.engine.seed, Some(42));
    assert_eq!(
        config.model_path().as_deref(),
        Some(std::path::Path::new("/opt/models/u2netp.onnx"))
    );

    let cli = EffectParams::new().with("color", "0,255,0");
    let merged = cli.or_defaults(&config.defaults_for(EffectKind::ColorEnhancer));
    assert_eq!(merged.get("color"), Some("0,255,0"));
    assert_eq!(merged.get("enhancement_factor"), Some("2.0"));
    Ok(())
}

#[test]
fn test_parse_error_names_the_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[engine\nseed = 1")?;

    let err = Config::load(&path).unwrap_err();
    assert!(format!("{err:#}").contains("broken.toml"));
    Ok(())
}

#[test]
fn test_save_then_load() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("saved.toml");

    let mut config = Config::load(&path)?;
    config.engine.seed = Some(9);
    config
        .defaults
        .entry("Cartoonify".to_string())
        .or_default()
        .insert("colors".to_string(), "6".to_string());
    config.save()?;

    let loaded = Config::load(&path)?;
    assert_eq!(loaded.engine.seed, Some(9));
    assert_eq!(loaded.defaults_for(EffectKind::Cartoonify).get("colors"), Some("6"));
    Ok(())
}
