//! imagefx command line front end
//!
//! Loads images from disk, runs one named effect through
//! [`image_effect::EffectDispatcher`] and writes the result back.
//!
//! # Architecture
//! - `cli`: argument definitions
//! - `config`: optional TOML configuration (engine, segmentation, per-effect defaults)
//! - `runner`: single jobs and the batch worker pool with per-job timeouts

#[macro_use]
extern crate derivative;

pub mod cli;
pub mod config;
pub mod runner;

/// Initializes the logger.
///
/// Line format is `[HH:MM:SS LEVEL file line] message`. The level defaults to
/// `info` and can be overridden with `RUST_LOG`.
pub fn init_logger() {
    use std::io::Write;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let style = buf.default_level_style(record.level());
            let ts = chrono::Local::now().format("%H:%M:%S");

            writeln!(
                buf,
                "[{} {style}{}{style:#} {} {}] {}",
                ts,
                record.level(),
                record
                    .file()
                    .unwrap_or("None")
                    .split('/')
                    .next_back()
                    .unwrap_or("None"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .init();
}
