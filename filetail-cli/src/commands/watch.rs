//! `filetail watch`: foreground session writing frames to stdout.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use filetail_core::StreamConfig;
use filetail_daemon::{paths::config_path, watch_blocking};

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// File to stream.
    pub path: PathBuf,

    /// YAML config file (defaults to ~/.filetail/config.yaml when present).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Size in bytes above which only the trailing window is streamed.
    #[arg(long)]
    pub threshold: Option<u64>,

    /// Maximum bytes sent per change notification.
    #[arg(long)]
    pub chunk_size: Option<usize>,
}

impl WatchArgs {
    pub fn run(self) -> Result<()> {
        let config = self.resolve_config()?;
        let report = watch_blocking(&self.path, config)
            .with_context(|| format!("failed to stream {}", self.path.display()))?;
        eprintln!(
            "stream ended ({:?}): {} frames, {} bytes",
            report.end, report.stats.frames_sent, report.stats.bytes_sent
        );
        Ok(())
    }

    fn resolve_config(&self) -> Result<StreamConfig> {
        let mut config = match &self.config {
            Some(path) => StreamConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => match dirs::home_dir() {
                Some(home) => StreamConfig::load_or_default(&config_path(&home))
                    .context("failed to load ~/.filetail/config.yaml")?,
                None => StreamConfig::default(),
            },
        };
        if let Some(threshold) = self.threshold {
            config = config.with_threshold(threshold);
        }
        if let Some(chunk_size) = self.chunk_size {
            config = config.with_chunk_size(chunk_size);
        }
        config.validate().context("invalid stream settings")?;
        Ok(config)
    }
}
