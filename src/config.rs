//! Runtime configuration: built-in defaults < `aura.toml` < CLI flags.

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub bind_addr: String,
    pub output_dir: PathBuf,
    pub encoder_path: Option<String>,
    pub offline_only: bool,
    pub max_concurrent_jobs: usize,
    pub job_retention: usize,
    pub heartbeat_interval_secs: u64,
    pub event_poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8787".to_string(),
            output_dir: default_output_dir(),
            encoder_path: None,
            offline_only: false,
            max_concurrent_jobs: default_worker_count(),
            job_retention: 50,
            heartbeat_interval_secs: 30,
            event_poll_interval_ms: 1000,
        }
    }
}

fn default_output_dir() -> PathBuf {
    dirs::document_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("AuraVideos")
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .min(4)
}

#[derive(Debug, Parser)]
#[command(name = "aura-studio", about = "Local video-generation studio orchestrator")]
pub struct Cli {
    /// Path to a TOML config file overriding built-in defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub bind_addr: Option<String>,

    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    #[arg(long)]
    pub encoder_path: Option<String>,

    #[arg(long)]
    pub offline_only: bool,

    #[arg(long)]
    pub max_concurrent_jobs: Option<usize>,
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = match &cli.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| anyhow::anyhow!("reading config file {path:?}: {e}"))?;
                toml::from_str(&text)
                    .map_err(|e| anyhow::anyhow!("parsing config file {path:?}: {e}"))?
            }
            None => Config::default(),
        };

        if let Some(v) = &cli.bind_addr {
            config.bind_addr = v.clone();
        }
        if let Some(v) = &cli.output_dir {
            config.output_dir = v.clone();
        }
        if let Some(v) = &cli.encoder_path {
            config.encoder_path = Some(v.clone());
        }
        if cli.offline_only {
            config.offline_only = true;
        }
        if let Some(v) = cli.max_concurrent_jobs {
            config.max_concurrent_jobs = v;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_take_precedence_over_defaults() {
        let cli = Cli {
            config: None,
            bind_addr: Some("127.0.0.1:9999".to_string()),
            output_dir: None,
            encoder_path: None,
            offline_only: true,
            max_concurrent_jobs: Some(2),
        };
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9999");
        assert!(config.offline_only);
        assert_eq!(config.max_concurrent_jobs, 2);
    }
}
