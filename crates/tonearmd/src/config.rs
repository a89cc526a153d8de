//! Daemon configuration.
//!
//! Defines the TOML schema (every field optional), and resolves it together with CLI
//! flags and defaults into [`DaemonConfig`].

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tonearm_engine::{EngineConfig, OutputConfig};

use crate::cli::Args;

pub const DEFAULT_BIND: &str = "127.0.0.1:7700";
pub const DEFAULT_OUTPUT: &str = "cpal";

/// Config file contents.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub bind: Option<String>,
    pub media_dir: Option<PathBuf>,
    pub output: Option<String>,
    pub device: Option<String>,
    pub buffer_seconds: Option<f32>,
    pub monitor_timeout_ms: Option<u64>,
    pub monitor_retry_ms: Option<u64>,
    pub max_track_failures: Option<usize>,
}

impl FileConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        toml::from_str::<FileConfig>(&raw).with_context(|| format!("parse config {:?}", path))
    }
}

/// Fully resolved daemon settings.
#[derive(Clone, Debug)]
pub struct DaemonConfig {
    pub bind: SocketAddr,
    pub media_dir: PathBuf,
    /// Output backend name.
    pub output: String,
    pub output_config: OutputConfig,
    pub engine: EngineConfig,
}

impl DaemonConfig {
    /// Merge `file` and `args`; flags win over the file, defaults fill the rest.
    pub fn resolve(file: FileConfig, args: &Args) -> Result<Self> {
        let bind = match args.bind {
            Some(addr) => addr,
            None => {
                let raw = file.bind.as_deref().unwrap_or(DEFAULT_BIND);
                raw.parse()
                    .with_context(|| format!("invalid bind address {raw:?}"))?
            }
        };
        let media_dir = args
            .media_dir
            .clone()
            .or(file.media_dir)
            .unwrap_or_else(|| PathBuf::from("."));

        let output_defaults = OutputConfig::default();
        let output_config = OutputConfig {
            device: normalize_device_name(args.device.clone().or(file.device)),
            buffer_seconds: args
                .buffer_seconds
                .or(file.buffer_seconds)
                .unwrap_or(output_defaults.buffer_seconds),
        };

        let engine_defaults = EngineConfig::default();
        let engine = EngineConfig {
            monitor_timeout: file
                .monitor_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(engine_defaults.monitor_timeout),
            monitor_retry_delay: file
                .monitor_retry_ms
                .map(Duration::from_millis)
                .unwrap_or(engine_defaults.monitor_retry_delay),
            max_track_failures: file
                .max_track_failures
                .unwrap_or(engine_defaults.max_track_failures),
        };

        Ok(Self {
            bind,
            media_dir,
            output: args
                .output
                .clone()
                .or(file.output)
                .unwrap_or_else(|| DEFAULT_OUTPUT.to_string()),
            output_config,
            engine,
        })
    }
}

fn normalize_device_name(name: Option<String>) -> Option<String> {
    name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}
