//! tonearmd — gapless music player daemon.
//!
//! Plays named playlists through a single engine thread and takes commands over a
//! line-oriented TCP protocol.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tonearmd::cli::Args;
use tonearmd::config::{DaemonConfig, FileConfig};
use tonearmd::runtime;

fn main() -> Result<()> {
    let args = Args::parse();
    let filter = match args.log_level.as_deref() {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,tonearmd=info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if args.list_devices {
        return runtime::list_devices();
    }

    let file = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let config = DaemonConfig::resolve(file, &args)?;
    tracing::info!(bind = %config.bind, media_dir = %config.media_dir.display(), "tonearmd starting");
    runtime::run(config)
}
