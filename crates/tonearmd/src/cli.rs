use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Package version with the commit and build date stamped in by `build.rs`.
pub const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

/// Flags override values from the config file.
#[derive(Parser, Debug, Default)]
#[command(name = "tonearmd", version = VERSION)]
pub struct Args {
    /// TOML config file
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Address for the control protocol, e.g. 127.0.0.1:7700
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    /// Directory relative paths in `add` are resolved against
    #[arg(long)]
    pub media_dir: Option<PathBuf>,

    /// Output backend name
    #[arg(long)]
    pub output: Option<String>,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Output ring buffer size in seconds
    #[arg(long)]
    pub buffer_seconds: Option<f32>,

    /// Log filter, e.g. "debug" or "info,tonearm_engine=trace" (overrides RUST_LOG)
    #[arg(long)]
    pub log_level: Option<String>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,
}
