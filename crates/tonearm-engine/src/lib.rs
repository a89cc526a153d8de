//! Gapless playback engine.
//!
//! A single engine thread owns the decoder and output and is driven by two channels:
//! commands from the [`player::Player`] facade and availability signals from a
//! per-session monitor thread. Decoders and outputs are pluggable through
//! [`decoder::DecoderRegistry`] and [`output::OutputRegistry`]; Symphonia and CPAL
//! bindings are registered by default.

pub mod config;
pub mod decode;
pub mod decoder;
pub mod device;
pub mod engine;
pub mod error;
mod monitor;
pub mod output;
pub mod playback;
pub mod player;
pub mod queue;
pub mod registry;
pub mod status;

#[cfg(test)]
mod testing;

pub use config::{EngineConfig, OutputConfig};
pub use decoder::{Decoder, DecoderRegistry};
pub use error::PlayerError;
pub use output::{Output, OutputRegistry, OutputWaiter};
pub use player::Player;
