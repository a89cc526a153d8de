//! Player wiring for daemon tests: a real facade over an output that never opens.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tonearm_engine::{DecoderRegistry, EngineConfig, Output, OutputConfig, OutputWaiter, Player};

use crate::session::Session;

struct NullOutput;

struct NeverReady;

impl OutputWaiter for NeverReady {
    fn wait(&self, timeout: Duration) -> Result<bool> {
        std::thread::sleep(timeout);
        Ok(false)
    }
}

impl Output for NullOutput {
    fn open(&mut self) -> Result<()> {
        Err(anyhow!("no device in tests"))
    }
    fn is_open(&self) -> bool {
        false
    }
    fn sample_rate(&self) -> u32 {
        0
    }
    fn channels(&self) -> u16 {
        0
    }
    fn set_sample_rate(&mut self, _rate: u32) -> Result<()> {
        Ok(())
    }
    fn set_channels(&mut self, _channels: u16) -> Result<()> {
        Ok(())
    }
    fn avail_update(&mut self) -> Result<usize> {
        Ok(0)
    }
    fn write(&mut self, _buf: &[u8]) -> Result<usize> {
        Ok(0)
    }
    fn waiter(&self) -> Arc<dyn OutputWaiter> {
        Arc::new(NeverReady)
    }
    fn pause(&mut self) {}
    fn paused(&self) -> bool {
        false
    }
    fn reset(&mut self) {}
    fn close(&mut self) {}
}

/// Session over a player with no decoders, accepting the default file types in `add`.
pub(crate) fn session(media_dir: &Path) -> Session {
    let player = Player::spawn(
        DecoderRegistry::new(),
        Arc::new(|_: &OutputConfig| Box::new(NullOutput) as Box<dyn Output>),
        OutputConfig::default(),
        EngineConfig::default(),
    );
    Session::new(
        Arc::new(player),
        media_dir.to_path_buf(),
        DecoderRegistry::with_defaults(),
    )
}
