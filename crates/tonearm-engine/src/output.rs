//! Output capability and the backend-name → constructor registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::config::OutputConfig;

/// A sound sink accepting interleaved signed 16-bit little-endian PCM bytes.
///
/// Owned exclusively by the engine thread. The only thing shared with other threads is
/// the [`OutputWaiter`] returned by [`Output::waiter`].
pub trait Output {
    fn open(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;

    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    fn set_sample_rate(&mut self, rate: u32) -> Result<()>;

    fn set_channels(&mut self, channels: u16) -> Result<()>;

    /// Free space in the device buffer, in bytes.
    fn avail_update(&mut self) -> Result<usize>;

    /// Queue PCM bytes; may accept fewer than `buf.len()`.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Handle the availability monitor blocks on.
    fn waiter(&self) -> Arc<dyn OutputWaiter>;

    /// Toggle between paused and running. A paused device keeps its buffered audio.
    fn pause(&mut self);

    fn paused(&self) -> bool;

    /// Drop buffered audio that has not been played yet.
    fn reset(&mut self);

    fn close(&mut self);
}

/// Thread-safe view of an output used to wait for free buffer space.
pub trait OutputWaiter: Send + Sync {
    /// Block up to `timeout` for free buffer space. `Ok(false)` on timeout.
    fn wait(&self, timeout: Duration) -> Result<bool>;
}

/// Builds an unopened output from backend settings.
pub type OutputConstructor = Arc<dyn Fn(&OutputConfig) -> Box<dyn Output> + Send + Sync>;

/// Maps backend names (e.g. `"cpal"`) to output constructors.
#[derive(Clone, Default)]
pub struct OutputRegistry {
    by_name: HashMap<String, OutputConstructor>,
}

impl OutputRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry containing the CPAL backend under `"cpal"`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(crate::playback::BACKEND_NAME, |cfg| {
            Box::new(crate::playback::CpalOutput::new(cfg.clone())) as Box<dyn Output>
        });
        registry
    }

    pub fn register<F>(&mut self, name: &str, ctor: F)
    where
        F: Fn(&OutputConfig) -> Box<dyn Output> + Send + Sync + 'static,
    {
        self.by_name.insert(name.to_ascii_lowercase(), Arc::new(ctor));
    }

    pub fn get(&self, name: &str) -> Option<OutputConstructor> {
        self.by_name.get(&name.to_ascii_lowercase()).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.by_name.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for OutputRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputRegistry")
            .field("backends", &self.names())
            .finish()
    }
}
