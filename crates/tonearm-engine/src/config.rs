use std::time::Duration;

/// Engine loop and monitor tuning.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Upper bound for a single "wait for free buffer space" call in the monitor.
    pub monitor_timeout: Duration,
    /// Pause before retrying after the output's wait call fails.
    pub monitor_retry_delay: Duration,
    /// Consecutive track failures tolerated before the engine gives up and stops.
    pub max_track_failures: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            monitor_timeout: Duration::from_millis(100),
            monitor_retry_delay: Duration::from_millis(100),
            max_track_failures: 5,
        }
    }
}

/// Settings for the CPAL output backend.
#[derive(Clone, Debug)]
pub struct OutputConfig {
    /// Output device by substring match; default device when `None`.
    pub device: Option<String>,
    /// Size of the output ring buffer, in seconds of audio.
    pub buffer_seconds: f32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            device: None,
            buffer_seconds: 0.5,
        }
    }
}
