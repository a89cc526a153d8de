//! CPAL-backed [`Output`].
//!
//! The engine writes S16LE bytes into a [`PcmRing`]; the CPAL callback drains it and
//! converts to the device sample format. The stream is (re)built lazily once rate and
//! channel count are known, so a format change only costs a new stream. The ring itself
//! lives as long as the output and is resized in place, so waiters handed to the
//! availability monitor never go stale.
//!
//! The callback:
//! - drains the ring without blocking
//! - plays silence on underrun and while paused (the ring is not drained then)
//! - applies basic channel mapping (mono↔stereo, best-effort otherwise)

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, StreamTrait};

use crate::config::OutputConfig;
use crate::device;
use crate::output::{Output, OutputWaiter};
use crate::queue::{PcmRing, calc_capacity_samples};

/// Name the CPAL backend is registered under.
pub const BACKEND_NAME: &str = "cpal";

pub struct CpalOutput {
    config: OutputConfig,
    device: Option<cpal::Device>,
    stream: Option<cpal::Stream>,
    ring: Arc<PcmRing>,
    rate: u32,
    channels: u16,
    paused: bool,
}

impl CpalOutput {
    pub fn new(config: OutputConfig) -> Self {
        Self {
            config,
            device: None,
            stream: None,
            ring: Arc::new(PcmRing::new(1)),
            rate: 0,
            channels: 0,
            paused: false,
        }
    }

    /// Build the stream for the current format if there is none.
    fn ensure_stream(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| anyhow!("output is not open"))?;
        if self.rate == 0 || self.channels == 0 {
            return Err(anyhow!("output format not configured"));
        }

        let supported = device::pick_output_config(device, self.rate, self.channels)?;
        let mut stream_config: cpal::StreamConfig = supported.config();
        if let Some(size) = device::pick_buffer_size(&supported) {
            stream_config.buffer_size = size;
        }

        self.ring.resize(calc_capacity_samples(
            self.rate,
            self.channels,
            self.config.buffer_seconds,
        ));
        self.ring.set_paused(self.paused);

        let stream = build_output_stream(
            device,
            &stream_config,
            supported.sample_format(),
            self.ring.clone(),
            self.channels as usize,
        )?;
        stream.play().context("start output stream")?;

        tracing::info!(
            rate = self.rate,
            channels = self.channels,
            device_channels = stream_config.channels,
            format = ?supported.sample_format(),
            capacity = self.ring.capacity(),
            "output stream started"
        );
        self.stream = Some(stream);
        Ok(())
    }

    fn drop_stream(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("output stream dropped");
        }
        self.ring.clear();
    }
}

impl Output for CpalOutput {
    fn open(&mut self) -> Result<()> {
        let host = cpal::default_host();
        let device = device::pick_device(&host, self.config.device.as_deref())?;
        if let Ok(desc) = device.description() {
            tracing::info!(device = %desc, "output device");
        }
        self.device = Some(device);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.device.is_some()
    }

    fn sample_rate(&self) -> u32 {
        self.rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn set_sample_rate(&mut self, rate: u32) -> Result<()> {
        if rate == 0 {
            return Err(anyhow!("invalid sample rate 0"));
        }
        if rate != self.rate {
            self.drop_stream();
            self.rate = rate;
        }
        Ok(())
    }

    fn set_channels(&mut self, channels: u16) -> Result<()> {
        if channels == 0 {
            return Err(anyhow!("invalid channel count 0"));
        }
        if channels != self.channels {
            self.drop_stream();
            self.channels = channels;
        }
        Ok(())
    }

    fn avail_update(&mut self) -> Result<usize> {
        self.ensure_stream()?;
        Ok(self.ring.free() * 2)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.ensure_stream()?;
        Ok(self.ring.push_le_bytes(buf))
    }

    fn waiter(&self) -> Arc<dyn OutputWaiter> {
        Arc::new(RingWaiter(self.ring.clone()))
    }

    fn pause(&mut self) {
        self.paused = !self.paused;
        self.ring.set_paused(self.paused);
    }

    fn paused(&self) -> bool {
        self.paused
    }

    fn reset(&mut self) {
        self.ring.clear();
    }

    fn close(&mut self) {
        self.drop_stream();
        if self.ring.underruns() > 0 {
            tracing::debug!(underruns = self.ring.underruns(), "output closed");
        }
        self.ring.set_paused(false);
        self.device = None;
        self.rate = 0;
        self.channels = 0;
        self.paused = false;
    }
}

struct RingWaiter(Arc<PcmRing>);

impl OutputWaiter for RingWaiter {
    fn wait(&self, timeout: Duration) -> Result<bool> {
        Ok(self.0.wait_for_space(timeout))
    }
}

fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    ring: Arc<PcmRing>,
    src_channels: usize,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, ring, src_channels),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, ring, src_channels),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, ring, src_channels),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, ring, src_channels),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    ring: Arc<PcmRing>,
    src_channels: usize,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<i16>,
{
    let dst_channels = config.channels as usize;
    let mut scratch: Vec<i16> = Vec::new();
    let err_fn = |err| tracing::warn!("stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            fill_from_ring(data, &mut scratch, &ring, src_channels, dst_channels);
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}

/// Fill one device buffer from `ring`, mapping `src_channels` onto `dst_channels`.
/// Whatever the ring cannot supply is silence.
fn fill_from_ring<T>(
    data: &mut [T],
    scratch: &mut Vec<i16>,
    ring: &PcmRing,
    src_channels: usize,
    dst_channels: usize,
) where
    T: cpal::Sample + cpal::FromSample<i16>,
{
    let src_channels = src_channels.max(1);
    let dst_channels = dst_channels.max(1);
    let frames = data.len() / dst_channels;

    scratch.clear();
    scratch.resize(frames * src_channels, 0);
    ring.pop_into(scratch);

    for (frame, out) in data.chunks_exact_mut(dst_channels).enumerate() {
        let src = &scratch[frame * src_channels..(frame + 1) * src_channels];
        for (ch, slot) in out.iter_mut().enumerate() {
            *slot = <T as cpal::Sample>::from_sample::<i16>(map_channel(src, dst_channels, ch));
        }
    }
}

/// Mapping rules:
/// - mono → any: duplicate channel 0
/// - stereo → mono: average L/R
/// - otherwise: clamp to the available source channels
fn map_channel(src: &[i16], dst_channels: usize, dst_ch: usize) -> i16 {
    match (src.len(), dst_channels) {
        (1, _) => src[0],
        (2, 1) => ((src[0] as i32 + src[1] as i32) / 2) as i16,
        (n, _) => src[dst_ch.min(n - 1)],
    }
}
