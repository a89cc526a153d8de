//! Output device discovery and stream config selection.
//!
//! Thin wrappers around CPAL for:
//! - listing available output devices
//! - selecting either the default device or a device by substring match
//! - choosing a stream config that runs at the decoder's exact sample rate

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// Pick the first output device whose name contains `needle` (case-insensitive), or the
/// host default device when `needle` is `None`.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    if let Some(needle) = needle {
        let mut devices = host.output_devices().context("No output devices")?;
        return devices
            .find(|d| {
                d.description()
                    .ok()
                    .map(|n| matches_device_name(&n.name(), needle))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("No output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

/// Pick a supported config running at exactly `rate`.
///
/// Ranges with the requested channel count win; otherwise the widest layout is used and
/// the playback callback maps channels. Among equals the better sample format wins.
pub fn pick_output_config(
    device: &cpal::Device,
    rate: u32,
    channels: u16,
) -> Result<cpal::SupportedStreamConfig> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> =
        device.supported_output_configs()?.collect();
    if ranges.is_empty() {
        return Err(anyhow!("No supported output configs"));
    }

    let mut best: Option<(Candidate, cpal::SupportedStreamConfigRange)> = None;
    for range in ranges {
        if rate < range.min_sample_rate() || rate > range.max_sample_rate() {
            continue;
        }
        let candidate = Candidate {
            exact_channels: range.channels() == channels,
            channels: range.channels(),
            format_rank: sample_format_rank(range.sample_format()),
        };
        let replace = match &best {
            None => true,
            Some((b, _)) => candidate.is_better_than(b),
        };
        if replace {
            best = Some((candidate, range));
        }
    }

    best.map(|(_, range)| range.with_sample_rate(rate))
        .ok_or_else(|| anyhow!("Output device does not support {rate} Hz"))
}

/// Pick a stream buffer size, preferring larger values to reduce underruns.
///
/// `None` lets CPAL use the device default.
pub fn pick_buffer_size(config: &cpal::SupportedStreamConfig) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            const MAX_FRAMES: u32 = 16_384;
            let chosen = if *max > MAX_FRAMES {
                if *min > MAX_FRAMES { *min } else { MAX_FRAMES }
            } else {
                *max
            };
            Some(cpal::BufferSize::Fixed(chosen))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    exact_channels: bool,
    channels: u16,
    format_rank: u8,
}

impl Candidate {
    fn is_better_than(&self, other: &Candidate) -> bool {
        if self.exact_channels != other.exact_channels {
            self.exact_channels
        } else if self.channels != other.channels {
            self.channels > other.channels
        } else {
            self.format_rank < other.format_rank
        }
    }
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::I16 => 0,
        cpal::SampleFormat::F32 => 1,
        cpal::SampleFormat::I32 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

/// Names of the host's output devices, in enumeration order.
pub fn list_devices(host: &cpal::Host) -> Result<Vec<String>> {
    let devices = host.output_devices().context("No output devices")?;
    let mut names = Vec::new();
    for d in devices {
        names.push(d.description()?.to_string());
    }
    Ok(names)
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}
