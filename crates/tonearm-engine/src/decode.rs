//! Symphonia-backed [`Decoder`].
//!
//! Pulls packets on demand from the engine thread and converts them to interleaved
//! signed 16-bit little-endian bytes. Bytes of a decoded packet that did not fit the
//! caller's buffer are kept for the next `read`.

use std::fs::File;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};

use crate::decoder::Decoder;

/// Extensions registered by [`crate::decoder::DecoderRegistry::with_defaults`].
pub const SUPPORTED_EXTENSIONS: [&str; 7] = ["flac", "mp3", "ogg", "wav", "m4a", "aac", "aiff"];

const BYTES_PER_SAMPLE: usize = 2;

struct OpenStream {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn symphonia::core::codecs::Decoder>,
    track_id: u32,
    time_base: Option<TimeBase>,
    rate: u32,
    channels: u16,
    /// PCM of the last decoded packet.
    pending: Vec<u8>,
    pending_off: usize,
    /// Stream time of `pending[0]`.
    packet_time: Duration,
    /// Frames before this time are dropped after an exact seek.
    seek_target: Option<Duration>,
    eof: bool,
}

/// Decoder for every container/codec pair compiled into Symphonia.
#[derive(Default)]
pub struct SymphoniaDecoder {
    stream: Option<OpenStream>,
}

impl SymphoniaDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn stream(&mut self) -> Result<&mut OpenStream> {
        self.stream.as_mut().ok_or_else(|| anyhow!("decoder is not open"))
    }
}

impl Decoder for SymphoniaDecoder {
    fn open(&mut self, path: &Path) -> Result<()> {
        self.close();
        let file = File::open(path).with_context(|| format!("open {:?}", path))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .with_context(|| format!("probe {:?}", path))?;
        let format = probed.format;
        let track = format
            .default_track()
            .ok_or_else(|| anyhow!("no default audio track in {:?}", path))?;
        let track_id = track.id;
        let params = track.codec_params.clone();
        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .with_context(|| format!("no codec for {:?}", path))?;

        let mut stream = OpenStream {
            format,
            decoder,
            track_id,
            time_base: params.time_base,
            rate: params.sample_rate.unwrap_or(0),
            channels: params.channels.map(|c| c.count() as u16).unwrap_or(0),
            pending: Vec::new(),
            pending_off: 0,
            packet_time: Duration::ZERO,
            seek_target: None,
            eof: false,
        };
        // Prime one packet so rate and channel count are known even when the container
        // does not declare them.
        stream.decode_next()?;
        if stream.rate == 0 || stream.channels == 0 {
            return Err(anyhow!("unknown sample format in {:?}", path));
        }
        tracing::debug!(
            path = %path.display(),
            rate = stream.rate,
            channels = stream.channels,
            "symphonia stream opened"
        );
        self.stream = Some(stream);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let stream = self.stream()?;
        let mut written = 0;
        while written < buf.len() {
            if stream.pending_off < stream.pending.len() {
                let n = (buf.len() - written).min(stream.pending.len() - stream.pending_off);
                buf[written..written + n]
                    .copy_from_slice(&stream.pending[stream.pending_off..stream.pending_off + n]);
                stream.pending_off += n;
                written += n;
                continue;
            }
            if stream.eof || !stream.decode_next()? {
                break;
            }
        }
        Ok(written)
    }

    fn seek(&mut self, pos: Duration, exact: bool) -> Result<()> {
        let stream = self.stream()?;
        let mode = if exact {
            SeekMode::Accurate
        } else {
            SeekMode::Coarse
        };
        let time = Time::new(pos.as_secs(), pos.subsec_nanos() as f64 / 1e9);
        let seeked = stream
            .format
            .seek(
                mode,
                SeekTo::Time {
                    time,
                    track_id: Some(stream.track_id),
                },
            )
            .with_context(|| format!("seek to {:?}", pos))?;
        stream.decoder.reset();
        stream.pending.clear();
        stream.pending_off = 0;
        stream.eof = false;
        stream.packet_time = stream.ts_to_time(seeked.actual_ts);
        stream.seek_target = exact.then_some(pos);
        Ok(())
    }

    fn time(&self) -> Duration {
        let Some(stream) = self.stream.as_ref() else {
            return Duration::ZERO;
        };
        let frame_bytes = BYTES_PER_SAMPLE * stream.channels.max(1) as usize;
        let frames = (stream.pending_off / frame_bytes) as u64;
        stream.packet_time + frames_to_duration(frames, stream.rate)
    }

    fn sample_rate(&self) -> u32 {
        self.stream.as_ref().map(|s| s.rate).unwrap_or(0)
    }

    fn channels(&self) -> u16 {
        self.stream.as_ref().map(|s| s.channels).unwrap_or(0)
    }

    fn close(&mut self) {
        self.stream = None;
    }
}

impl OpenStream {
    /// Decode the next packet of our track into `pending`. `Ok(false)` at end of stream.
    fn decode_next(&mut self) -> Result<bool> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    self.eof = true;
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(e).context("read packet"),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(msg)) => {
                    tracing::debug!("skipping undecodable packet: {msg}");
                    continue;
                }
                Err(e) => return Err(e).context("decode packet"),
            };
            let spec = *decoded.spec();
            let frames = decoded.frames();
            if frames == 0 {
                continue;
            }
            self.rate = spec.rate;
            self.channels = spec.channels.count() as u16;

            let mut samples = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
            samples.copy_interleaved_ref(decoded);

            let start = self.ts_to_time(packet.ts());
            let skip = self.frames_to_skip(start, frames);
            if skip >= frames {
                continue;
            }
            self.seek_target = None;

            let channels = self.channels as usize;
            self.pending.clear();
            for sample in &samples.samples()[skip * channels..frames * channels] {
                self.pending.extend_from_slice(&sample.to_le_bytes());
            }
            self.pending_off = 0;
            self.packet_time = start + frames_to_duration(skip as u64, self.rate);
            return Ok(true);
        }
    }

    fn frames_to_skip(&self, start: Duration, frames: usize) -> usize {
        match self.seek_target {
            Some(target) if target > start => {
                let gap = (target - start).as_secs_f64() * self.rate as f64;
                (gap.round() as usize).min(frames)
            }
            _ => 0,
        }
    }

    fn ts_to_time(&self, ts: u64) -> Duration {
        match self.time_base {
            Some(tb) if tb.denom != 0 => {
                let nanos = ts as u128 * tb.numer as u128 * 1_000_000_000 / tb.denom as u128;
                Duration::from_nanos(nanos as u64)
            }
            Some(_) => Duration::ZERO,
            None => frames_to_duration(ts, self.rate),
        }
    }
}

fn frames_to_duration(frames: u64, rate: u32) -> Duration {
    if rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(frames.saturating_mul(1_000_000_000) / rate as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Write a mono 16-bit WAV of `frames` samples counting upward.
    fn write_wav(path: &Path, rate: u32, frames: u32) {
        let data_len = frames * 2;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&rate.to_le_bytes());
        bytes.extend_from_slice(&(rate * 2).to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for i in 0..frames {
            bytes.extend_from_slice(&((i % 30_000) as i16).to_le_bytes());
        }
        let mut file = File::create(path).unwrap();
        file.write_all(&bytes).unwrap();
    }

    fn read_to_end(decoder: &mut SymphoniaDecoder) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 1000];
        loop {
            let n = decoder.read(&mut buf).unwrap();
            if n == 0 {
                return out;
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    #[test]
    fn frames_to_duration_handles_zero_rate() {
        assert_eq!(frames_to_duration(100, 0), Duration::ZERO);
        assert_eq!(frames_to_duration(48_000, 48_000), Duration::from_secs(1));
    }

    #[test]
    fn decodes_wav_to_s16le() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 8_000, 8_000);

        let mut decoder = SymphoniaDecoder::new();
        decoder.open(&path).unwrap();
        assert_eq!(decoder.sample_rate(), 8_000);
        assert_eq!(decoder.channels(), 1);
        assert_eq!(decoder.time(), Duration::ZERO);

        let pcm = read_to_end(&mut decoder);
        assert_eq!(pcm.len(), 16_000);
        assert_eq!(&pcm[..6], &[0, 0, 1, 0, 2, 0]);
        assert_eq!(decoder.time(), Duration::from_secs(1));
        decoder.close();
        assert!(decoder.read(&mut [0u8; 4]).is_err());
    }

    #[test]
    fn exact_seek_drops_frames_before_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 8_000, 8_000);

        let mut decoder = SymphoniaDecoder::new();
        decoder.open(&path).unwrap();
        decoder.seek(Duration::from_millis(500), true).unwrap();
        let rest = read_to_end(&mut decoder);
        assert!(
            (7_990..=8_010).contains(&rest.len()),
            "unexpected remainder {}",
            rest.len()
        );
    }

    #[test]
    fn open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut decoder = SymphoniaDecoder::new();
        assert!(decoder.open(&dir.path().join("absent.flac")).is_err());
    }

    #[test]
    fn open_garbage_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.mp3");
        std::fs::write(&path, b"definitely not audio").unwrap();
        let mut decoder = SymphoniaDecoder::new();
        assert!(decoder.open(&path).is_err());
        assert_eq!(decoder.sample_rate(), 0);
    }
}
