//! Recording fakes for the decoder and output capabilities.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::decoder::{Decoder, DecoderRegistry};
use crate::output::{Output, OutputWaiter};

/// Side effects observed on the fakes, in call order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Event {
    DecoderOpen(PathBuf),
    DecoderSeek(Duration),
    DecoderClose(PathBuf),
    OutputOpen,
    OutputReset,
    OutputPause,
    OutputSetRate(u32),
    OutputSetChannels(u16),
    OutputClose,
}

#[derive(Clone, Copy, Debug)]
struct FileSpec {
    rate: u32,
    channels: u16,
    length: Duration,
}

impl Default for FileSpec {
    fn default() -> Self {
        Self {
            rate: 1_000,
            channels: 1,
            length: Duration::from_secs(600),
        }
    }
}

#[derive(Default)]
struct RecorderInner {
    events: Mutex<Vec<Event>>,
    files: Mutex<HashMap<PathBuf, FileSpec>>,
    broken: Mutex<HashSet<PathBuf>>,
    unreadable: Mutex<HashSet<PathBuf>>,
    written: AtomicUsize,
    fail_writes: AtomicBool,
    fail_avail: AtomicBool,
}

/// Shared log + knobs for the fakes.
#[derive(Clone, Default)]
pub(crate) struct Recorder {
    inner: Arc<RecorderInner>,
}

impl Recorder {
    fn push(&self, event: Event) {
        self.inner.events.lock().unwrap().push(event);
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.inner.events.lock().unwrap().clone()
    }

    /// Drain the log.
    pub(crate) fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.inner.events.lock().unwrap())
    }

    pub(crate) fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.inner.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }

    /// Give `path` a format and length; unknown files get 1 kHz mono, 10 minutes.
    pub(crate) fn set_file(&self, path: &str, rate: u32, channels: u16, length: Duration) {
        self.inner.files.lock().unwrap().insert(
            PathBuf::from(path),
            FileSpec {
                rate,
                channels,
                length,
            },
        );
    }

    /// Make `open` fail for `path`.
    pub(crate) fn break_file(&self, path: &str) {
        self.inner.broken.lock().unwrap().insert(PathBuf::from(path));
    }

    /// Make `read` fail for `path`.
    pub(crate) fn corrupt_file(&self, path: &str) {
        self.inner.unreadable.lock().unwrap().insert(PathBuf::from(path));
    }

    pub(crate) fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::Relaxed);
    }

    pub(crate) fn fail_avail(&self, fail: bool) {
        self.inner.fail_avail.store(fail, Ordering::Relaxed);
    }

    pub(crate) fn written(&self) -> usize {
        self.inner.written.load(Ordering::Relaxed)
    }

    fn spec(&self, path: &Path) -> FileSpec {
        self.inner
            .files
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .unwrap_or_default()
    }

    /// Registry answering `mp3` and `flac` with [`FakeDecoder`]s.
    pub(crate) fn registry(&self) -> DecoderRegistry {
        let mut registry = DecoderRegistry::new();
        for ext in ["mp3", "flac"] {
            let rec = self.clone();
            registry.register(ext, move || Box::new(FakeDecoder::new(rec.clone())));
        }
        registry
    }
}

/// Produces silence for the configured length of each file.
pub(crate) struct FakeDecoder {
    rec: Recorder,
    path: Option<PathBuf>,
    spec: FileSpec,
    pos_bytes: u64,
}

impl FakeDecoder {
    pub(crate) fn new(rec: Recorder) -> Self {
        Self {
            rec,
            path: None,
            spec: FileSpec::default(),
            pos_bytes: 0,
        }
    }

    fn bytes_per_sec(&self) -> u64 {
        self.spec.rate as u64 * self.spec.channels as u64 * 2
    }

    fn len_bytes(&self) -> u64 {
        self.spec.length.as_millis() as u64 * self.bytes_per_sec() / 1000
    }
}

impl Decoder for FakeDecoder {
    fn open(&mut self, path: &Path) -> Result<()> {
        self.rec.push(Event::DecoderOpen(path.to_path_buf()));
        if self.rec.inner.broken.lock().unwrap().contains(path) {
            return Err(anyhow!("cannot open {}", path.display()));
        }
        self.spec = self.rec.spec(path);
        self.path = Some(path.to_path_buf());
        self.pos_bytes = 0;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let path = self.path.clone().ok_or_else(|| anyhow!("decoder not open"))?;
        if self.rec.inner.unreadable.lock().unwrap().contains(&path) {
            return Err(anyhow!("corrupt frame in {}", path.display()));
        }
        let remaining = self.len_bytes().saturating_sub(self.pos_bytes);
        let n = (buf.len() as u64).min(remaining) as usize;
        buf[..n].fill(0);
        self.pos_bytes += n as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: Duration, _exact: bool) -> Result<()> {
        self.rec.push(Event::DecoderSeek(pos));
        self.pos_bytes = pos.as_millis() as u64 * self.bytes_per_sec() / 1000;
        Ok(())
    }

    fn time(&self) -> Duration {
        Duration::from_millis(self.pos_bytes * 1000 / self.bytes_per_sec().max(1))
    }

    fn sample_rate(&self) -> u32 {
        self.spec.rate
    }

    fn channels(&self) -> u16 {
        self.spec.channels
    }

    fn close(&mut self) {
        if let Some(path) = self.path.take() {
            self.rec.push(Event::DecoderClose(path));
        }
    }
}

/// Always has `chunk` bytes free; counts written bytes.
pub(crate) struct FakeOutput {
    rec: Recorder,
    open: bool,
    paused: bool,
    rate: u32,
    channels: u16,
    chunk: usize,
}

impl FakeOutput {
    pub(crate) fn new(rec: Recorder) -> Self {
        Self {
            rec,
            open: false,
            paused: false,
            rate: 0,
            channels: 0,
            chunk: 500,
        }
    }
}

impl Output for FakeOutput {
    fn open(&mut self) -> Result<()> {
        self.rec.push(Event::OutputOpen);
        self.open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn sample_rate(&self) -> u32 {
        self.rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn set_sample_rate(&mut self, rate: u32) -> Result<()> {
        self.rec.push(Event::OutputSetRate(rate));
        self.rate = rate;
        Ok(())
    }

    fn set_channels(&mut self, channels: u16) -> Result<()> {
        self.rec.push(Event::OutputSetChannels(channels));
        self.channels = channels;
        Ok(())
    }

    fn avail_update(&mut self) -> Result<usize> {
        if self.rec.inner.fail_avail.load(Ordering::Relaxed) {
            return Err(anyhow!("no stream config at {} Hz", self.rate));
        }
        Ok(self.chunk)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if self.rec.inner.fail_writes.load(Ordering::Relaxed) {
            return Err(anyhow!("device unplugged"));
        }
        self.rec.inner.written.fetch_add(buf.len(), Ordering::Relaxed);
        Ok(buf.len())
    }

    fn waiter(&self) -> Arc<dyn OutputWaiter> {
        Arc::new(FakeWaiter)
    }

    fn pause(&mut self) {
        self.rec.push(Event::OutputPause);
        self.paused = !self.paused;
    }

    fn paused(&self) -> bool {
        self.paused
    }

    fn reset(&mut self) {
        self.rec.push(Event::OutputReset);
    }

    fn close(&mut self) {
        self.rec.push(Event::OutputClose);
        self.open = false;
        self.paused = false;
    }
}

struct FakeWaiter;

impl OutputWaiter for FakeWaiter {
    fn wait(&self, _timeout: Duration) -> Result<bool> {
        std::thread::sleep(Duration::from_millis(1));
        Ok(true)
    }
}
