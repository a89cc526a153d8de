//! Playback engine.
//!
//! One thread owns the decoder, the output and all playback state. It blocks on two
//! channels only: the command channel and the availability signal of the current
//! [`Monitor`]. After every event it runs one decode/write tick if playing.
//!
//! Track changes go through [`Engine::transition`], which keeps the decoder open across
//! segments of the same file and skips the seek and buffer reset when the next segment
//! continues where the previous one ended. That is what keeps cue-sheet albums gapless.

use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{Result, anyhow};
use crossbeam_channel::{Receiver, Sender};
use tonearm_types::{PlaybackState, Track, TrackList};

use crate::config::{EngineConfig, OutputConfig};
use crate::decoder::{Decoder, DecoderRegistry};
use crate::error::{PlayerError, TrackError};
use crate::monitor::Monitor;
use crate::output::{Output, OutputConstructor};
use crate::status::{EngineSnapshot, EngineStatus};

/// Zero-byte writes tolerated in a row before the output counts as stalled.
const MAX_STALLED_WRITES: usize = 50;

/// Requests accepted by the engine loop.
#[derive(Debug, Clone)]
pub enum Command {
    /// Adopt `list` and start the track at `pos` (wrapped into range).
    Play { list: TrackList, pos: i64 },
    /// Replace the active list, keeping the current track if it is still present.
    SetList(TrackList),
    /// Toggle between playing and paused.
    Pause,
    Next,
    Prev,
    Stop,
    /// Stop and terminate the loop.
    Close,
}

/// Handle to a running engine thread.
pub struct EngineHandle {
    cmd_tx: Sender<Command>,
    status: Arc<EngineStatus>,
    join: Option<JoinHandle<()>>,
}

/// Spawn the engine thread.
///
/// The output is built on the engine thread itself, so backends whose streams must stay
/// on one thread are fine.
pub fn spawn_engine(
    decoders: DecoderRegistry,
    output: OutputConstructor,
    output_config: OutputConfig,
    config: EngineConfig,
) -> EngineHandle {
    let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
    let status = Arc::new(EngineStatus::default());
    let status_for_thread = status.clone();
    let join = std::thread::spawn(move || {
        let output = output(&output_config);
        Engine::new(decoders, output, config, status_for_thread).run(cmd_rx);
    });
    EngineHandle {
        cmd_tx,
        status,
        join: Some(join),
    }
}

impl EngineHandle {
    pub fn send(&self, cmd: Command) -> Result<(), PlayerError> {
        self.cmd_tx.send(cmd).map_err(|_| PlayerError::Closed)
    }

    pub fn play(&self, list: TrackList, pos: i64) -> Result<(), PlayerError> {
        self.send(Command::Play { list, pos })
    }

    pub fn set_playlist(&self, list: TrackList) -> Result<(), PlayerError> {
        self.send(Command::SetList(list))
    }

    pub fn pause(&self) -> Result<(), PlayerError> {
        self.send(Command::Pause)
    }

    pub fn next(&self) -> Result<(), PlayerError> {
        self.send(Command::Next)
    }

    pub fn prev(&self) -> Result<(), PlayerError> {
        self.send(Command::Prev)
    }

    pub fn stop(&self) -> Result<(), PlayerError> {
        self.send(Command::Stop)
    }

    pub fn status(&self) -> EngineSnapshot {
        self.status.snapshot()
    }

    /// Close the engine and block until its thread has exited. Idempotent.
    pub fn close(&mut self) {
        let _ = self.cmd_tx.send(Command::Close);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                tracing::error!("engine thread panicked");
            }
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.close();
    }
}

enum Flow {
    Continue,
    Exit,
}

pub(crate) struct Engine {
    decoders: DecoderRegistry,
    output: Box<dyn Output>,
    config: EngineConfig,
    status: Arc<EngineStatus>,
    state: PlaybackState,
    list: Option<TrackList>,
    pos: Option<usize>,
    /// Track the decoder is positioned in.
    current: Option<Track>,
    decoder: Option<Box<dyn Decoder>>,
    monitor: Option<Monitor>,
    /// Signal slot of the running monitor; `never()` otherwise.
    avail_rx: Receiver<()>,
    monitor_runs: u64,
    buf: Vec<u8>,
    /// Consecutive track failures since the last successful write.
    failures: usize,
}

impl Engine {
    pub(crate) fn new(
        decoders: DecoderRegistry,
        output: Box<dyn Output>,
        config: EngineConfig,
        status: Arc<EngineStatus>,
    ) -> Self {
        Self {
            decoders,
            output,
            config,
            status,
            state: PlaybackState::Stopped,
            list: None,
            pos: None,
            current: None,
            decoder: None,
            monitor: None,
            avail_rx: crossbeam_channel::never(),
            monitor_runs: 0,
            buf: Vec::new(),
            failures: 0,
        }
    }

    pub(crate) fn run(mut self, cmd_rx: Receiver<Command>) {
        tracing::debug!("engine loop started");
        loop {
            let avail_rx = self.avail_rx.clone();
            crossbeam_channel::select! {
                recv(cmd_rx) -> msg => {
                    let Ok(cmd) = msg else {
                        tracing::info!("command channel closed; stopping engine");
                        self.stop();
                        break;
                    };
                    if let Flow::Exit = self.handle(cmd) {
                        break;
                    }
                }
                recv(avail_rx) -> signal => {
                    if signal.is_err() {
                        tracing::warn!("availability monitor went away");
                        self.stop_monitor();
                    }
                }
            }
            if self.state == PlaybackState::Playing {
                self.tick();
            }
        }
        tracing::info!("engine loop terminated");
    }

    fn handle(&mut self, cmd: Command) -> Flow {
        tracing::debug!(?cmd, state = %self.state, "engine command");
        match cmd {
            Command::Play { list, pos } => {
                self.set_list(list);
                self.play(pos, false);
            }
            Command::SetList(list) => {
                self.set_list(list);
                if self.state != PlaybackState::Stopped && self.pos.is_none() {
                    tracing::info!("current track left the playlist; stopping");
                    self.stop();
                }
            }
            Command::Pause => self.toggle_pause(),
            Command::Next => self.step(1),
            Command::Prev => self.step(-1),
            Command::Stop => self.stop(),
            Command::Close => {
                self.stop();
                return Flow::Exit;
            }
        }
        Flow::Continue
    }

    /// Adopt `list`, relocating the position to the current track by identity.
    fn set_list(&mut self, list: TrackList) {
        if self.state != PlaybackState::Stopped {
            self.pos = self
                .current
                .as_ref()
                .and_then(|cur| list.position_of(cur.id()));
        }
        self.list = Some(list);
        self.publish();
    }

    fn step(&mut self, delta: i64) {
        match (self.state, self.pos) {
            (PlaybackState::Stopped, _) | (_, None) => {
                tracing::debug!(delta, "next/prev ignored while stopped");
            }
            (_, Some(pos)) => self.play(pos as i64 + delta, false),
        }
    }

    fn toggle_pause(&mut self) {
        match self.state {
            PlaybackState::Playing => {
                self.stop_monitor();
                self.output.pause();
                self.state = PlaybackState::Paused;
                tracing::info!(pos = ?self.pos, "paused");
            }
            PlaybackState::Paused => {
                self.output.pause();
                self.state = PlaybackState::Playing;
                self.start_monitor();
                tracing::info!(pos = ?self.pos, "resumed");
            }
            PlaybackState::Stopped => tracing::debug!("pause ignored while stopped"),
        }
        self.publish();
    }

    /// Start the track at `pos`, falling through to the following tracks on failure.
    ///
    /// `smooth` marks a natural advance at end of track; explicit jumps reset the output
    /// buffer so stale audio from the previous track is not heard.
    fn play(&mut self, pos: i64, smooth: bool) {
        let Some(list) = self.list.clone() else {
            tracing::debug!("no playlist to play from");
            self.stop();
            return;
        };
        let Some(mut index) = list.wrap_index(pos) else {
            tracing::info!("playlist is empty; stopping");
            self.stop();
            return;
        };
        if !smooth {
            self.failures = 0;
        }

        loop {
            let Some(track) = list.get(index).cloned() else {
                self.stop();
                return;
            };
            match self.transition(track, index, smooth) {
                Ok(()) => return,
                Err(e) if e.is_fatal() => {
                    tracing::error!(pos = index, "{e}; stopping");
                    self.stop();
                    return;
                }
                Err(e) => {
                    if self.track_failed(index, &e) {
                        return;
                    }
                    index = (index + 1) % list.len();
                }
            }
        }
    }

    /// Count a failed track. Returns `true` when the engine gave up and stopped.
    fn track_failed(&mut self, index: usize, err: &dyn std::fmt::Display) -> bool {
        self.failures += 1;
        tracing::warn!(pos = index, failures = self.failures, "skipping track: {err}");
        if self.failures >= self.failure_limit() {
            tracing::error!(
                failures = self.failures,
                "too many consecutive track failures; stopping"
            );
            self.stop();
            return true;
        }
        false
    }

    fn failure_limit(&self) -> usize {
        let len = self.list.as_ref().map(TrackList::len).unwrap_or(1).max(1);
        self.config.max_track_failures.max(1).min(len)
    }

    fn transition(&mut self, track: Track, index: usize, smooth: bool) -> Result<(), TrackError> {
        self.stop_monitor();

        let (same_file, upcoming) = match (&self.current, &self.decoder) {
            (Some(cur), Some(_)) => (cur.same_file(&track), cur.is_followed_by(&track)),
            _ => (false, false),
        };

        let mut decoder = match self.decoder.take() {
            Some(decoder) if same_file => decoder,
            previous => {
                if let Some(mut d) = previous {
                    d.close();
                }
                self.current = None;
                self.open_decoder(&track)?
            }
        };

        if track.is_part() && (!same_file || !upcoming) {
            tracing::debug!(start_ms = track.start().as_millis() as u64, "seeking to segment start");
            if let Err(reason) = decoder.seek(track.start(), false) {
                decoder.close();
                return Err(TrackError::Seek {
                    file: track.file().to_path_buf(),
                    reason,
                });
            }
        }

        // Keep the decoder even if the output fails so stop() closes it.
        let rate = decoder.sample_rate();
        let channels = decoder.channels();
        self.decoder = Some(decoder);
        self.current = Some(track.clone());

        if !self.output.is_open() {
            self.output.open().map_err(TrackError::Output)?;
        }
        if !smooth {
            self.output.reset();
        }
        if self.output.sample_rate() != rate || self.output.channels() != channels {
            tracing::debug!(rate, channels, "reconfiguring output");
            self.output.set_sample_rate(rate).map_err(TrackError::Output)?;
            self.output.set_channels(channels).map_err(TrackError::Output)?;
        }
        if self.output.paused() {
            self.output.pause();
        }

        self.pos = Some(index);
        self.state = PlaybackState::Playing;
        self.start_monitor();
        self.publish();
        tracing::info!(
            pos = index,
            file = %track.file().display(),
            part = track.is_part(),
            smooth,
            same_file,
            "track started"
        );
        Ok(())
    }

    fn open_decoder(&self, track: &Track) -> Result<Box<dyn Decoder>, TrackError> {
        let ext = track.extension().unwrap_or_default();
        let mut decoder =
            self.decoders
                .create(&ext)
                .ok_or_else(|| TrackError::UnsupportedExtension {
                    ext: ext.clone(),
                    file: track.file().to_path_buf(),
                })?;
        decoder.open(track.file()).map_err(|reason| TrackError::Open {
            file: track.file().to_path_buf(),
            reason,
        })?;
        tracing::debug!(file = %track.file().display(), "decoder opened");
        Ok(decoder)
    }

    /// Pull one buffer's worth of PCM from the decoder into the output.
    fn tick(&mut self) {
        let free = match self.output.avail_update() {
            Ok(n) => n,
            Err(e) => {
                tracing::error!("output unavailable: {e:#}; stopping");
                self.stop();
                return;
            }
        };
        if free == 0 {
            return;
        }
        if self.buf.len() < free {
            self.buf = vec![0; free];
        }
        let Some(pos) = self.pos else {
            self.stop();
            return;
        };
        let Some(decoder) = self.decoder.as_mut() else {
            tracing::warn!("playing without a decoder; stopping");
            self.stop();
            return;
        };

        let segment_end = self
            .current
            .as_ref()
            .filter(|t| t.is_part())
            .and_then(Track::end);
        let read = match segment_end {
            Some(end) if decoder.time() >= end => 0,
            _ => match decoder.read(&mut self.buf[..free]) {
                Ok(n) => n,
                Err(e) => {
                    if !self.track_failed(pos, &format!("decode error: {e:#}")) {
                        self.play(pos as i64 + 1, true);
                    }
                    return;
                }
            },
        };

        if read == 0 {
            tracing::debug!(pos, "end of track");
            self.play(pos as i64 + 1, true);
            return;
        }

        match write_all(self.output.as_mut(), &self.buf[..read], &self.config) {
            Ok(()) => self.failures = 0,
            Err(e) => {
                tracing::error!("output write failed: {e:#}; stopping");
                self.stop();
            }
        }
    }

    /// Release decoder and output and forget the playlist.
    fn stop(&mut self) {
        let was = self.state;
        self.stop_monitor();
        if self.output.is_open() {
            self.output.close();
        }
        if let Some(mut decoder) = self.decoder.take() {
            decoder.close();
        }
        self.current = None;
        self.list = None;
        self.pos = None;
        self.state = PlaybackState::Stopped;
        self.publish();
        if was != PlaybackState::Stopped {
            tracing::info!("stopped");
        }
    }

    fn start_monitor(&mut self) {
        if self.monitor.is_some() {
            return;
        }
        let (monitor, rx) = Monitor::spawn(
            self.output.waiter(),
            self.config.monitor_timeout,
            self.config.monitor_retry_delay,
        );
        self.monitor = Some(monitor);
        self.avail_rx = rx;
        self.monitor_runs += 1;
        tracing::trace!(run = self.monitor_runs, "monitor started");
    }

    fn stop_monitor(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.stop();
            tracing::trace!(run = self.monitor_runs, "monitor stopped");
        }
        self.avail_rx = crossbeam_channel::never();
    }

    fn publish(&self) {
        let track_id = self.current.as_ref().map(|t| t.id().get());
        self.status.publish(self.state, self.pos, track_id);
    }
}

/// Write all of `buf`, retrying short writes.
fn write_all(output: &mut dyn Output, mut buf: &[u8], config: &EngineConfig) -> Result<()> {
    let mut stalled = 0;
    while !buf.is_empty() {
        let n = output.write(buf)?;
        if n == 0 {
            stalled += 1;
            if stalled > MAX_STALLED_WRITES {
                return Err(anyhow!("output accepted no data after {stalled} attempts"));
            }
            output.waiter().wait(config.monitor_timeout)?;
            continue;
        }
        stalled = 0;
        buf = &buf[n..];
    }
    Ok(())
}
