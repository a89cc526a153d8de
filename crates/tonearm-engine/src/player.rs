//! Synchronous player API.
//!
//! Every call is a request with a one-shot reply slot handled by a single facade
//! thread, so registry edits and transport commands are totally ordered. The facade owns
//! the playlist registry and the engine handle; playback status is read from the
//! engine's published atomics and never waits on the engine loop.

use std::sync::Mutex;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use tonearm_types::{PlaybackState, PlayerStatus, PlaylistInfo, Track, TrackList};

use crate::config::{EngineConfig, OutputConfig};
use crate::decoder::DecoderRegistry;
use crate::engine::{EngineHandle, spawn_engine};
use crate::error::PlayerError;
use crate::output::OutputConstructor;
use crate::registry::PlaylistRegistry;

type Reply<T> = Sender<Result<T, PlayerError>>;

enum Request {
    Playlists(Reply<Vec<PlaylistInfo>>),
    AddPlaylist(String, Reply<()>),
    DeletePlaylist(String, Reply<()>),
    AddTracks(String, Vec<Track>, Reply<usize>),
    ClearPlaylist(String, Reply<()>),
    PlaylistTracks(String, Reply<TrackList>),
    Play(String, i64, Reply<()>),
    Pause(Reply<()>),
    Next(Reply<()>),
    Prev(Reply<()>),
    Stop(Reply<()>),
    Status(Reply<PlayerStatus>),
    Close(Reply<()>),
}

/// Handle to the player. Cheap to share behind an `Arc`; all methods take `&self`.
pub struct Player {
    req_tx: Sender<Request>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl Player {
    /// Start the engine and the facade thread.
    pub fn spawn(
        decoders: DecoderRegistry,
        output: OutputConstructor,
        output_config: OutputConfig,
        config: EngineConfig,
    ) -> Self {
        let engine = spawn_engine(decoders, output, output_config, config);
        let (req_tx, req_rx) = crossbeam_channel::unbounded();
        let join = std::thread::spawn(move || Facade::new(engine).run(req_rx));
        Self {
            req_tx,
            join: Mutex::new(Some(join)),
        }
    }

    fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Request) -> Result<T, PlayerError> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.req_tx.send(make(tx)).map_err(|_| PlayerError::Closed)?;
        rx.recv().map_err(|_| PlayerError::Closed)?
    }

    pub fn playlists(&self) -> Result<Vec<PlaylistInfo>, PlayerError> {
        self.call(Request::Playlists)
    }

    pub fn add_playlist(&self, name: &str) -> Result<(), PlayerError> {
        self.call(|r| Request::AddPlaylist(name.to_string(), r))
    }

    pub fn delete_playlist(&self, name: &str) -> Result<(), PlayerError> {
        self.call(|r| Request::DeletePlaylist(name.to_string(), r))
    }

    /// Append `tracks` to `name`; returns the new playlist length.
    pub fn add_tracks(&self, name: &str, tracks: Vec<Track>) -> Result<usize, PlayerError> {
        self.call(|r| Request::AddTracks(name.to_string(), tracks, r))
    }

    pub fn clear_playlist(&self, name: &str) -> Result<(), PlayerError> {
        self.call(|r| Request::ClearPlaylist(name.to_string(), r))
    }

    pub fn playlist_tracks(&self, name: &str) -> Result<TrackList, PlayerError> {
        self.call(|r| Request::PlaylistTracks(name.to_string(), r))
    }

    /// Start `name` at `pos`; out-of-range positions wrap.
    pub fn play(&self, name: &str, pos: i64) -> Result<(), PlayerError> {
        self.call(|r| Request::Play(name.to_string(), pos, r))
    }

    pub fn pause(&self) -> Result<(), PlayerError> {
        self.call(Request::Pause)
    }

    pub fn next(&self) -> Result<(), PlayerError> {
        self.call(Request::Next)
    }

    pub fn prev(&self) -> Result<(), PlayerError> {
        self.call(Request::Prev)
    }

    pub fn stop(&self) -> Result<(), PlayerError> {
        self.call(Request::Stop)
    }

    pub fn status(&self) -> Result<PlayerStatus, PlayerError> {
        self.call(Request::Status)
    }

    /// Shut down engine and facade, blocking until both threads are gone.
    ///
    /// Later calls on this player return [`PlayerError::Closed`].
    pub fn close(&self) {
        let _ = self.call(Request::Close);
        let join = match self.join.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(join) = join {
            if join.join().is_err() {
                tracing::error!("player facade thread panicked");
            }
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.close();
    }
}

/// Playlist the engine was last started from, with the snapshot it was given.
struct Active {
    name: String,
    list: TrackList,
}

struct Facade {
    registry: PlaylistRegistry,
    engine: EngineHandle,
    active: Option<Active>,
}

impl Facade {
    fn new(engine: EngineHandle) -> Self {
        Self {
            registry: PlaylistRegistry::new(),
            engine,
            active: None,
        }
    }

    fn run(mut self, req_rx: Receiver<Request>) {
        while let Ok(req) = req_rx.recv() {
            match req {
                Request::Playlists(reply) => {
                    let _ = reply.send(Ok(self.registry.list()));
                }
                Request::AddPlaylist(name, reply) => {
                    let res = self.registry.add(&name);
                    if res.is_ok() {
                        tracing::info!(playlist = %name, "playlist created");
                    }
                    let _ = reply.send(res);
                }
                Request::DeletePlaylist(name, reply) => {
                    let _ = reply.send(self.delete_playlist(&name));
                }
                Request::AddTracks(name, tracks, reply) => {
                    let res = self.registry.append(&name, tracks);
                    if res.is_ok() {
                        self.playlist_changed(&name);
                    }
                    let _ = reply.send(res);
                }
                Request::ClearPlaylist(name, reply) => {
                    let res = self.registry.clear(&name);
                    if res.is_ok() {
                        self.playlist_changed(&name);
                    }
                    let _ = reply.send(res);
                }
                Request::PlaylistTracks(name, reply) => {
                    let _ = reply.send(self.registry.snapshot(&name));
                }
                Request::Play(name, pos, reply) => {
                    let _ = reply.send(self.play(&name, pos));
                }
                Request::Pause(reply) => {
                    let _ = reply.send(self.engine.pause());
                }
                Request::Next(reply) => {
                    let _ = reply.send(self.engine.next());
                }
                Request::Prev(reply) => {
                    let _ = reply.send(self.engine.prev());
                }
                Request::Stop(reply) => {
                    self.active = None;
                    let _ = reply.send(self.engine.stop());
                }
                Request::Status(reply) => {
                    let _ = reply.send(Ok(self.status()));
                }
                Request::Close(reply) => {
                    self.engine.close();
                    let _ = reply.send(Ok(()));
                    break;
                }
            }
        }
        // Covers the handle being dropped without close().
        self.engine.close();
        tracing::debug!("player facade terminated");
    }

    fn play(&mut self, name: &str, pos: i64) -> Result<(), PlayerError> {
        let list = self.registry.snapshot(name)?;
        if list.is_empty() {
            return Err(PlayerError::EmptyPlaylist(name.to_string()));
        }
        self.engine.play(list.clone(), pos)?;
        self.active = Some(Active {
            name: name.to_string(),
            list,
        });
        Ok(())
    }

    fn delete_playlist(&mut self, name: &str) -> Result<(), PlayerError> {
        if self.registry.delete(name)? {
            tracing::info!(playlist = %name, "playlist deleted");
            if self.active.as_ref().is_some_and(|a| a.name == name) {
                self.active = None;
                self.engine.stop()?;
            }
        }
        Ok(())
    }

    /// Hand the edited list to the engine if it is the one being played.
    ///
    /// Published engine status may lag queued commands, so it is not consulted here;
    /// the engine accepts a new list in any state.
    fn playlist_changed(&mut self, name: &str) {
        let Some(active) = self.active.as_mut().filter(|a| a.name == name) else {
            return;
        };
        let Ok(list) = self.registry.snapshot(name) else {
            return;
        };
        active.list = list.clone();
        if self.engine.set_playlist(list).is_err() {
            tracing::warn!(playlist = %name, "engine gone; playlist update dropped");
        }
    }

    fn status(&self) -> PlayerStatus {
        let snap = self.engine.status();
        if snap.state == PlaybackState::Stopped {
            return PlayerStatus::default();
        }
        let active = self.active.as_ref();
        let track = snap.track_id.and_then(|id| {
            active?
                .list
                .iter()
                .find(|t| t.id().get() == id)
                .map(Track::display_name)
        });
        PlayerStatus {
            state: snap.state,
            position: snap.position,
            playlist: active.map(|a| a.name.clone()),
            track,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use tonearm_types::SYSTEM_PLAYLIST;

    use crate::output::Output;
    use crate::testing::{FakeOutput, Recorder};

    fn player(rec: &Recorder) -> Player {
        let out = rec.clone();
        Player::spawn(
            rec.registry(),
            Arc::new(move |_: &OutputConfig| Box::new(FakeOutput::new(out.clone())) as Box<dyn Output>),
            OutputConfig::default(),
            EngineConfig {
                monitor_timeout: Duration::from_millis(5),
                monitor_retry_delay: Duration::from_millis(1),
                max_track_failures: 5,
            },
        )
    }

    fn wait_for(player: &Player, what: impl Fn(&PlayerStatus) -> bool) -> PlayerStatus {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let status = player.status().unwrap();
            if what(&status) {
                return status;
            }
            assert!(Instant::now() < deadline, "timed out, last status {status:?}");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn play_validates_playlist() {
        let rec = Recorder::default();
        let p = player(&rec);
        assert_eq!(
            p.play("missing", 0),
            Err(PlayerError::PlaylistNotFound("missing".into()))
        );
        assert_eq!(
            p.play(SYSTEM_PLAYLIST, 0),
            Err(PlayerError::EmptyPlaylist(SYSTEM_PLAYLIST.into()))
        );
        p.close();
    }

    #[test]
    fn status_reports_playlist_and_track() {
        let rec = Recorder::default();
        let p = player(&rec);
        p.add_playlist("mix").unwrap();
        let len = p
            .add_tracks("mix", vec![Track::new("/m/one.mp3"), Track::new("/m/two.mp3")])
            .unwrap();
        assert_eq!(len, 2);

        p.play("mix", -1).unwrap();
        let status = wait_for(&p, |s| s.state == PlaybackState::Playing);
        assert_eq!(status.position, Some(1));
        assert_eq!(status.playlist.as_deref(), Some("mix"));
        assert_eq!(status.track.as_deref(), Some("two.mp3"));

        p.pause().unwrap();
        wait_for(&p, |s| s.state == PlaybackState::Paused);
        p.stop().unwrap();
        let status = wait_for(&p, |s| s.state == PlaybackState::Stopped);
        assert_eq!(status, PlayerStatus::default());
        p.close();
    }

    #[test]
    fn appending_to_playing_playlist_keeps_playing() {
        let rec = Recorder::default();
        let p = player(&rec);
        p.add_tracks(SYSTEM_PLAYLIST, vec![Track::new("/m/a.mp3")]).unwrap();
        p.play(SYSTEM_PLAYLIST, 0).unwrap();
        wait_for(&p, |s| s.state == PlaybackState::Playing);

        p.add_tracks(SYSTEM_PLAYLIST, vec![Track::new("/m/b.mp3")]).unwrap();
        p.next().unwrap();
        let status = wait_for(&p, |s| s.position == Some(1));
        assert_eq!(status.track.as_deref(), Some("b.mp3"));
        p.close();
    }

    #[test]
    fn edit_right_after_play_reaches_engine() {
        let rec = Recorder::default();
        let p = player(&rec);
        p.add_tracks(SYSTEM_PLAYLIST, vec![Track::new("/m/a.mp3")]).unwrap();
        p.play(SYSTEM_PLAYLIST, 0).unwrap();
        // No wait: the engine may not have handled the play yet.
        p.add_tracks(SYSTEM_PLAYLIST, vec![Track::new("/m/b.mp3")]).unwrap();

        let status = wait_for(&p, |s| s.state == PlaybackState::Playing);
        assert_eq!(status.playlist.as_deref(), Some(SYSTEM_PLAYLIST));
        p.next().unwrap();
        let status = wait_for(&p, |s| s.position == Some(1));
        assert_eq!(status.track.as_deref(), Some("b.mp3"));
        assert_eq!(status.playlist.as_deref(), Some(SYSTEM_PLAYLIST));
        p.close();
    }

    #[test]
    fn clearing_playing_playlist_stops_engine() {
        let rec = Recorder::default();
        let p = player(&rec);
        p.add_tracks(SYSTEM_PLAYLIST, vec![Track::new("/m/a.mp3")]).unwrap();
        p.play(SYSTEM_PLAYLIST, 0).unwrap();
        wait_for(&p, |s| s.state == PlaybackState::Playing);

        p.clear_playlist(SYSTEM_PLAYLIST).unwrap();
        wait_for(&p, |s| s.state == PlaybackState::Stopped);
        p.close();
    }

    #[test]
    fn deleting_playing_playlist_stops_engine() {
        let rec = Recorder::default();
        let p = player(&rec);
        p.add_playlist("gone").unwrap();
        p.add_tracks("gone", vec![Track::new("/m/a.mp3")]).unwrap();
        p.play("gone", 0).unwrap();
        wait_for(&p, |s| s.state == PlaybackState::Playing);

        p.delete_playlist("gone").unwrap();
        wait_for(&p, |s| s.state == PlaybackState::Stopped);
        assert_eq!(p.playlists().unwrap().len(), 1);
        p.close();
    }

    #[test]
    fn registry_errors_pass_through() {
        let rec = Recorder::default();
        let p = player(&rec);
        p.add_playlist("x").unwrap();
        assert_eq!(p.add_playlist("x"), Err(PlayerError::PlaylistExists("x".into())));
        assert_eq!(p.delete_playlist(SYSTEM_PLAYLIST), Err(PlayerError::SystemPlaylist));
        assert_eq!(p.delete_playlist("never-existed"), Ok(()));
        assert!(p.playlist_tracks("x").unwrap().is_empty());
        p.close();
    }

    #[test]
    fn calls_after_close_fail() {
        let rec = Recorder::default();
        let p = player(&rec);
        p.close();
        assert_eq!(p.status(), Err(PlayerError::Closed));
        assert_eq!(p.add_playlist("late"), Err(PlayerError::Closed));
        // Second close is harmless.
        p.close();
    }
}
