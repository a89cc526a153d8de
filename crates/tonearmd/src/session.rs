//! Per-client command handling on top of the player facade.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tonearm_engine::{DecoderRegistry, Player};
use tonearm_types::{PlaybackState, Track};

use crate::cli::VERSION;
use crate::protocol::{Request, Response, quote};

/// Shared by all client sessions.
pub struct Session {
    player: Arc<Player>,
    media_dir: PathBuf,
    decoders: DecoderRegistry,
}

impl Session {
    /// `decoders` decides which files `add` accepts.
    pub fn new(player: Arc<Player>, media_dir: PathBuf, decoders: DecoderRegistry) -> Self {
        Self {
            player,
            media_dir,
            decoders,
        }
    }

    /// Payload of the response sent on connect.
    pub fn greeting(&self) -> Response {
        Response::ok_with(vec![format!("tonearmd {VERSION}")])
    }

    pub fn handle(&self, req: Request) -> Response {
        match req {
            Request::Ping => Response::ok(),
            Request::Playlists => match self.player.playlists() {
                Ok(lists) => Response::ok_with(
                    lists
                        .iter()
                        .map(|p| format!("Name: {}, Length: {}", quote(&p.name), p.len))
                        .collect(),
                ),
                Err(e) => Response::err(e),
            },
            Request::AddPlaylist(name) => self.player.add_playlist(&name).into(),
            Request::DeletePlaylist(name) => self.player.delete_playlist(&name).into(),
            Request::Add { playlist, paths } => self.add(&playlist, &paths),
            Request::Clear(name) => self.player.clear_playlist(&name).into(),
            Request::Tracks(name) => match self.player.playlist_tracks(&name) {
                Ok(list) => Response::ok_with(
                    list.iter()
                        .enumerate()
                        .map(|(i, t)| track_line(i, t, &self.media_dir))
                        .collect(),
                ),
                Err(e) => Response::err(e),
            },
            Request::Play { playlist, pos } => self.player.play(&playlist, pos).into(),
            Request::Pause => self.player.pause().into(),
            Request::Stop => self.player.stop().into(),
            Request::Next => self.player.next().into(),
            Request::Prev => self.player.prev().into(),
            Request::Status => match self.player.status() {
                Ok(status) => {
                    let mut lines = vec![format!("State: {}", status.state)];
                    if status.state != PlaybackState::Stopped {
                        if let Some(name) = &status.playlist {
                            lines.push(format!("Playlist: {}", quote(name)));
                        }
                        if let Some(pos) = status.position {
                            lines.push(format!("Position: {pos}"));
                        }
                        if let Some(track) = &status.track {
                            lines.push(format!("Track: {}", quote(track)));
                        }
                    }
                    Response::ok_with(lines)
                }
                Err(e) => Response::err(e),
            },
            Request::Quit => Response::ok_with(vec!["Bye.".to_string()]),
        }
    }

    fn add(&self, playlist: &str, paths: &[String]) -> Response {
        let mut tracks = Vec::new();
        for raw in paths {
            let path = self.resolve(raw);
            match self.collect(&path, &mut tracks) {
                Ok(0) => return Response::err(format!("no playable files in {raw}")),
                Ok(_) => {}
                Err(msg) => return Response::err(msg),
            }
        }
        match self.player.add_tracks(playlist, tracks) {
            Ok(len) => {
                tracing::debug!(playlist, len, "tracks added");
                Response::ok_with(vec![format!("Length: {len}")])
            }
            Err(e) => Response::err(e),
        }
    }

    fn resolve(&self, raw: &str) -> PathBuf {
        let p = Path::new(raw);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.media_dir.join(p)
        }
    }

    /// Append playable files under `path` (a file, or a directory walked in name order).
    fn collect(&self, path: &Path, out: &mut Vec<Track>) -> Result<usize, String> {
        let meta = std::fs::metadata(path).map_err(|e| format!("{}: {e}", path.display()))?;
        if meta.is_file() {
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default();
            if !self.decoders.supports(ext) {
                return Err(format!("unsupported file type: {}", path.display()));
            }
            out.push(Track::new(path));
            return Ok(1);
        }

        let mut entries: Vec<PathBuf> = std::fs::read_dir(path)
            .map_err(|e| format!("{}: {e}", path.display()))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .collect();
        entries.sort();
        let mut added = 0;
        for entry in entries {
            if entry.is_dir() {
                added += self.collect(&entry, out)?;
            } else if entry
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| self.decoders.supports(e))
            {
                out.push(Track::new(entry));
                added += 1;
            }
        }
        Ok(added)
    }
}

fn track_line(index: usize, track: &Track, media_dir: &Path) -> String {
    let shown = track.file().strip_prefix(media_dir).unwrap_or(track.file());
    let mut line = format!(
        "Index: {index}, Title: {}, File: {}",
        quote(&track.display_name()),
        quote(&shown.to_string_lossy())
    );
    if track.is_part() {
        let _ = write!(line, ", Start: {}", track.start().as_millis());
        if let Some(end) = track.end() {
            let _ = write!(line, ", End: {}", end.as_millis());
        }
    }
    line
}
