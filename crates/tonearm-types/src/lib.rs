//! Shared playback data model.
//!
//! Pure data: tracks, track lists and the small enums/snapshots exchanged between the
//! engine, the player facade and the daemon's protocol layer.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Name of the built-in playlist that always exists and cannot be deleted.
pub const SYSTEM_PLAYLIST: &str = "*vfs*";

/// Process-unique identity of a [`Track`] value.
///
/// Assigned once by the `Track` constructors; clones share it. Two tracks built from the
/// same file are still different tracks, which is what lets a list hold duplicates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(u64);

impl TrackId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value (never zero).
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Display metadata attached to a track.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrackTag {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub title: Option<String>,
    /// Track number within the album.
    pub number: Option<u32>,
    /// Track length, if known.
    pub length: Option<Duration>,
}

/// One playable unit: a whole file, or a segment of one.
#[derive(Clone, Debug)]
pub struct Track {
    id: TrackId,
    file: PathBuf,
    start: Duration,
    end: Option<Duration>,
    part: bool,
    tag: TrackTag,
}

impl Track {
    /// A track covering a whole physical file.
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            id: TrackId::next(),
            file: file.into(),
            start: Duration::ZERO,
            end: None,
            part: false,
            tag: TrackTag::default(),
        }
    }

    /// A segment of `file` starting at `start`.
    ///
    /// `end = None` means the segment runs to the end of the file (the last entry of a
    /// cue sheet).
    pub fn part(file: impl Into<PathBuf>, start: Duration, end: Option<Duration>) -> Self {
        Self {
            id: TrackId::next(),
            file: file.into(),
            start,
            end,
            part: true,
            tag: TrackTag::default(),
        }
    }

    pub fn with_tag(mut self, tag: TrackTag) -> Self {
        self.tag = tag;
        self
    }

    /// Record the end offset of a whole-file track (its length).
    pub fn with_end(mut self, end: Duration) -> Self {
        self.end = Some(end);
        self
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    /// Physical file backing this track.
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Lower-cased extension of the physical file, used for decoder lookup.
    pub fn extension(&self) -> Option<String> {
        self.file
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }

    pub fn start(&self) -> Duration {
        self.start
    }

    pub fn end(&self) -> Option<Duration> {
        self.end
    }

    /// `true` when this track is a segment of a larger file.
    pub fn is_part(&self) -> bool {
        self.part
    }

    pub fn tag(&self) -> &TrackTag {
        &self.tag
    }

    /// Both tracks are decoded from the same physical file.
    pub fn same_file(&self, other: &Track) -> bool {
        self.file == other.file
    }

    /// `next` starts exactly where this track ends.
    pub fn is_followed_by(&self, next: &Track) -> bool {
        self.end == Some(next.start)
    }

    /// Best-effort label for logs and protocol listings.
    pub fn display_name(&self) -> String {
        if let Some(title) = self.tag.title.as_deref() {
            return title.to_string();
        }
        self.file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file.display().to_string())
    }
}

/// Immutable ordered list of tracks.
///
/// Cloning is cheap (shared slice); a playlist edit produces a new list rather than
/// mutating one somebody else is iterating.
#[derive(Clone, Debug, Default)]
pub struct TrackList {
    tracks: Arc<[Track]>,
}

impl TrackList {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self {
            tracks: tracks.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Track> {
        self.tracks.iter()
    }

    /// Index of the first entry carrying `id`.
    pub fn position_of(&self, id: TrackId) -> Option<usize> {
        self.tracks.iter().position(|t| t.id == id)
    }

    /// Resolve `pos` to an index; `None` for an empty list.
    ///
    /// Any negative position resolves to the last entry and any position past the end
    /// to the first, which is what makes next/prev loop around the list.
    pub fn wrap_index(&self, pos: i64) -> Option<usize> {
        let len = self.tracks.len();
        if len == 0 {
            return None;
        }
        Some(match usize::try_from(pos) {
            Err(_) => len - 1,
            Ok(p) if p >= len => 0,
            Ok(p) => p,
        })
    }
}

impl From<Vec<Track>> for TrackList {
    fn from(tracks: Vec<Track>) -> Self {
        Self::new(tracks)
    }
}

impl FromIterator<Track> for TrackList {
    fn from_iter<I: IntoIterator<Item = Track>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a TrackList {
    type Item = &'a Track;
    type IntoIter = std::slice::Iter<'a, Track>;

    fn into_iter(self) -> Self::IntoIter {
        self.tracks.iter()
    }
}

/// Engine playback state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn as_str(self) -> &'static str {
        match self {
            PlaybackState::Stopped => "stopped",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Playlist summary returned by registry listings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaylistInfo {
    pub name: String,
    /// Number of tracks.
    pub len: usize,
    /// `true` for the built-in playlist.
    pub system: bool,
}

/// Point-in-time view of the player.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlayerStatus {
    pub state: PlaybackState,
    /// Index in the active list; `None` when stopped.
    pub position: Option<usize>,
    /// Playlist the engine was started from, if any.
    pub playlist: Option<String>,
    /// Display name of the track currently loaded.
    pub track: Option<String>,
}
