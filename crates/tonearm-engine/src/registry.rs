//! Named playlists owned by the player facade.

use tonearm_types::{PlaylistInfo, SYSTEM_PLAYLIST, Track, TrackList};

use crate::error::PlayerError;

#[derive(Debug)]
struct Playlist {
    name: String,
    tracks: Vec<Track>,
}

/// Playlists in creation order. The system playlist is always first.
#[derive(Debug)]
pub struct PlaylistRegistry {
    lists: Vec<Playlist>,
}

impl Default for PlaylistRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaylistRegistry {
    pub fn new() -> Self {
        Self {
            lists: vec![Playlist {
                name: SYSTEM_PLAYLIST.to_string(),
                tracks: Vec::new(),
            }],
        }
    }

    pub fn list(&self) -> Vec<PlaylistInfo> {
        self.lists
            .iter()
            .map(|p| PlaylistInfo {
                name: p.name.clone(),
                len: p.tracks.len(),
                system: p.name == SYSTEM_PLAYLIST,
            })
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn add(&mut self, name: &str) -> Result<(), PlayerError> {
        if self.contains(name) {
            return Err(PlayerError::PlaylistExists(name.to_string()));
        }
        self.lists.push(Playlist {
            name: name.to_string(),
            tracks: Vec::new(),
        });
        Ok(())
    }

    /// Remove `name`. Returns whether anything was removed; a missing name is not an error.
    pub fn delete(&mut self, name: &str) -> Result<bool, PlayerError> {
        if name == SYSTEM_PLAYLIST {
            return Err(PlayerError::SystemPlaylist);
        }
        let before = self.lists.len();
        self.lists.retain(|p| p.name != name);
        Ok(self.lists.len() != before)
    }

    pub fn append(&mut self, name: &str, tracks: Vec<Track>) -> Result<usize, PlayerError> {
        let list = self.find_mut(name)?;
        list.tracks.extend(tracks);
        Ok(list.tracks.len())
    }

    pub fn clear(&mut self, name: &str) -> Result<(), PlayerError> {
        self.find_mut(name)?.tracks.clear();
        Ok(())
    }

    /// Immutable snapshot of `name` for the engine.
    pub fn snapshot(&self, name: &str) -> Result<TrackList, PlayerError> {
        self.find(name)
            .map(|p| TrackList::new(p.tracks.clone()))
            .ok_or_else(|| PlayerError::PlaylistNotFound(name.to_string()))
    }

    fn find(&self, name: &str) -> Option<&Playlist> {
        self.lists.iter().find(|p| p.name == name)
    }

    fn find_mut(&mut self, name: &str) -> Result<&mut Playlist, PlayerError> {
        self.lists
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| PlayerError::PlaylistNotFound(name.to_string()))
    }
}
