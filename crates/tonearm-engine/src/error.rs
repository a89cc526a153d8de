use std::path::PathBuf;

/// Why a track could not be started.
#[derive(Debug, thiserror::Error)]
pub(crate) enum TrackError {
    #[error("no decoder registered for extension {ext:?} ({})", .file.display())]
    UnsupportedExtension { ext: String, file: PathBuf },
    #[error("cannot open {}: {reason:#}", .file.display())]
    Open {
        file: PathBuf,
        reason: anyhow::Error,
    },
    #[error("cannot seek {}: {reason:#}", .file.display())]
    Seek {
        file: PathBuf,
        reason: anyhow::Error,
    },
    #[error("output device failed: {0:#}")]
    Output(anyhow::Error),
}

impl TrackError {
    /// Output failures end the session; the rest only sink the track.
    pub(crate) fn is_fatal(&self) -> bool {
        matches!(self, TrackError::Output(_))
    }
}

/// Errors returned to player clients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlayerError {
    #[error("playlist {0} already exists")]
    PlaylistExists(String),
    #[error("playlist {0} not found")]
    PlaylistNotFound(String),
    #[error("system playlist can't be deleted")]
    SystemPlaylist,
    #[error("playlist {0} is empty")]
    EmptyPlaylist(String),
    #[error("player is closed")]
    Closed,
}
