//! Lock-free engine status published by the engine thread.
//!
//! The engine is the only writer; the player facade reads snapshots without entering the
//! engine loop.

use std::sync::atomic::{AtomicI64, AtomicU8, AtomicU64, Ordering};

use tonearm_types::PlaybackState;

/// Latest state, position and loaded track of the engine.
#[derive(Debug)]
pub struct EngineStatus {
    state: AtomicU8,
    /// `-1` when there is no current track.
    position: AtomicI64,
    /// Raw track id; `0` when nothing is loaded.
    track: AtomicU64,
}

/// Values read from [`EngineStatus`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineSnapshot {
    pub state: PlaybackState,
    pub position: Option<usize>,
    pub track_id: Option<u64>,
}

impl Default for EngineStatus {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(encode_state(PlaybackState::Stopped)),
            position: AtomicI64::new(-1),
            track: AtomicU64::new(0),
        }
    }
}

impl EngineStatus {
    pub(crate) fn publish(&self, state: PlaybackState, position: Option<usize>, track_id: Option<u64>) {
        self.track.store(track_id.unwrap_or(0), Ordering::Relaxed);
        self.position
            .store(position.map(|p| p as i64).unwrap_or(-1), Ordering::Relaxed);
        self.state.store(encode_state(state), Ordering::Release);
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let state = decode_state(self.state.load(Ordering::Acquire));
        let position = self.position.load(Ordering::Relaxed);
        let track = self.track.load(Ordering::Relaxed);
        EngineSnapshot {
            state,
            position: usize::try_from(position).ok(),
            track_id: (track != 0).then_some(track),
        }
    }
}

fn encode_state(state: PlaybackState) -> u8 {
    match state {
        PlaybackState::Stopped => 0,
        PlaybackState::Playing => 1,
        PlaybackState::Paused => 2,
    }
}

fn decode_state(raw: u8) -> PlaybackState {
    match raw {
        1 => PlaybackState::Playing,
        2 => PlaybackState::Paused,
        _ => PlaybackState::Stopped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_snapshot_is_stopped_without_position() {
        let status = EngineStatus::default();
        let snap = status.snapshot();
        assert_eq!(snap.state, PlaybackState::Stopped);
        assert_eq!(snap.position, None);
        assert_eq!(snap.track_id, None);
    }

    #[test]
    fn publish_roundtrips_through_atomics() {
        let status = EngineStatus::default();
        status.publish(PlaybackState::Paused, Some(3), Some(42));
        let snap = status.snapshot();
        assert_eq!(snap.state, PlaybackState::Paused);
        assert_eq!(snap.position, Some(3));
        assert_eq!(snap.track_id, Some(42));
    }
}
