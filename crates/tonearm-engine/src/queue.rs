//! Bounded PCM ring shared between the engine thread and the CPAL callback.
//!
//! The engine pushes signed 16-bit samples without blocking; the device callback drains
//! them without blocking and plays silence on underrun. Waiting for free space happens
//! only in [`PcmRing::wait_for_space`], which the availability monitor calls.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Ring of interleaved `i16` samples with a condvar signalling "space freed".
///
/// One ring lives as long as its output; format changes resize it in place so waiters
/// handed out earlier stay attached.
pub struct PcmRing {
    inner: Mutex<RingInner>,
    cv: Condvar,
    underruns: AtomicU64,
}

struct RingInner {
    queue: VecDeque<i16>,
    capacity: usize,
    /// Minimum free samples before a waiter is woken.
    low_water: usize,
    paused: bool,
}

impl RingInner {
    fn free(&self) -> usize {
        self.capacity.saturating_sub(self.queue.len())
    }
}

/// Ring capacity in samples for `buffer_seconds` of audio.
///
/// Non-finite or non-positive `buffer_seconds` fall back to half a second.
pub fn calc_capacity_samples(rate_hz: u32, channels: u16, buffer_seconds: f32) -> usize {
    let secs = if buffer_seconds.is_finite() && buffer_seconds > 0.0 {
        buffer_seconds
    } else {
        0.5
    };
    let frames = (rate_hz as f32 * secs).ceil() as usize;
    frames.max(1).saturating_mul(channels.max(1) as usize)
}

impl PcmRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(RingInner {
                queue: VecDeque::with_capacity(capacity),
                capacity,
                low_water: (capacity / 4).max(1),
                paused: false,
            }),
            cv: Condvar::new(),
            underruns: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().unwrap().capacity
    }

    /// Drop queued audio and change the capacity.
    pub fn resize(&self, capacity: usize) {
        let capacity = capacity.max(1);
        let mut g = self.inner.lock().unwrap();
        g.queue.clear();
        g.queue.reserve(capacity);
        g.capacity = capacity;
        g.low_water = (capacity / 4).max(1);
        drop(g);
        self.cv.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Free space in samples.
    pub fn free(&self) -> usize {
        self.inner.lock().unwrap().free()
    }

    /// Append little-endian sample bytes; returns how many bytes were taken.
    ///
    /// Only whole samples are taken, and never more than fit.
    pub fn push_le_bytes(&self, bytes: &[u8]) -> usize {
        let mut g = self.inner.lock().unwrap();
        let room = g.free();
        let take = (bytes.len() / 2).min(room);
        g.queue.extend(
            bytes[..take * 2]
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]])),
        );
        take * 2
    }

    /// Fill `out` from the ring without blocking. Returns the number of samples copied;
    /// a paused ring hands out nothing.
    pub fn pop_into(&self, out: &mut [i16]) -> usize {
        let mut g = self.inner.lock().unwrap();
        if g.paused {
            return 0;
        }
        let n = out.len().min(g.queue.len());
        for (slot, sample) in out.iter_mut().zip(g.queue.drain(..n)) {
            *slot = sample;
        }
        let wake = g.free() >= g.low_water;
        drop(g);
        if n < out.len() {
            self.underruns.fetch_add(1, Ordering::Relaxed);
        }
        if n > 0 && wake {
            self.cv.notify_all();
        }
        n
    }

    /// Block until at least a quarter of the ring is free or `timeout` elapses.
    ///
    /// Returns `false` on timeout and while paused.
    pub fn wait_for_space(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut g = self.inner.lock().unwrap();
        loop {
            if !g.paused && g.free() >= g.low_water {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (next, _) = self.cv.wait_timeout(g, deadline - now).unwrap();
            g = next;
        }
    }

    /// Drop everything queued.
    pub fn clear(&self) {
        self.inner.lock().unwrap().queue.clear();
        self.cv.notify_all();
    }

    pub fn set_paused(&self, paused: bool) {
        self.inner.lock().unwrap().paused = paused;
        self.cv.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().unwrap().paused
    }

    /// Callbacks that found fewer samples than requested.
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }
}
