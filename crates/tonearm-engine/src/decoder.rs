//! Decoder capability and the extension → constructor registry.
//!
//! The engine never names a concrete decoder; it asks the registry for one matching the
//! extension of the track's physical file.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

/// Turns a file into a stream of interleaved signed 16-bit little-endian PCM bytes.
pub trait Decoder {
    /// Open `path` and prepare to decode from its beginning.
    fn open(&mut self, path: &Path) -> Result<()>;

    /// Fill `buf` with up to `buf.len()` bytes of PCM.
    ///
    /// Returns `Ok(0)` only at the end of the stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Reposition the stream. `exact` asks for sample accuracy instead of the nearest
    /// cheap sync point.
    fn seek(&mut self, pos: Duration, exact: bool) -> Result<()>;

    /// Stream time of the next byte `read` will return.
    fn time(&self) -> Duration;

    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    /// Release the file. Safe to call more than once.
    fn close(&mut self);
}

/// Builds a fresh, unopened decoder.
pub type DecoderConstructor = Arc<dyn Fn() -> Box<dyn Decoder> + Send + Sync>;

/// Maps lower-cased file extensions to decoder constructors.
#[derive(Clone, Default)]
pub struct DecoderRegistry {
    by_ext: HashMap<String, DecoderConstructor>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the Symphonia decoder for every extension it is built with.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let ctor: DecoderConstructor = Arc::new(|| {
            Box::new(crate::decode::SymphoniaDecoder::new()) as Box<dyn Decoder>
        });
        for ext in crate::decode::SUPPORTED_EXTENSIONS {
            registry.register_arc(ext, ctor.clone());
        }
        registry
    }

    /// Register `ctor` for `ext` (case-insensitive, without the dot), replacing any
    /// previous entry.
    pub fn register<F>(&mut self, ext: &str, ctor: F)
    where
        F: Fn() -> Box<dyn Decoder> + Send + Sync + 'static,
    {
        self.register_arc(ext, Arc::new(ctor));
    }

    fn register_arc(&mut self, ext: &str, ctor: DecoderConstructor) {
        self.by_ext.insert(normalize_ext(ext), ctor);
    }

    pub fn supports(&self, ext: &str) -> bool {
        self.by_ext.contains_key(&normalize_ext(ext))
    }

    /// Build a decoder for `ext`, or `None` when nothing is registered for it.
    pub fn create(&self, ext: &str) -> Option<Box<dyn Decoder>> {
        self.by_ext.get(&normalize_ext(ext)).map(|ctor| ctor())
    }

    /// Registered extensions, sorted.
    pub fn extensions(&self) -> Vec<String> {
        let mut exts: Vec<String> = self.by_ext.keys().cloned().collect();
        exts.sort();
        exts
    }
}

impl fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderRegistry")
            .field("extensions", &self.extensions())
            .finish()
    }
}

fn normalize_ext(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDecoder, Recorder};

    #[test]
    fn lookup_is_case_insensitive_and_ignores_dot() {
        let rec = Recorder::default();
        let mut registry = DecoderRegistry::new();
        let r = rec.clone();
        registry.register("MP3", move || Box::new(FakeDecoder::new(r.clone())));
        assert!(registry.supports("mp3"));
        assert!(registry.supports(".Mp3"));
        assert!(registry.create("mp3").is_some());
        assert!(registry.create("flac").is_none());
    }

    #[test]
    fn defaults_cover_common_formats() {
        let registry = DecoderRegistry::with_defaults();
        for ext in ["flac", "mp3", "wav", "ogg"] {
            assert!(registry.supports(ext), "{ext} should be registered");
        }
        assert!(!registry.supports("txt"));
    }

    #[test]
    fn extensions_are_sorted() {
        let rec = Recorder::default();
        let mut registry = DecoderRegistry::new();
        for ext in ["wav", "flac"] {
            let r = rec.clone();
            registry.register(ext, move || Box::new(FakeDecoder::new(r.clone())));
        }
        assert_eq!(registry.extensions(), vec!["flac".to_string(), "wav".to_string()]);
    }
}
