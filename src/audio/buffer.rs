//! # Response Buffer
//!
//! Accumulates decoded samples and transcript fragments for the response that
//! is currently being spoken, until the reassembler decides to flush.
//!
//! ## Key Features:
//! - **Paired buffers**: samples and transcript are only ever cleared together,
//!   so emitted audio and text stay aligned
//! - **No locking**: the buffer belongs to the consumption tick alone. Arrival
//!   threads only touch the `ResponseQueue`
//! - **Flush thresholds**: `ReassemblyConfig` carries the capacity and
//!   idle-timeout settings that drive flushing

use crate::audio::wav::SizePolicy;
use std::time::Duration;

/// Tuning for one reassembly pipeline.
///
/// ## Rust Concepts:
/// - **#[derive(Debug, Clone)]**: every session gets its own copy, taken from
///   the application config when the session is created
#[derive(Debug, Clone)]
pub struct ReassemblyConfig {
    /// Rate assumed before any header has been decoded, and for degraded
    /// headers whose chunk carries no hint.
    pub nominal_sample_rate: u32,

    /// Capacity trigger, as a multiple of one second of audio at the current
    /// sample rate (3.0 => flush once 3 s are buffered).
    pub capacity_seconds: f64,

    /// Flush a non-empty buffer after this long without a data chunk.
    pub idle_timeout: Duration,

    /// Chunks longer than this are data chunks; anything at or below is only
    /// meaningful as an end-of-stream marker.
    pub min_data_chunk_bytes: usize,

    /// Upper bound on chunks popped per tick.
    pub max_chunks_per_tick: usize,

    /// How the header decoder treats inconsistent declared payload sizes.
    pub size_policy: SizePolicy,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            nominal_sample_rate: 44100,
            capacity_seconds: 3.0,
            idle_timeout: Duration::from_millis(1500),
            min_data_chunk_bytes: 46,
            max_chunks_per_tick: 1,
            size_policy: SizePolicy::Lenient,
        }
    }
}

impl ReassemblyConfig {
    /// Number of buffered samples that triggers a capacity flush.
    ///
    /// ## Example:
    /// At 44.1kHz with the default 3x policy: 44100 * 3 = 132,300 samples
    pub fn capacity_samples(&self, sample_rate: u32) -> usize {
        (sample_rate as f64 * self.capacity_seconds).round() as usize
    }
}

/// Samples and transcript text accumulated since the last flush.
#[derive(Debug, Default)]
pub struct ResponseBuffer {
    samples: Vec<f32>,
    transcript: Vec<String>,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one chunk's worth of samples and its transcript fragment.
    /// Empty fragments are skipped so they don't produce double spaces.
    pub fn append(&mut self, samples: &[f32], fragment: Option<&str>) {
        self.samples.extend_from_slice(samples);
        if let Some(text) = fragment.filter(|t| !t.is_empty()) {
            self.transcript.push(text.to_string());
        }
    }

    /// Number of buffered samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// "Has buffered data" means samples; a transcript alone does not count.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn transcript_fragments(&self) -> &[String] {
        &self.transcript
    }

    /// Move everything out, leaving both buffers empty.
    ///
    /// ## Returns:
    /// The samples and the fragments joined with single spaces.
    pub fn take(&mut self) -> (Vec<f32>, String) {
        let samples = std::mem::take(&mut self.samples);
        let transcript = std::mem::take(&mut self.transcript).join(" ");
        (samples, transcript)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.transcript.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ReassemblyConfig::default();
        assert_eq!(config.capacity_samples(44100), 132_300);
        assert_eq!(config.capacity_samples(16000), 48_000);
        assert_eq!(config.idle_timeout, Duration::from_millis(1500));
        assert_eq!(config.min_data_chunk_bytes, 46);
    }

    #[test]
    fn test_take_joins_transcript_and_clears_both() {
        let mut buffer = ResponseBuffer::new();
        buffer.append(&[0.1, 0.2], Some("Hello"));
        buffer.append(&[0.3], None);
        buffer.append(&[], Some(""));
        buffer.append(&[0.4], Some("there."));

        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.transcript_fragments().len(), 2);

        let (samples, transcript) = buffer.take();
        assert_eq!(samples, vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(transcript, "Hello there.");
        assert!(buffer.is_empty());
        assert!(buffer.transcript_fragments().is_empty());
    }

    #[test]
    fn test_transcript_alone_is_not_buffered_data() {
        let mut buffer = ResponseBuffer::new();
        buffer.append(&[], Some("text without audio"));
        assert!(buffer.is_empty());

        buffer.clear();
        assert!(buffer.transcript_fragments().is_empty());
    }
}
