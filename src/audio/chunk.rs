//! # Response Chunks and Playable Units
//!
//! The two values that cross the engine boundary:
//!
//! - **RawChunk** comes *in* from the transport, one per delivered message.
//! - **PlayableUnit** goes *out* to playback, one per flush.

/// One raw response chunk as delivered by the transport.
///
/// A chunk is either a *data chunk* (a RIFF/WAVE header plus PCM payload) or
/// a zero/near-zero length *end marker* with `end_of_stream` set. Once built
/// it is never mutated; the queue owns it until the consumption tick pops it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawChunk {
    /// Bytes exactly as received.
    pub bytes: Vec<u8>,

    /// Transcript fragment that accompanied this audio, if any.
    pub transcript: Option<String>,

    /// Marks the last chunk of a response.
    pub end_of_stream: bool,

    /// Sample rate announced by the transport. Used when the embedded header
    /// is damaged and decoding falls back to degraded mode.
    pub sample_rate_hint: Option<u32>,
}

impl RawChunk {
    /// A data chunk carrying audio bytes and an optional transcript fragment.
    pub fn data(bytes: Vec<u8>, transcript: Option<String>) -> Self {
        Self {
            bytes,
            transcript,
            end_of_stream: false,
            sample_rate_hint: None,
        }
    }

    /// An empty end-of-response marker.
    pub fn end_marker() -> Self {
        Self {
            bytes: Vec::new(),
            transcript: None,
            end_of_stream: true,
            sample_rate_hint: None,
        }
    }

    pub fn with_sample_rate_hint(mut self, sample_rate: u32) -> Self {
        self.sample_rate_hint = Some(sample_rate);
        self
    }

    pub fn with_end_of_stream(mut self, end_of_stream: bool) -> Self {
        self.end_of_stream = end_of_stream;
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Ready-to-play audio emitted by the reassembler.
///
/// Ownership moves to the playback collaborator on emission; the reassembler
/// keeps nothing.
///
/// ## Null units:
/// An end-of-response with nothing buffered produces a unit with no samples,
/// `transcript: None` and `is_final: true`. It tells playback "this response
/// is over" without carrying audio, and is distinct from a flush of real data
/// (which always has `transcript: Some(..)`, possibly empty).
#[derive(Debug, Clone, PartialEq)]
pub struct PlayableUnit {
    /// Normalized samples in [-1.0, 1.0], interleaved if multi-channel.
    pub samples: Vec<f32>,

    /// Transcript fragments joined with single spaces.
    pub transcript: Option<String>,

    /// Sample rate declared by the most recent decoded header.
    pub sample_rate: u32,

    /// No more audio follows in this response.
    pub is_final: bool,
}

impl PlayableUnit {
    /// End-of-response marker with no trailing audio.
    pub fn null_final(sample_rate: u32) -> Self {
        Self {
            samples: Vec::new(),
            transcript: None,
            sample_rate,
            is_final: true,
        }
    }

    pub fn is_null(&self) -> bool {
        self.samples.is_empty() && self.transcript.is_none()
    }

    /// Playback length in seconds (mono assumption, matching playback).
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}
