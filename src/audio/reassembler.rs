//! # Response Reassembler
//!
//! Turns a stream of small, irregular response chunks into a few larger
//! playable units, each paired with the transcript spoken in it.
//!
//! ## State machine:
//! ```text
//! Idle --data chunk--> Accumulating --flush--> Idle
//! ```
//! There is no "flushing" state: a flush moves the buffers out and clears them
//! in one step.
//!
//! ## Flush triggers:
//! 1. **Capacity**: right after appending, if the buffer holds at least
//!    `capacity_seconds` of audio at the current sample rate (`is_final = false`)
//! 2. **End of response**: an end-of-stream chunk flushes with `is_final = true`,
//!    or emits a null unit when nothing is buffered
//! 3. **Idle timeout**: once per tick, after chunk processing, a non-empty
//!    buffer that has not grown for `idle_timeout` is flushed (`is_final = false`).
//!    Skipped on a tick where a capacity flush already happened.
//!
//! Malformed chunks are dropped and counted; they never disturb audio already
//! buffered from earlier chunks.

use crate::audio::buffer::{ReassemblyConfig, ResponseBuffer};
use crate::audio::chunk::{PlayableUnit, RawChunk};
use crate::audio::queue::ResponseQueue;
use crate::audio::samples::decode_pcm;
use crate::audio::wav::WavFormatDecoder;
use crate::error::DecodeError;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReassemblyState {
    /// Nothing buffered.
    Idle,
    /// Samples buffered, waiting for more or for a flush trigger.
    Accumulating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushReason {
    Capacity,
    IdleTimeout,
    EndOfResponse,
}

/// A unit leaving the reassembler, with the trigger that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Flush {
    pub reason: FlushReason,
    pub unit: PlayableUnit,
}

/// Running counters, reported through the session API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReassemblyStats {
    /// Chunks popped and examined.
    pub chunks_processed: u64,
    /// Chunks dropped: decode failures and short chunks without the end flag.
    pub chunks_rejected: u64,
    /// Headers whose declared payload size had to be corrected.
    pub size_corrections: u64,
    /// Units carrying audio.
    pub units_emitted: u64,
    /// End-of-response units with no audio.
    pub null_units_emitted: u64,
}

/// Stateful buffering engine for one conversational session.
///
/// Owned by the consumption side only; see `ResponseStream` for how ticks
/// and interrupts are kept mutually exclusive.
#[derive(Debug)]
pub struct ResponseReassembler {
    config: ReassemblyConfig,
    decoder: WavFormatDecoder,
    buffer: ResponseBuffer,
    last_arrival: Option<Instant>,
    current_sample_rate: u32,
    stats: ReassemblyStats,
}

impl ResponseReassembler {
    pub fn new(config: ReassemblyConfig) -> Self {
        Self {
            decoder: WavFormatDecoder::new(config.size_policy),
            buffer: ResponseBuffer::new(),
            last_arrival: None,
            current_sample_rate: config.nominal_sample_rate,
            stats: ReassemblyStats::default(),
            config,
        }
    }

    pub fn config(&self) -> &ReassemblyConfig {
        &self.config
    }

    pub fn state(&self) -> ReassemblyState {
        if self.buffer.is_empty() {
            ReassemblyState::Idle
        } else {
            ReassemblyState::Accumulating
        }
    }

    pub fn current_sample_rate(&self) -> u32 {
        self.current_sample_rate
    }

    pub fn buffered_samples(&self) -> usize {
        self.buffer.len()
    }

    pub fn last_arrival(&self) -> Option<Instant> {
        self.last_arrival
    }

    pub fn stats(&self) -> ReassemblyStats {
        self.stats
    }

    /// One consumption tick: pop up to `max_chunks_per_tick` chunks, process
    /// them in order, then evaluate the idle timeout.
    pub fn tick(&mut self, queue: &ResponseQueue, now: Instant) -> Vec<Flush> {
        let mut flushes = Vec::new();

        for _ in 0..self.config.max_chunks_per_tick {
            let Some(chunk) = queue.pop() else { break };
            flushes.extend(self.ingest(chunk, now));
        }

        let capacity_flushed = flushes.iter().any(|f| f.reason == FlushReason::Capacity);
        if !capacity_flushed {
            flushes.extend(self.check_idle_timeout(now));
        }

        flushes
    }

    /// Process a single chunk.
    ///
    /// ## Chunk classes:
    /// - **Data chunk** (longer than `min_data_chunk_bytes`): decoded and
    ///   appended; may trigger a capacity flush
    /// - **End marker** (`end_of_stream`): final flush or null unit. A data
    ///   chunk that also carries the flag is appended first, then finished
    /// - **Anything else**: dropped
    pub fn ingest(&mut self, chunk: RawChunk, now: Instant) -> Vec<Flush> {
        let mut flushes = Vec::new();
        self.stats.chunks_processed += 1;

        let is_data = chunk.len() > self.config.min_data_chunk_bytes;
        if is_data {
            match self.append_data(&chunk, now) {
                Ok(()) => {
                    let capacity = self.config.capacity_samples(self.current_sample_rate);
                    if self.buffer.len() >= capacity {
                        flushes.extend(self.flush(false, FlushReason::Capacity));
                    }
                }
                Err(err) => {
                    self.stats.chunks_rejected += 1;
                    warn!(len = chunk.len(), error = %err, "Dropping undecodable response chunk");
                }
            }
        }

        if chunk.end_of_stream {
            flushes.extend(self.flush(true, FlushReason::EndOfResponse));
        } else if !is_data {
            self.stats.chunks_rejected += 1;
            debug!(len = chunk.len(), "Dropping short chunk without end-of-stream flag");
        }

        flushes
    }

    fn append_data(&mut self, chunk: &RawChunk, now: Instant) -> Result<(), DecodeError> {
        let fallback_rate = chunk.sample_rate_hint.unwrap_or(self.config.nominal_sample_rate);
        let (header, range) = self.decoder.decode(&chunk.bytes, fallback_rate)?;
        let samples = decode_pcm(&chunk.bytes[range], header.bits_per_sample)?;

        if header.size_corrected {
            self.stats.size_corrections += 1;
        }

        self.buffer.append(&samples, chunk.transcript.as_deref());
        self.last_arrival = Some(now);
        self.current_sample_rate = header.sample_rate;

        debug!(
            samples = samples.len(),
            buffered = self.buffer.len(),
            sample_rate = header.sample_rate,
            degraded = header.degraded,
            "Appended response chunk"
        );
        Ok(())
    }

    /// Flush if the buffer has been idle for at least `idle_timeout`.
    pub fn check_idle_timeout(&mut self, now: Instant) -> Option<Flush> {
        let last = self.last_arrival?;
        if self.buffer.is_empty()
            || now.saturating_duration_since(last) < self.config.idle_timeout
        {
            return None;
        }
        self.flush(false, FlushReason::IdleTimeout)
    }

    /// Emit buffered audio as a unit and clear both buffers.
    ///
    /// With an empty buffer a non-final flush is a no-op (`None`), and a final
    /// flush emits a null unit.
    pub fn flush(&mut self, is_final: bool, reason: FlushReason) -> Option<Flush> {
        if self.buffer.is_empty() {
            if !is_final {
                return None;
            }
            // A chunk can decode to zero samples and still leave a fragment
            // behind; it ends with this response.
            self.buffer.clear();
            self.stats.null_units_emitted += 1;
            self.last_arrival = None;
            info!(?reason, "End of response with no buffered audio");
            return Some(Flush {
                reason,
                unit: PlayableUnit::null_final(self.current_sample_rate),
            });
        }

        let (samples, transcript) = self.buffer.take();
        self.last_arrival = None;
        self.stats.units_emitted += 1;

        info!(
            ?reason,
            samples = samples.len(),
            sample_rate = self.current_sample_rate,
            is_final,
            transcript_len = transcript.len(),
            "Flushing playable unit"
        );

        Some(Flush {
            reason,
            unit: PlayableUnit {
                samples,
                transcript: Some(transcript),
                sample_rate: self.current_sample_rate,
                is_final,
            },
        })
    }

    /// Back to Idle: buffers emptied, timer cleared, sample rate back to nominal.
    /// Counters are kept.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.last_arrival = None;
        self.current_sample_rate = self.config.nominal_sample_rate;
    }
}
