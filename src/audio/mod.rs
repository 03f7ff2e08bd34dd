//! # Response Audio Reassembly
//!
//! Turns the chunked speech a conversational AI service streams back into
//! smooth, playable units for a game character.
//!
//! ## Pipeline:
//! ```text
//! transport --RawChunk--> ResponseQueue --tick--> ResponseReassembler --PlayableUnit--> PlaybackSink
//!                                                  (wav -> samples -> buffer)
//! ```
//!
//! ## Key Components:
//! - **wav**: lenient RIFF/WAVE header decoding
//! - **samples**: 8/16-bit PCM to normalized f32
//! - **buffer**: paired sample/transcript buffers and reassembly tuning
//! - **reassembler**: the flush state machine (capacity, end-of-response, idle timeout)
//! - **queue**: thread-safe hand-off from the arrival path to the tick
//! - **playback**: where units go once emitted
//! - **session**: one stream per speaking character, plus the manager owning them
//! - **ticker**: the fixed-rate driver used by the server

pub mod buffer;
pub mod chunk;
pub mod playback;
pub mod queue;
pub mod reassembler;
pub mod samples;
pub mod session;
pub mod ticker;
pub mod wav;

#[cfg(test)]
mod test_support;

pub use buffer::{ReassemblyConfig, ResponseBuffer};
pub use chunk::{PlayableUnit, RawChunk};
pub use playback::{ChannelSink, PlaybackSink, UnitQueue};
pub use queue::ResponseQueue;
pub use reassembler::{Flush, FlushReason, ReassemblyState, ReassemblyStats, ResponseReassembler};
pub use samples::decode_pcm;
pub use session::{ResponseStream, SessionError, SessionManager, StreamStatus};
pub use wav::{AudioHeader, SizePolicy, WavFormatDecoder};
