//! # Response Stream Sessions
//!
//! One `ResponseStream` per conversational session (one per speaking
//! character). Each stream owns its own queue and reassembler, so
//! several characters can be reassembled side by side without sharing state.
//!
//! ## Stream Lifecycle:
//! 1. **Active**: chunks are consumed every tick
//! 2. **Inactive**: chunks stay queued, no timeout flushes happen
//!
//! `SessionManager::activate` switches focus: the target becomes Active,
//! every other stream is interrupted and made Inactive.
//!
//! ## Thread Safety:
//! - The arrival path only calls `enqueue` (queue lock)
//! - `tick_at` and `interrupt` both hold the reassembler mutex for their whole
//!   duration, so an interrupt never lands in the middle of a tick and a unit
//!   is never delivered after the interrupt that should have discarded it

use crate::audio::buffer::ReassemblyConfig;
use crate::audio::chunk::RawChunk;
use crate::audio::playback::PlaybackSink;
use crate::audio::queue::ResponseQueue;
use crate::audio::reassembler::{ReassemblyState, ReassemblyStats, ResponseReassembler};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Whether a stream's queue is being consumed.
///
/// ## Rust Concepts:
/// - **#[serde(rename_all)]**: serializes as `"active"` / `"inactive"` in API
///   responses without a hand-written mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    Active,
    Inactive,
}

impl StreamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamStatus::Active => "active",
            StreamStatus::Inactive => "inactive",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("maximum concurrent sessions ({max}) reached")]
    LimitReached { max: usize },

    #[error("session '{0}' already exists")]
    DuplicateId(String),

    #[error("session '{0}' not found")]
    NotFound(String),
}

/// Arrival-side counters. Atomics so `enqueue` never touches the reassembler lock.
#[derive(Debug, Default)]
struct ArrivalCounters {
    chunks_received: AtomicU64,
    bytes_received: AtomicU64,
    interrupts: AtomicU64,
}

/// Queue + reassembler + playback sink for one session.
pub struct ResponseStream {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    queue: ResponseQueue,
    reassembler: Mutex<ResponseReassembler>,
    status: RwLock<StreamStatus>,
    sink: Arc<dyn PlaybackSink>,
    counters: ArrivalCounters,
}

impl ResponseStream {
    pub fn new(session_id: String, config: ReassemblyConfig, sink: Arc<dyn PlaybackSink>) -> Self {
        Self {
            session_id,
            created_at: Utc::now(),
            queue: ResponseQueue::new(),
            reassembler: Mutex::new(ResponseReassembler::new(config)),
            status: RwLock::new(StreamStatus::Active),
            sink,
            counters: ArrivalCounters::default(),
        }
    }

    /// A panic inside one tick leaves a poisoned mutex; the reassembler is
    /// taken as-is so the session keeps working.
    fn reassembler(&self) -> MutexGuard<'_, ResponseReassembler> {
        self.reassembler.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arrival path: queue a chunk for the next ticks.
    pub fn enqueue(&self, chunk: RawChunk) {
        self.counters.chunks_received.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes_received
            .fetch_add(chunk.len() as u64, Ordering::Relaxed);
        self.queue.push(chunk);
    }

    pub fn queue(&self) -> &ResponseQueue {
        &self.queue
    }

    pub fn status(&self) -> StreamStatus {
        *self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_status(&self, status: StreamStatus) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = status;
    }

    pub fn is_active(&self) -> bool {
        self.status() == StreamStatus::Active
    }

    /// Run one consumption tick at `now` and deliver every resulting unit.
    ///
    /// ## Returns:
    /// Number of units delivered. Inactive streams do nothing and return 0.
    pub fn tick_at(&self, now: Instant) -> usize {
        let mut reassembler = self.reassembler();
        if !self.is_active() {
            return 0;
        }

        let flushes = reassembler.tick(&self.queue, now);
        let delivered = flushes.len();
        for flush in flushes {
            debug!(
                session_id = %self.session_id,
                reason = ?flush.reason,
                "Delivering playable unit"
            );
            self.sink.deliver(flush.unit);
        }
        delivered
    }

    /// Stop the current response: drop queued chunks, reset the reassembler
    /// and discard units still waiting for playback.
    ///
    /// ## Returns:
    /// Number of queued chunks that were discarded.
    pub fn interrupt(&self) -> usize {
        let mut reassembler = self.reassembler();
        let dropped = self.queue.clear();
        let discarded_samples = reassembler.buffered_samples();
        reassembler.reset();
        self.sink.clear();
        self.counters.interrupts.fetch_add(1, Ordering::Relaxed);

        info!(
            session_id = %self.session_id,
            dropped_chunks = dropped,
            discarded_samples,
            "Response stream interrupted"
        );
        dropped
    }

    pub fn snapshot(&self) -> StreamSnapshot {
        let reassembler = self.reassembler();
        StreamSnapshot {
            session_id: self.session_id.clone(),
            status: self.status(),
            state: reassembler.state(),
            queued_chunks: self.queue.len(),
            buffered_samples: reassembler.buffered_samples(),
            current_sample_rate: reassembler.current_sample_rate(),
            chunks_received: self.counters.chunks_received.load(Ordering::Relaxed),
            bytes_received: self.counters.bytes_received.load(Ordering::Relaxed),
            interrupts: self.counters.interrupts.load(Ordering::Relaxed),
            stats: reassembler.stats(),
            created_at: self.created_at,
        }
    }
}

/// Point-in-time view of a stream for the session API.
#[derive(Debug, Clone, Serialize)]
pub struct StreamSnapshot {
    pub session_id: String,
    pub status: StreamStatus,
    pub state: ReassemblyState,
    pub queued_chunks: usize,
    pub buffered_samples: usize,
    pub current_sample_rate: u32,
    pub chunks_received: u64,
    pub bytes_received: u64,
    pub interrupts: u64,
    pub stats: ReassemblyStats,
    pub created_at: DateTime<Utc>,
}

/// Owns every live stream.
///
/// ## Thread Safety:
/// The map sits behind a RwLock. Ticking clones the `Arc`s out first and
/// releases the map lock, so creating or removing a session never waits on a
/// tick in progress.
pub struct SessionManager {
    streams: RwLock<HashMap<String, Arc<ResponseStream>>>,
    max_concurrent_sessions: AtomicUsize,
    default_config: RwLock<ReassemblyConfig>,
}

impl SessionManager {
    pub fn new(max_concurrent_sessions: usize, default_config: ReassemblyConfig) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            max_concurrent_sessions: AtomicUsize::new(max_concurrent_sessions),
            default_config: RwLock::new(default_config),
        }
    }

    /// Replace the configuration used for sessions created from now on.
    pub fn set_default_config(&self, config: ReassemblyConfig) {
        *self.default_config.write().unwrap_or_else(PoisonError::into_inner) = config;
    }

    pub fn default_config(&self) -> ReassemblyConfig {
        self.default_config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Register a new stream delivering into `sink`.
    ///
    /// ## Parameters:
    /// - **session_id**: caller-chosen id; a UUID is generated when `None`
    pub fn create_session(
        &self,
        session_id: Option<String>,
        sink: Arc<dyn PlaybackSink>,
    ) -> Result<Arc<ResponseStream>, SessionError> {
        let config = self.default_config();
        let mut streams = self.streams.write().unwrap_or_else(PoisonError::into_inner);

        let max = self.max_sessions();
        if streams.len() >= max {
            return Err(SessionError::LimitReached { max });
        }

        let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        if streams.contains_key(&session_id) {
            return Err(SessionError::DuplicateId(session_id));
        }

        let stream = Arc::new(ResponseStream::new(session_id.clone(), config, sink));
        streams.insert(session_id.clone(), Arc::clone(&stream));

        info!(%session_id, total = streams.len(), "Response stream created");
        Ok(stream)
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<ResponseStream>> {
        self.streams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
    }

    /// Drop a stream. Whatever was still queued or buffered is discarded.
    pub fn remove(&self, session_id: &str) -> bool {
        let removed = self
            .streams
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id)
            .is_some();
        if removed {
            info!(%session_id, "Response stream removed");
        }
        removed
    }

    pub fn session_count(&self) -> usize {
        self.streams.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn max_sessions(&self) -> usize {
        self.max_concurrent_sessions.load(Ordering::Relaxed)
    }

    /// Change the session limit. Streams above a lowered limit stay
    /// registered; only new sessions are refused.
    pub fn set_max_sessions(&self, max: usize) {
        self.max_concurrent_sessions.store(max, Ordering::Relaxed);
    }

    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .streams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    fn all_streams(&self) -> Vec<Arc<ResponseStream>> {
        self.streams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Give focus to `session_id`: every other active stream is interrupted
    /// and deactivated.
    pub fn activate(&self, session_id: &str) -> Result<(), SessionError> {
        let target = self
            .get(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        for stream in self.all_streams() {
            if stream.session_id != session_id && stream.is_active() {
                stream.interrupt();
                stream.set_status(StreamStatus::Inactive);
            }
        }
        target.set_status(StreamStatus::Active);

        info!(%session_id, "Response stream activated");
        Ok(())
    }

    /// Tick every stream at `now`. Returns the total number of units delivered.
    pub fn tick_all(&self, now: Instant) -> usize {
        self.all_streams().iter().map(|stream| stream.tick_at(now)).sum()
    }

    pub fn snapshots(&self) -> Vec<StreamSnapshot> {
        let mut snapshots: Vec<StreamSnapshot> =
            self.all_streams().iter().map(|stream| stream.snapshot()).collect();
        snapshots.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        snapshots
    }

    pub fn summary(&self) -> SessionManagerSummary {
        let mut summary = SessionManagerSummary {
            max_sessions: self.max_sessions(),
            ..SessionManagerSummary::default()
        };

        for snapshot in self.snapshots() {
            summary.total_sessions += 1;
            *summary
                .status_counts
                .entry(snapshot.status.as_str().to_string())
                .or_insert(0) += 1;
            summary.total_chunks_received += snapshot.chunks_received;
            summary.total_bytes_received += snapshot.bytes_received;
            summary.total_chunks_rejected += snapshot.stats.chunks_rejected;
            summary.total_units_emitted += snapshot.stats.units_emitted;
            summary.total_interrupts += snapshot.interrupts;
        }
        summary
    }
}

/// Aggregate over all streams.
#[derive(Debug, Default, Serialize)]
pub struct SessionManagerSummary {
    pub total_sessions: usize,
    pub max_sessions: usize,
    pub status_counts: HashMap<String, usize>,
    pub total_chunks_received: u64,
    pub total_bytes_received: u64,
    pub total_chunks_rejected: u64,
    pub total_units_emitted: u64,
    pub total_interrupts: u64,
}
