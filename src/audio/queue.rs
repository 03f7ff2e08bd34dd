//! # Response Queue
//!
//! Hands raw chunks from the arrival path (transport callback, WebSocket actor)
//! to the consumption tick.
//!
//! ## Thread Safety:
//! This is the only structure touched from both sides. It uses
//! `Arc<Mutex<VecDeque<RawChunk>>>`: the lock is held just long enough for one
//! push or pop, so the tick never waits on data, only (briefly) on the lock.
//! A pop on an empty queue returns `None` and the tick re-polls next period.

use crate::audio::chunk::RawChunk;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Unbounded FIFO of raw response chunks. Cloning shares the same queue.
#[derive(Debug, Clone, Default)]
pub struct ResponseQueue {
    chunks: Arc<Mutex<VecDeque<RawChunk>>>,
}

impl ResponseQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the deque. A panic elsewhere while holding the lock leaves the
    /// deque itself consistent, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, VecDeque<RawChunk>> {
        self.chunks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a chunk in arrival order. Never drops.
    pub fn push(&self, chunk: RawChunk) {
        self.lock().push_back(chunk);
    }

    /// Take the oldest chunk, or `None` without waiting if there is none.
    pub fn pop(&self) -> Option<RawChunk> {
        self.lock().pop_front()
    }

    /// Drop every queued chunk. Returns how many were discarded.
    pub fn clear(&self) -> usize {
        let mut chunks = self.lock();
        let dropped = chunks.len();
        chunks.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
