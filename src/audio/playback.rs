//! # Playback Boundary
//!
//! Where playable units leave the engine. The reassembler neither plays audio
//! nor waits for playback; it hands every unit to a `PlaybackSink` and moves on.
//!
//! ## Sinks:
//! - **UnitQueue**: pull-style. Playback polls it at its own pace. Cleared on
//!   interrupt so stale speech is not played after the user cut in.
//! - **ChannelSink**: push-style over a tokio channel, for async consumers.
//! - The WebSocket endpoint has its own sink that forwards units to the
//!   connection actor.

use crate::audio::chunk::PlayableUnit;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

/// Receives units in emission order.
///
/// ## Rust Concepts:
/// - **Send + Sync**: sinks are shared between the tick task and the
///   arrival path, which calls `clear` on interrupt
pub trait PlaybackSink: Send + Sync {
    fn deliver(&self, unit: PlayableUnit);

    /// Discard units delivered but not yet played. Sinks that cannot take
    /// anything back keep the default no-op.
    fn clear(&self) {}
}

/// FIFO of units waiting to be played.
#[derive(Debug, Clone, Default)]
pub struct UnitQueue {
    units: Arc<Mutex<VecDeque<PlayableUnit>>>,
}

impl UnitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<PlayableUnit>> {
        self.units.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn pop(&self) -> Option<PlayableUnit> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl PlaybackSink for UnitQueue {
    fn deliver(&self, unit: PlayableUnit) {
        self.lock().push_back(unit);
    }

    fn clear(&self) {
        let mut units = self.lock();
        if !units.is_empty() {
            debug!(dropped = units.len(), "Clearing pending playback units");
        }
        units.clear();
    }
}

/// Forwards units into an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<PlayableUnit>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::UnboundedSender<PlayableUnit>) -> Self {
        Self { sender }
    }

    /// Sink plus the receiving half.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PlayableUnit>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

impl PlaybackSink for ChannelSink {
    fn deliver(&self, unit: PlayableUnit) {
        // A dropped receiver means nobody is listening any more.
        if self.sender.send(unit).is_err() {
            debug!("Playback receiver closed, discarding unit");
        }
    }
}
