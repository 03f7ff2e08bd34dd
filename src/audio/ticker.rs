//! # Consumption Ticker
//!
//! Drives every response stream at a fixed rate. This is the only place the
//! reassemblers run from in the server; the WebSocket actors just enqueue.
//!
//! Missed ticks are skipped rather than bursted: if the runtime stalls, the
//! next tick simply pops the next chunk(s) and re-evaluates the idle timeout
//! against the real clock.
//!
//! The period is read from a `watch` channel, so a runtime config update
//! retunes the running loop without restarting it.

use crate::audio::session::SessionManager;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info};

/// Running tick loop. Dropping the handle leaves the loop running; call
/// `shutdown` to stop it.
pub struct TickerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TickerHandle {
    /// Signal the loop to stop and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }
}

fn tick_timer(period: Duration) -> Interval {
    let mut timer = tokio::time::interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    timer
}

/// Spawn the tick loop on the current tokio runtime.
///
/// ## Parameters:
/// - **period**: receiver for the tick period; each new value replaces the
///   running interval
pub fn spawn_tick_loop(
    sessions: Arc<SessionManager>,
    mut period: watch::Receiver<Duration>,
) -> TickerHandle {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let current = *period.borrow_and_update();
        let mut timer = tick_timer(current);
        info!(period_ms = current.as_millis() as u64, "Response tick loop started");

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let delivered = sessions.tick_all(Instant::now());
                    if delivered > 0 {
                        debug!(delivered, "Tick delivered playable units");
                    }
                }
                Ok(()) = period.changed() => {
                    let next = *period.borrow_and_update();
                    timer = tick_timer(next);
                    info!(period_ms = next.as_millis() as u64, "Response tick period changed");
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Response tick loop shutting down");
                        break;
                    }
                }
            }
        }
    });

    TickerHandle { shutdown_tx, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::ReassemblyConfig;
    use crate::audio::chunk::RawChunk;
    use crate::audio::playback::ChannelSink;
    use crate::audio::test_support::{pcm16_chunk, tone};

    #[tokio::test]
    async fn test_tick_loop_delivers_units_until_shutdown() {
        let sessions = Arc::new(SessionManager::new(1, ReassemblyConfig::default()));
        let (sink, mut units) = ChannelSink::channel();
        let stream = sessions.create_session(Some("npc".into()), Arc::new(sink)).unwrap();

        stream.enqueue(RawChunk::data(pcm16_chunk(44100, &tone(100)), Some("hey".into())));
        stream.enqueue(RawChunk::end_marker());

        let (_period_tx, period_rx) = watch::channel(Duration::from_millis(5));
        let ticker = spawn_tick_loop(Arc::clone(&sessions), period_rx);
        let unit = tokio::time::timeout(Duration::from_secs(2), units.recv())
            .await
            .expect("tick loop should deliver a unit")
            .unwrap();

        assert!(unit.is_final);
        assert_eq!(unit.transcript.as_deref(), Some("hey"));
        assert_eq!(unit.samples.len(), 100);

        ticker.shutdown().await;
    }

    #[tokio::test]
    async fn test_period_change_retunes_running_loop() {
        let sessions = Arc::new(SessionManager::new(1, ReassemblyConfig::default()));
        let (sink, mut units) = ChannelSink::channel();
        let stream = sessions.create_session(Some("npc".into()), Arc::new(sink)).unwrap();

        // Long enough that nothing past the immediate first tick runs.
        let (period_tx, period_rx) = watch::channel(Duration::from_secs(3600));
        let ticker = spawn_tick_loop(Arc::clone(&sessions), period_rx);
        tokio::time::sleep(Duration::from_millis(20)).await;

        stream.enqueue(RawChunk::end_marker());
        let stalled = tokio::time::timeout(Duration::from_millis(100), units.recv()).await;
        assert!(stalled.is_err());

        period_tx.send_replace(Duration::from_millis(5));
        let unit = tokio::time::timeout(Duration::from_secs(2), units.recv())
            .await
            .expect("retuned loop should tick again")
            .unwrap();
        assert!(unit.is_null());

        ticker.shutdown().await;
    }
}
