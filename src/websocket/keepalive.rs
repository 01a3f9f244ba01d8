//! Keepalive deadline and ping timer
//!
//! The read loop touches the deadline on every pong, gateway `ping` frame,
//! and classified frame. The pinger sends protocol pings and declares the
//! connection dead once the deadline lapses.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::writer::FrameWriter;
use crate::metrics::StreamMetrics;

/// Time of the last liveness signal
#[derive(Debug)]
pub(crate) struct Keepalive {
    origin: Instant,
    last_seen_ms: AtomicU64,
}

impl Keepalive {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_seen_ms: AtomicU64::new(0),
        }
    }

    /// Record a liveness signal
    pub fn touch(&self) {
        let now = self.origin.elapsed().as_millis() as u64;
        self.last_seen_ms.store(now, Ordering::Release);
    }

    /// Time since the last liveness signal
    pub fn idle(&self) -> Duration {
        let now = self.origin.elapsed().as_millis() as u64;
        let last = self.last_seen_ms.load(Ordering::Acquire);
        Duration::from_millis(now.saturating_sub(last))
    }
}

impl Default for Keepalive {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodic pinger for one session
pub(crate) struct Pinger {
    pub keepalive: Arc<Keepalive>,
    pub writer: FrameWriter,
    pub metrics: StreamMetrics,
    pub ping_interval: Duration,
    pub deadline: Duration,
    /// Session shutdown
    pub shutdown: CancellationToken,
    /// Cancelled by the pinger when the deadline lapses
    pub dead: CancellationToken,
}

impl Pinger {
    pub async fn run(self) {
        let mut ticker = interval(self.ping_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let idle = self.keepalive.idle();
            if idle > self.deadline {
                warn!(
                    idle_ms = idle.as_millis() as u64,
                    deadline_ms = self.deadline.as_millis() as u64,
                    "Keepalive deadline missed, closing connection"
                );
                self.metrics.keepalive_expired.inc();
                self.dead.cancel();
                self.writer.close().await;
                return;
            }

            match self.writer.send(Message::Ping(Vec::new())).await {
                Ok(()) => {
                    debug!("Sent keepalive ping");
                    self.metrics.pings_sent.inc();
                }
                Err(e) => {
                    // The read loop reports the broken transport
                    warn!(error = %e, "Failed to send keepalive ping");
                    return;
                }
            }
        }
    }
}
