//! Pending subscription outcomes
//!
//! Each subscribe/unsubscribe call registers a one-shot slot keyed by
//! channel before its request is written. The read loop fulfils the oldest
//! live slot for the channel when the matching ack or reject arrives.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{oneshot, Mutex};
use tracing::{debug, trace};

use crate::parser::AckKind;
use crate::protocol::Channel;

/// Success, or the gateway's rejection reason
pub(crate) type Outcome = std::result::Result<(), String>;

struct Waiter {
    id: u64,
    tx: oneshot::Sender<Outcome>,
}

/// Handle held by the waiting caller
pub(crate) struct PendingOutcome {
    pub id: u64,
    pub channel: Channel,
    pub kind: AckKind,
    pub rx: oneshot::Receiver<Outcome>,
}

#[derive(Default)]
pub(crate) struct SubscriptionRegistry {
    next_id: AtomicU64,
    pending: Mutex<HashMap<(Channel, AckKind), VecDeque<Waiter>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, channel: Channel, kind: AckKind) -> PendingOutcome {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .await
            .entry((channel, kind))
            .or_default()
            .push_back(Waiter { id, tx });
        trace!(channel = %channel, kind = ?kind, id, "Registered subscription waiter");
        PendingOutcome {
            id,
            channel,
            kind,
            rx,
        }
    }

    /// Fulfil the oldest live waiter; returns false when nobody was waiting
    pub async fn resolve(&self, channel: Channel, kind: AckKind, outcome: Outcome) -> bool {
        let mut pending = self.pending.lock().await;
        let Some(queue) = pending.get_mut(&(channel, kind)) else {
            return false;
        };

        let mut outcome = outcome;
        let mut delivered = false;
        while let Some(waiter) = queue.pop_front() {
            match waiter.tx.send(outcome) {
                Ok(()) => {
                    delivered = true;
                    break;
                }
                // Caller went away, try the next one
                Err(returned) => {
                    debug!(channel = %channel, id = waiter.id, "Discarding outcome for abandoned waiter");
                    outcome = returned;
                }
            }
        }

        if queue.is_empty() {
            pending.remove(&(channel, kind));
        }
        delivered
    }

    /// Fail the oldest subscribe waiter for the channel, falling back to an
    /// unsubscribe waiter
    pub async fn reject(&self, channel: Channel, reason: &str) -> bool {
        if self
            .resolve(channel, AckKind::Subscribe, Err(reason.to_string()))
            .await
        {
            return true;
        }
        self.resolve(channel, AckKind::Unsubscribe, Err(reason.to_string()))
            .await
    }

    /// Forget a waiter that gave up; a later ack finds nobody
    pub async fn cancel(&self, channel: Channel, kind: AckKind, id: u64) {
        let mut pending = self.pending.lock().await;
        if let Some(queue) = pending.get_mut(&(channel, kind)) {
            queue.retain(|waiter| waiter.id != id);
            if queue.is_empty() {
                pending.remove(&(channel, kind));
            }
        }
    }

    /// Drop every waiter; their receivers observe a closed slot
    pub async fn clear(&self) {
        self.pending.lock().await.clear();
    }
}
