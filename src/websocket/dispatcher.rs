//! Read loop
//!
//! Owns the receive half of the socket. Exactly one read is outstanding at a
//! time; each frame is classified and either resolves a subscription waiter
//! or is pushed onto its output queue before the next read is issued.

use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::keepalive::Keepalive;
use super::queues::{OutputQueues, SubscriptionError};
use super::subscription::SubscriptionRegistry;
use crate::error::StreamError;
use crate::metrics::StreamMetrics;
use crate::parser::{classify, Classified, StreamMessage};

/// Why the read loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Stop was requested
    Stopped,
    /// Transport failure, already reported on the error queue
    Failed,
}

pub(crate) struct Dispatcher<S> {
    pub read: S,
    pub queues: OutputQueues,
    pub registry: Arc<SubscriptionRegistry>,
    pub keepalive: Arc<Keepalive>,
    pub metrics: StreamMetrics,
    pub shutdown: CancellationToken,
    pub dead: CancellationToken,
}

impl<S> Dispatcher<S>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    pub async fn run(mut self) -> Exit {
        info!("Read loop started");

        loop {
            let frame = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    debug!("Read loop observed stop");
                    return Exit::Stopped;
                }
                _ = self.dead.cancelled() => {
                    return self.fail(self.keepalive_error()).await;
                }
                frame = self.read.next() => frame,
            };

            let keep_running = match frame {
                Some(Ok(Message::Text(text))) => self.handle_text(&text).await,
                Some(Ok(Message::Binary(data))) => {
                    let text = String::from_utf8_lossy(&data).to_string();
                    self.handle_text(&text).await
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    trace!("Received control frame");
                    self.keepalive.touch();
                    true
                }
                Some(Ok(Message::Close(frame))) => {
                    if self.shutdown.is_cancelled() {
                        return Exit::Stopped;
                    }
                    warn!(frame = ?frame, "Received close frame");
                    let cause = format!("closed by gateway: {:?}", frame);
                    return self.fail(self.terminal_error(cause)).await;
                }
                Some(Ok(Message::Frame(_))) => true,
                Some(Err(e)) => {
                    if self.shutdown.is_cancelled() {
                        return Exit::Stopped;
                    }
                    error!(error = %e, "WebSocket read error");
                    let cause = format!("read failed: {}", e);
                    return self.fail(self.terminal_error(cause)).await;
                }
                None => {
                    if self.shutdown.is_cancelled() {
                        return Exit::Stopped;
                    }
                    warn!("WebSocket stream ended");
                    return self
                        .fail(self.terminal_error("stream ended".to_string()))
                        .await;
                }
            };

            if !keep_running {
                return Exit::Stopped;
            }
        }
    }

    /// Classify and route one frame; false once stop is observed mid-push
    async fn handle_text(&self, text: &str) -> bool {
        self.metrics.frames_received.inc();

        let classified = match classify(text) {
            Ok(classified) => classified,
            Err(e) => {
                self.metrics.decode_errors.inc();
                warn!(error = %e, len = text.len(), "Dropping undecodable frame");
                return self.report(e).await;
            }
        };

        let keep_running = match classified {
            Classified::Ping => {
                debug!("Received gateway ping");
                true
            }
            Classified::Ack { channel, kind } => {
                if !self.registry.resolve(channel, kind, Ok(())).await {
                    debug!(channel = %channel, kind = ?kind, "Acknowledgement with no waiter");
                }
                true
            }
            Classified::Rejected { channel, reason } => {
                if self.registry.reject(channel, &reason).await {
                    true
                } else {
                    warn!(channel = %channel, reason = %reason, "Rejection with no waiter");
                    self.deliver_subscription_error(SubscriptionError { channel, reason })
                        .await
                }
            }
            Classified::Messages(messages) => {
                let mut keep_running = true;
                for message in messages {
                    if !self.deliver(message).await {
                        keep_running = false;
                        break;
                    }
                }
                keep_running
            }
            Classified::Ignored { channel, event } => {
                trace!(channel = %channel, event = %event, "Ignoring frame");
                true
            }
        };

        self.keepalive.touch();
        keep_running
    }

    async fn deliver(&self, message: StreamMessage) -> bool {
        let channel = message.channel();
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => false,
            delivered = self.queues.push(message) => {
                if delivered {
                    self.metrics
                        .messages_delivered
                        .with_label_values(&[channel.as_str()])
                        .inc();
                } else {
                    trace!(channel = %channel, "Consumer dropped, discarding message");
                }
                true
            }
        }
    }

    async fn deliver_subscription_error(&self, error: SubscriptionError) -> bool {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => false,
            _ = self.queues.push_subscription_error(error) => true,
        }
    }

    async fn report(&self, error: StreamError) -> bool {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => false,
            _ = self.queues.push_error(error) => true,
        }
    }

    async fn fail(&self, error: StreamError) -> Exit {
        error!(error = %error, "Read loop terminated");
        self.report(error).await;
        Exit::Failed
    }

    fn keepalive_error(&self) -> StreamError {
        StreamError::KeepaliveTimeout {
            elapsed_ms: self.keepalive.idle().as_millis() as u64,
        }
    }

    fn terminal_error(&self, cause: String) -> StreamError {
        if self.dead.is_cancelled() {
            self.keepalive_error()
        } else {
            StreamError::Transport(cause)
        }
    }
}
