//! WebSocket client for the exchange gateway
//!
//! Handles connection, authentication, subscription and trading commands.
//! A background read loop fans inbound frames out to the output queues
//! handed to the caller by [`StreamClient::take_streams`].

use std::sync::{Arc, Mutex as StdMutex};

use futures_util::StreamExt;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::dispatcher::{Dispatcher, Exit};
use super::keepalive::{Keepalive, Pinger};
use super::queues::{output_queues, OutputQueues, Streams};
use super::subscription::{PendingOutcome, SubscriptionRegistry};
use super::writer::FrameWriter;
use crate::config::Config;
use crate::error::{Result, StreamError};
use crate::metrics::StreamMetrics;
use crate::parser::AckKind;
use crate::protocol::{
    request::to_frame, AuthRequest, BulkCancelRequest, CancelOrderRequest, Channel, Granularity,
    NewOrderSingle, Subscription,
};

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Authenticating,
    Ready,
    Stopping,
    Stopped,
}

impl ConnectionState {
    /// Whether requests can be written
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connected | ConnectionState::Authenticating | ConnectionState::Ready
        )
    }
}

/// Background tasks of one connection
struct Session {
    shutdown: CancellationToken,
    read_loop: JoinHandle<()>,
    pinger: Option<JoinHandle<()>>,
}

/// Streaming client multiplexing every channel over one connection
pub struct StreamClient {
    config: Config,
    state: Arc<watch::Sender<ConnectionState>>,
    writer: FrameWriter,
    registry: Arc<SubscriptionRegistry>,
    keepalive: Arc<Keepalive>,
    metrics: StreamMetrics,
    queues: OutputQueues,
    streams: StdMutex<Option<Streams>>,
    session: Mutex<Option<Session>>,
}

impl StreamClient {
    /// Create a new client; nothing is opened until [`StreamClient::start`]
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let (queues, streams) = output_queues(config.queue_capacity);
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Ok(Self {
            config,
            state: Arc::new(state),
            writer: FrameWriter::new(),
            registry: Arc::new(SubscriptionRegistry::new()),
            keepalive: Arc::new(Keepalive::new()),
            metrics: StreamMetrics::new()?,
            queues,
            streams: StdMutex::new(Some(streams)),
            session: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> &StreamMetrics {
        &self.metrics
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Take the consumer ends of the output queues; `None` after the first call
    pub fn take_streams(&self) -> Option<Streams> {
        self.streams.lock().ok().and_then(|mut guard| guard.take())
    }

    /// Open the connection and start the read loop.
    ///
    /// With `authenticate`, the configured secret is sent on the auth channel
    /// and the call waits for its acknowledgement before reporting ready.
    pub async fn start(&self, authenticate: bool) -> Result<()> {
        let token = if authenticate {
            Some(self.config.api_secret.clone().ok_or_else(|| {
                StreamError::Authentication("no API secret configured".to_string())
            })?)
        } else {
            None
        };

        {
            let mut session = self.session.lock().await;
            if let Some(existing) = session.as_ref() {
                if !existing.read_loop.is_finished() {
                    return Err(StreamError::AlreadyStarted);
                }
                // Previous connection died; clear it before reconnecting
                if let Some(old) = session.take() {
                    old.shutdown.cancel();
                    let _ = old.read_loop.await;
                    if let Some(pinger) = old.pinger {
                        let _ = pinger.await;
                    }
                }
            }

            *session = Some(self.connect().await?);
        }

        if let Some(token) = token {
            self.advance(ConnectionState::Connected, ConnectionState::Authenticating);
            if let Err(e) = self.send_auth(&token).await {
                error!(error = %e, "Authentication failed");
                self.stop().await;
                return Err(match e {
                    StreamError::Authentication(_) => e,
                    other => StreamError::Authentication(other.to_string()),
                });
            }
            info!("Authenticated");
        }

        // A concurrent stop or a dead read loop wins over ready
        if self.advance(ConnectionState::Authenticating, ConnectionState::Ready)
            || self.advance(ConnectionState::Connected, ConnectionState::Ready)
        {
            Ok(())
        } else {
            Err(StreamError::NotConnected)
        }
    }

    async fn connect(&self) -> Result<Session> {
        self.set_state(ConnectionState::Connecting);
        info!(url = %self.config.ws_endpoint, "Connecting to gateway");

        let mut request = self
            .config
            .ws_endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| {
                self.set_state(ConnectionState::Disconnected);
                StreamError::Connection(format!("Invalid endpoint: {}", e))
            })?;
        if let Ok(origin) = HeaderValue::from_str(&self.config.origin) {
            request.headers_mut().insert(header::ORIGIN, origin);
        }

        let (ws_stream, response) = connect_async(request).await.map_err(|e| {
            self.set_state(ConnectionState::Disconnected);
            StreamError::Connection(format!("Failed to connect: {}", e))
        })?;
        info!(status = ?response.status(), "WebSocket connected");

        let (sink, read) = ws_stream.split();
        self.writer.install(sink).await;
        self.keepalive.touch();
        self.set_state(ConnectionState::Connected);

        let shutdown = CancellationToken::new();
        let dead = CancellationToken::new();

        let pinger = self.config.keepalive.then(|| {
            tokio::spawn(
                Pinger {
                    keepalive: self.keepalive.clone(),
                    writer: self.writer.clone(),
                    metrics: self.metrics.clone(),
                    ping_interval: self.config.ping_interval(),
                    deadline: self.config.keepalive_timeout(),
                    shutdown: shutdown.clone(),
                    dead: dead.clone(),
                }
                .run(),
            )
        });

        let dispatcher = Dispatcher {
            read,
            queues: self.queues.clone(),
            registry: self.registry.clone(),
            keepalive: self.keepalive.clone(),
            metrics: self.metrics.clone(),
            shutdown: shutdown.clone(),
            dead,
        };

        let session_shutdown = shutdown.clone();
        let state = self.state.clone();
        let writer = self.writer.clone();
        let registry = self.registry.clone();
        let read_loop = tokio::spawn(async move {
            let exit = dispatcher.run().await;
            if exit == Exit::Failed {
                // Stops the pinger; the caller owns reconnection
                session_shutdown.cancel();
                writer.clear().await;
                registry.clear().await;
                state.send_replace(ConnectionState::Disconnected);
            }
            info!(exit = ?exit, "Read loop exited");
        });

        Ok(Session {
            shutdown,
            read_loop,
            pinger,
        })
    }

    async fn send_auth(&self, token: &str) -> Result<()> {
        let frame = to_frame(&AuthRequest::new(token))?;
        self.request(Channel::Auth, AckKind::Subscribe, frame)
            .await
            .map_err(|e| match e {
                StreamError::SubscriptionRejected { reason, .. } => {
                    StreamError::Authentication(reason)
                }
                StreamError::SubscriptionTimeout { .. } => {
                    StreamError::Authentication("timed out waiting for auth response".to_string())
                }
                other => other,
            })
    }

    /// Stop the read loop and close the socket.
    ///
    /// Idempotent. Once this returns no further item is pushed onto any queue.
    pub async fn stop(&self) {
        let Some(session) = self.session.lock().await.take() else {
            return;
        };

        self.set_state(ConnectionState::Stopping);
        session.shutdown.cancel();
        self.writer.close().await;

        if let Err(e) = session.read_loop.await {
            warn!(error = %e, "Read loop task failed");
        }
        if let Some(pinger) = session.pinger {
            let _ = pinger.await;
        }

        self.registry.clear().await;
        self.set_state(ConnectionState::Stopped);
        info!("Client stopped");
    }

    /// Subscribe and wait for the gateway's acknowledgement
    pub async fn subscribe(&self, subscription: Subscription) -> Result<()> {
        let frame = subscription.subscribe_frame()?;
        debug!(subscription = ?subscription, "Subscribing");
        self.request(subscription.channel(), AckKind::Subscribe, frame)
            .await
    }

    /// Unsubscribe and wait for the gateway's acknowledgement
    pub async fn unsubscribe(&self, subscription: Subscription) -> Result<()> {
        let frame = subscription.unsubscribe_frame()?;
        debug!(subscription = ?subscription, "Unsubscribing");
        self.request(subscription.channel(), AckKind::Unsubscribe, frame)
            .await
    }

    pub async fn subscribe_heartbeat(&self) -> Result<()> {
        self.subscribe(Subscription::Heartbeat).await
    }

    pub async fn subscribe_symbols(&self) -> Result<()> {
        self.subscribe(Subscription::Symbols).await
    }

    pub async fn subscribe_l2(&self, symbol: &str) -> Result<()> {
        self.subscribe(Subscription::L2 {
            symbol: symbol.to_string(),
        })
        .await
    }

    pub async fn subscribe_l3(&self, symbol: &str) -> Result<()> {
        self.subscribe(Subscription::L3 {
            symbol: symbol.to_string(),
        })
        .await
    }

    pub async fn subscribe_prices(&self, symbol: &str, granularity: Granularity) -> Result<()> {
        self.subscribe(Subscription::Prices {
            symbol: symbol.to_string(),
            granularity,
        })
        .await
    }

    pub async fn subscribe_ticker(&self, symbol: &str) -> Result<()> {
        self.subscribe(Subscription::Ticker {
            symbol: symbol.to_string(),
        })
        .await
    }

    pub async fn subscribe_trades(&self, symbol: &str) -> Result<()> {
        self.subscribe(Subscription::Trades {
            symbol: symbol.to_string(),
        })
        .await
    }

    pub async fn subscribe_balances(&self) -> Result<()> {
        self.subscribe(Subscription::Balances).await
    }

    pub async fn subscribe_trading(&self) -> Result<()> {
        self.subscribe(Subscription::Trading).await
    }

    /// Authenticate an open connection with the given token
    pub async fn authenticate(&self, token: &str) -> Result<()> {
        self.ensure_open()?;
        self.send_auth(token).await
    }

    /// Send a new order; the outcome arrives on the trading queue
    pub async fn new_order(&self, order: &NewOrderSingle) -> Result<()> {
        self.command(order.to_frame()?).await
    }

    /// Cancel one order; the outcome arrives on the trading queue
    pub async fn cancel_order(&self, order_id: &str) -> Result<()> {
        self.command(to_frame(&CancelOrderRequest::new(order_id))?)
            .await
    }

    /// Cancel all orders, or only those for `symbol`
    pub async fn bulk_cancel(&self, symbol: Option<&str>) -> Result<()> {
        self.command(to_frame(&BulkCancelRequest::new(symbol))?)
            .await
    }

    async fn command(&self, frame: String) -> Result<()> {
        self.ensure_open()?;
        self.writer.send_text(frame).await
    }

    /// Write a request and wait for the matching outcome.
    ///
    /// The request timeout covers the write as well as the wait for the ack.
    async fn request(&self, channel: Channel, kind: AckKind, frame: String) -> Result<()> {
        self.ensure_open()?;

        // Register first so an immediate ack cannot be missed
        let pending = self.registry.register(channel, kind).await;
        let id = pending.id;

        let result = match timeout(self.config.request_timeout(), self.exchange(frame, pending))
            .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    channel = %channel,
                    timeout_ms = self.config.request_timeout_ms,
                    "Timed out waiting for subscription response"
                );
                Err(StreamError::SubscriptionTimeout { channel })
            }
        };
        if result.is_err() {
            self.registry.cancel(channel, kind, id).await;
        }

        let outcome = match &result {
            Ok(()) => "success",
            Err(StreamError::SubscriptionRejected { .. }) => "rejected",
            Err(StreamError::SubscriptionTimeout { .. }) => "timeout",
            Err(_) => "error",
        };
        self.metrics
            .subscription_outcomes
            .with_label_values(&[channel.as_str(), outcome])
            .inc();
        result
    }

    async fn exchange(&self, frame: String, pending: PendingOutcome) -> Result<()> {
        let PendingOutcome {
            channel, kind, rx, ..
        } = pending;

        self.writer.send_text(frame).await?;

        match rx.await {
            Ok(Ok(())) => {
                info!(channel = %channel, kind = ?kind, "Request acknowledged");
                Ok(())
            }
            Ok(Err(reason)) => {
                warn!(channel = %channel, reason = %reason, "Request rejected");
                Err(StreamError::SubscriptionRejected { channel, reason })
            }
            // Registry cleared by stop or a dead connection
            Err(_) => Err(StreamError::NotConnected),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state().is_open() {
            Ok(())
        } else {
            Err(StreamError::NotConnected)
        }
    }

    /// Move from `from` to `to` only if the state is still `from`
    fn advance(&self, from: ConnectionState, to: ConnectionState) -> bool {
        let moved = self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
        if moved {
            debug!(from = ?from, to = ?to, "Connection state changed");
        }
        moved
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "Connection state changed");
        }
    }
}
