//! Write half of the connection
//!
//! The transport forbids concurrent frame writes, so pings, subscription
//! requests and trading commands all go through one lock. Closing aborts any
//! write in flight, so a peer that stopped reading cannot hold the lock.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::WsStream;
use crate::error::{Result, StreamError};

type WsSink = SplitSink<WsStream, Message>;

/// Upper bound for taking the sink and for the close handshake write
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Clone, Default)]
pub(crate) struct FrameWriter {
    sink: Arc<Mutex<Option<WsSink>>>,
    /// Cancelled when the current sink is closed or cleared
    abort: Arc<StdMutex<CancellationToken>>,
}

impl FrameWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn install(&self, sink: WsSink) {
        let mut guard = self.sink.lock().await;
        match self.abort.lock() {
            Ok(mut abort) => *abort = CancellationToken::new(),
            Err(poisoned) => *poisoned.into_inner() = CancellationToken::new(),
        }
        *guard = Some(sink);
    }

    /// Write one frame; gives up with `NotConnected` once the sink is closed
    pub async fn send(&self, message: Message) -> Result<()> {
        let abort = self.abort_token();
        tokio::select! {
            biased;
            _ = abort.cancelled() => Err(StreamError::NotConnected),
            result = self.write(message) => result,
        }
    }

    async fn write(&self, message: Message) -> Result<()> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(StreamError::NotConnected)?;
        sink.send(message)
            .await
            .map_err(|e| StreamError::Transport(format!("write failed: {}", e)))
    }

    pub async fn send_text(&self, text: String) -> Result<()> {
        debug!(len = text.len(), "Sending text frame");
        self.send(Message::Text(text)).await
    }

    /// Send a close frame and drop the sink; a no-op when already closed
    pub async fn close(&self) {
        let Some(mut sink) = self.take().await else {
            return;
        };
        match timeout(CLOSE_TIMEOUT, sink.close()).await {
            Ok(Ok(())) => debug!("WebSocket write half closed"),
            Ok(Err(e)) => debug!(error = %e, "Close frame not delivered"),
            Err(_) => warn!("Timed out closing WebSocket write half"),
        }
    }

    /// Drop the sink without a close handshake
    pub async fn clear(&self) {
        self.take().await;
    }

    /// Abort the write in flight, then take the sink out of the lock
    async fn take(&self) -> Option<WsSink> {
        self.abort_token().cancel();
        match timeout(CLOSE_TIMEOUT, self.sink.lock()).await {
            Ok(mut guard) => guard.take(),
            Err(_) => {
                warn!("Timed out waiting for the write lock");
                None
            }
        }
    }

    fn abort_token(&self) -> CancellationToken {
        match self.abort.lock() {
            Ok(abort) => abort.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
