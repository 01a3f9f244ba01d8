//! WebSocket module for the gateway connection

mod client;
mod dispatcher;
mod keepalive;
mod queues;
mod subscription;
mod writer;

use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub use client::{ConnectionState, StreamClient};
pub use queues::{Streams, SubscriptionError};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
