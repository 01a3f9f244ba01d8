//! Streaming client for the Blockchain.com Exchange gateway
//!
//! This crate multiplexes every public and private channel over a single
//! WebSocket connection, correlates subscription acknowledgements with the
//! calls that requested them, and fans decoded payloads out to one bounded
//! queue per channel.

pub mod config;
pub mod error;
pub mod metrics;
pub mod parser;
pub mod protocol;
pub mod websocket;

pub use config::{Config, Environment};
pub use error::{Result, StreamError};
pub use metrics::StreamMetrics;
pub use parser::{classify, Classified, StreamMessage};
pub use protocol::{Channel, Event, Granularity, NewOrderSingle, Subscription};
pub use websocket::{ConnectionState, StreamClient, Streams, SubscriptionError};
