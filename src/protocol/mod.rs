//! Gateway wire vocabulary
//!
//! Channel and event names, trading enums, and the request/payload shapes
//! exchanged with the Blockchain.com Exchange WebSocket gateway.

pub mod payload;
pub mod request;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use payload::{
    Balance, Balances, Candle, ExecutionReport, Heartbeat, OrderBook, PriceUpdate, QuoteLevel,
    RejectReason, SymbolRecord, SymbolsSnapshot, Ticker, TradeUpdate, TradingMessage,
    TradingReject, TradingSnapshot,
};
pub use request::{
    AuthRequest, BulkCancelRequest, CancelOrderRequest, NewOrderRequest, NewOrderSingle,
    Subscription,
};

/// Production gateway endpoint
pub const WS_ENDPOINT: &str = "wss://ws.blockchain.info/mercury-gateway/v1/ws";
/// Staging gateway endpoint
pub const WS_STAGING_ENDPOINT: &str = "wss://ws.staging.blockchain.info/mercury-gateway/v1/ws";
/// Origin header the gateway expects on the handshake
pub const DEFAULT_ORIGIN: &str = "https://exchange.blockchain.com";
/// Application-level keepalive frame pushed by the gateway
pub const PING_SENTINEL: &str = "ping";

/// Logical stream multiplexed over the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Heartbeat,
    Symbols,
    L2,
    L3,
    Prices,
    Ticker,
    Trades,
    Balances,
    Trading,
    Auth,
}

impl Channel {
    pub const ALL: [Channel; 10] = [
        Channel::Heartbeat,
        Channel::Symbols,
        Channel::L2,
        Channel::L3,
        Channel::Prices,
        Channel::Ticker,
        Channel::Trades,
        Channel::Balances,
        Channel::Trading,
        Channel::Auth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Heartbeat => "heartbeat",
            Channel::Symbols => "symbols",
            Channel::L2 => "l2",
            Channel::L3 => "l3",
            Channel::Prices => "prices",
            Channel::Ticker => "ticker",
            Channel::Trades => "trades",
            Channel::Balances => "balances",
            Channel::Trading => "trading",
            Channel::Auth => "auth",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event kind carried by every inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Event {
    Subscribed,
    Rejected,
    Snapshot,
    Updated,
    Unsubscribed,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Event::Subscribed => "subscribed",
            Event::Rejected => "rejected",
            Event::Snapshot => "snapshot",
            Event::Updated => "updated",
            Event::Unsubscribed => "unsubscribed",
        };
        f.write_str(name)
    }
}

/// Candle width in seconds for the prices channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
    OneHour,
    SixHours,
    OneDay,
}

impl Granularity {
    pub fn seconds(&self) -> u32 {
        match self {
            Granularity::OneMinute => 60,
            Granularity::FiveMinutes => 300,
            Granularity::FifteenMinutes => 900,
            Granularity::OneHour => 3600,
            Granularity::SixHours => 21600,
            Granularity::OneDay => 86400,
        }
    }

    pub fn from_seconds(seconds: u32) -> Option<Self> {
        match seconds {
            60 => Some(Granularity::OneMinute),
            300 => Some(Granularity::FiveMinutes),
            900 => Some(Granularity::FifteenMinutes),
            3600 => Some(Granularity::OneHour),
            21600 => Some(Granularity::SixHours),
            86400 => Some(Granularity::OneDay),
            _ => None,
        }
    }
}

impl Serialize for Granularity {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.seconds())
    }
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrdType {
    #[serde(rename = "limit")]
    Limit,
    #[serde(rename = "market")]
    Market,
    #[serde(rename = "stop")]
    Stop,
    #[serde(rename = "stopLimit")]
    StopLimit,
}

/// Time in force
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Rests until cancelled or filled
    #[serde(rename = "GTC")]
    GoodTillCancel,
    /// Rests until cancelled, filled or expired
    #[serde(rename = "GTD")]
    GoodTillDate,
    /// Completely filled or cancelled, no partial fills
    #[serde(rename = "FOK")]
    FillOrKill,
    /// Fills what it can, remainder cancelled
    #[serde(rename = "IOC")]
    ImmediateOrCancel,
}

/// Execution instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecInst {
    /// Add liquidity only
    #[serde(rename = "ALO")]
    AddLiquidityOnly,
}

/// Order status on execution reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrdStatus {
    Pending,
    Open,
    Rejected,
    Cancelled,
    Filled,
    Partial,
    Expired,
}

/// FIX execution type code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecType {
    #[serde(rename = "0")]
    New,
    #[serde(rename = "4")]
    Cancelled,
    #[serde(rename = "C")]
    Expired,
    #[serde(rename = "8")]
    Rejected,
    #[serde(rename = "F")]
    PartialFill,
    #[serde(rename = "A")]
    Pending,
    #[serde(rename = "H")]
    TradeBreak,
    #[serde(rename = "I")]
    OrderStatus,
}

/// FIX message type code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MsgType {
    #[serde(rename = "8")]
    ExecutionReport,
    #[serde(rename = "9")]
    OrderCancelRejected,
}
