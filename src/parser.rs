//! Parser module for gateway frames
//!
//! Every frame is first decoded into an [`Envelope`]; the `(event, channel)`
//! pair then selects a [`Route`], which either resolves a subscription
//! waiter or decodes the channel payload for delivery.

use serde::Deserialize;

use crate::error::{Result, StreamError};
use crate::protocol::{
    Balances, Channel, Event, ExecutionReport, Heartbeat, OrderBook, PriceUpdate, RejectReason,
    SymbolRecord, SymbolsSnapshot, Ticker, TradeUpdate, TradingMessage, TradingReject,
    TradingSnapshot, PING_SENTINEL,
};

/// Common shape of every inbound frame
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Envelope {
    pub channel: Channel,
    pub event: Event,
    #[serde(default)]
    pub seqnum: Option<u64>,
}

impl Envelope {
    pub fn decode(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| StreamError::Decode(format!("envelope: {}", e)))
    }
}

/// Decoded payload bound for one of the output queues
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    Heartbeat(Heartbeat),
    Symbol(SymbolRecord),
    L2(OrderBook),
    L3(OrderBook),
    Prices(PriceUpdate),
    Ticker(Ticker),
    Trade(TradeUpdate),
    Balances(Balances),
    Trading(TradingMessage),
}

impl StreamMessage {
    pub fn channel(&self) -> Channel {
        match self {
            StreamMessage::Heartbeat(_) => Channel::Heartbeat,
            StreamMessage::Symbol(_) => Channel::Symbols,
            StreamMessage::L2(_) => Channel::L2,
            StreamMessage::L3(_) => Channel::L3,
            StreamMessage::Prices(_) => Channel::Prices,
            StreamMessage::Ticker(_) => Channel::Ticker,
            StreamMessage::Trade(_) => Channel::Trades,
            StreamMessage::Balances(_) => Channel::Balances,
            StreamMessage::Trading(_) => Channel::Trading,
        }
    }
}

/// Which acknowledgement a waiter is expecting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AckKind {
    Subscribe,
    Unsubscribe,
}

/// Payload decoder selected by the routing table
pub type DecodeFn = fn(&str) -> serde_json::Result<Vec<StreamMessage>>;

/// What to do with a frame once its envelope is known
#[derive(Clone, Copy)]
pub enum Route {
    /// Resolve the pending waiter for the channel as success
    Acknowledge(AckKind),
    /// Resolve the pending waiter for the channel as failure
    Reject,
    /// Decode and push onto the channel queue
    Deliver(DecodeFn),
    /// Valid frame with nothing to deliver
    Ignore,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Route::Acknowledge(kind) => write!(f, "Acknowledge({:?})", kind),
            Route::Reject => f.write_str("Reject"),
            Route::Deliver(_) => f.write_str("Deliver"),
            Route::Ignore => f.write_str("Ignore"),
        }
    }
}

/// Routing table over `(event, channel)`
pub fn route(event: Event, channel: Channel) -> Route {
    match event {
        Event::Subscribed => Route::Acknowledge(AckKind::Subscribe),
        Event::Unsubscribed => Route::Acknowledge(AckKind::Unsubscribe),
        // Trading rejects can follow order commands, so they go to the data consumer
        Event::Rejected => match channel {
            Channel::Trading => Route::Deliver(decode_trading_reject),
            _ => Route::Reject,
        },
        Event::Snapshot => match channel {
            Channel::Heartbeat => Route::Deliver(decode_heartbeat),
            Channel::Symbols => Route::Deliver(decode_symbols_snapshot),
            Channel::L2 => Route::Deliver(decode_l2),
            Channel::L3 => Route::Deliver(decode_l3),
            Channel::Prices => Route::Deliver(decode_prices),
            Channel::Ticker => Route::Deliver(decode_ticker),
            Channel::Trades => Route::Deliver(decode_trade),
            Channel::Balances => Route::Deliver(decode_balances),
            Channel::Trading => Route::Deliver(decode_trading_snapshot),
            Channel::Auth => Route::Ignore,
        },
        Event::Updated => match channel {
            Channel::Heartbeat => Route::Deliver(decode_heartbeat),
            Channel::Symbols => Route::Deliver(decode_symbol_update),
            Channel::L2 => Route::Deliver(decode_l2),
            Channel::L3 => Route::Deliver(decode_l3),
            Channel::Prices => Route::Deliver(decode_prices),
            Channel::Ticker => Route::Deliver(decode_ticker),
            Channel::Trades => Route::Deliver(decode_trade),
            Channel::Balances => Route::Deliver(decode_balances),
            Channel::Trading => Route::Deliver(decode_execution_report),
            Channel::Auth => Route::Ignore,
        },
    }
}

/// Result of classifying one frame
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    /// Application-level keepalive
    Ping,
    Ack {
        channel: Channel,
        kind: AckKind,
    },
    Rejected {
        channel: Channel,
        reason: String,
    },
    Messages(Vec<StreamMessage>),
    Ignored {
        channel: Channel,
        event: Event,
    },
}

/// Decode and classify a raw text frame
pub fn classify(raw: &str) -> Result<Classified> {
    if raw.trim() == PING_SENTINEL {
        return Ok(Classified::Ping);
    }

    let envelope = Envelope::decode(raw)?;

    match route(envelope.event, envelope.channel) {
        Route::Acknowledge(kind) => Ok(Classified::Ack {
            channel: envelope.channel,
            kind,
        }),
        Route::Reject => {
            let reason: RejectReason = serde_json::from_str(raw).map_err(|e| {
                StreamError::Decode(format!("{} reject: {}", envelope.channel, e))
            })?;
            Ok(Classified::Rejected {
                channel: envelope.channel,
                reason: reason.text.unwrap_or_else(|| "rejected".to_string()),
            })
        }
        Route::Deliver(decode) => decode(raw).map(Classified::Messages).map_err(|e| {
            StreamError::Decode(format!(
                "{} {}: {}",
                envelope.channel, envelope.event, e
            ))
        }),
        Route::Ignore => Ok(Classified::Ignored {
            channel: envelope.channel,
            event: envelope.event,
        }),
    }
}

fn decode_heartbeat(raw: &str) -> serde_json::Result<Vec<StreamMessage>> {
    Ok(vec![StreamMessage::Heartbeat(serde_json::from_str(raw)?)])
}

fn decode_symbols_snapshot(raw: &str) -> serde_json::Result<Vec<StreamMessage>> {
    let snapshot: SymbolsSnapshot = serde_json::from_str(raw)?;
    Ok(snapshot
        .into_records()
        .into_iter()
        .map(StreamMessage::Symbol)
        .collect())
}

fn decode_symbol_update(raw: &str) -> serde_json::Result<Vec<StreamMessage>> {
    Ok(vec![StreamMessage::Symbol(serde_json::from_str(raw)?)])
}

fn decode_l2(raw: &str) -> serde_json::Result<Vec<StreamMessage>> {
    Ok(vec![StreamMessage::L2(serde_json::from_str(raw)?)])
}

fn decode_l3(raw: &str) -> serde_json::Result<Vec<StreamMessage>> {
    Ok(vec![StreamMessage::L3(serde_json::from_str(raw)?)])
}

fn decode_prices(raw: &str) -> serde_json::Result<Vec<StreamMessage>> {
    Ok(vec![StreamMessage::Prices(serde_json::from_str(raw)?)])
}

fn decode_ticker(raw: &str) -> serde_json::Result<Vec<StreamMessage>> {
    Ok(vec![StreamMessage::Ticker(serde_json::from_str(raw)?)])
}

fn decode_trade(raw: &str) -> serde_json::Result<Vec<StreamMessage>> {
    Ok(vec![StreamMessage::Trade(serde_json::from_str(raw)?)])
}

fn decode_balances(raw: &str) -> serde_json::Result<Vec<StreamMessage>> {
    Ok(vec![StreamMessage::Balances(serde_json::from_str(raw)?)])
}

fn decode_trading_snapshot(raw: &str) -> serde_json::Result<Vec<StreamMessage>> {
    let snapshot: TradingSnapshot = serde_json::from_str(raw)?;
    Ok(vec![StreamMessage::Trading(TradingMessage::Snapshot(snapshot))])
}

fn decode_execution_report(raw: &str) -> serde_json::Result<Vec<StreamMessage>> {
    let report: ExecutionReport = serde_json::from_str(raw)?;
    Ok(vec![StreamMessage::Trading(TradingMessage::Update(report))])
}

fn decode_trading_reject(raw: &str) -> serde_json::Result<Vec<StreamMessage>> {
    let reject: TradingReject = serde_json::from_str(raw)?;
    Ok(vec![StreamMessage::Trading(TradingMessage::Reject(reject))])
}
