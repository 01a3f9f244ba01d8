//! Inbound payload records
//!
//! Only the fields needed by consumers are modelled; unknown fields are
//! ignored so gateway additions do not break decoding.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;

use super::{Event, ExecType, MsgType, OrdStatus, OrdType, Side, TimeInForce};

/// Heartbeat channel update
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Heartbeat {
    #[serde(default)]
    pub seqnum: u64,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// One order book entry
///
/// `num` is the order count for L2 levels; `id` is the order id for L3.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuoteLevel {
    pub px: Decimal,
    pub qty: Decimal,
    #[serde(default)]
    pub num: Option<u64>,
    #[serde(default)]
    pub id: Option<String>,
}

/// L2 or L3 book snapshot/update
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrderBook {
    #[serde(default)]
    pub seqnum: u64,
    pub event: Event,
    pub symbol: String,
    #[serde(default)]
    pub bids: Vec<QuoteLevel>,
    #[serde(default)]
    pub asks: Vec<QuoteLevel>,
}

impl OrderBook {
    pub fn is_snapshot(&self) -> bool {
        self.event == Event::Snapshot
    }
}

/// OHLCV candle, sent on the wire as `[timestamp_ms, open, high, low, close, volume]`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "(i64, Decimal, Decimal, Decimal, Decimal, Decimal)")]
pub struct Candle {
    pub timestamp_ms: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl From<(i64, Decimal, Decimal, Decimal, Decimal, Decimal)> for Candle {
    fn from(raw: (i64, Decimal, Decimal, Decimal, Decimal, Decimal)) -> Self {
        let (timestamp_ms, open, high, low, close, volume) = raw;
        Self {
            timestamp_ms,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// Prices channel candle
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PriceUpdate {
    #[serde(default)]
    pub seqnum: u64,
    pub event: Event,
    pub symbol: String,
    pub price: Candle,
}

/// 24h ticker statistics
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Ticker {
    #[serde(default)]
    pub seqnum: u64,
    pub event: Event,
    pub symbol: String,
    #[serde(default)]
    pub price_24h: Option<Decimal>,
    #[serde(default)]
    pub volume_24h: Option<Decimal>,
    #[serde(default)]
    pub last_trade_price: Option<Decimal>,
}

/// Public trade print
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TradeUpdate {
    #[serde(default)]
    pub seqnum: u64,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub side: Side,
    pub qty: Decimal,
    pub price: Decimal,
    pub trade_id: String,
}

/// Instrument reference data
///
/// Snapshot entries are keyed by name on the wire; `name` is filled from the
/// key. Updates carry the name in `symbol`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct SymbolRecord {
    #[serde(rename = "symbol")]
    pub name: String,
    pub seqnum: u64,
    pub base_currency: String,
    pub base_currency_scale: i32,
    pub counter_currency: String,
    pub counter_currency_scale: i32,
    /// Price must be a multiple of `min_price_increment * 10^-min_price_increment_scale`
    pub min_price_increment: i64,
    pub min_price_increment_scale: i32,
    pub min_order_size: i64,
    pub min_order_size_scale: i32,
    /// Zero means unlimited
    pub max_order_size: i64,
    pub max_order_size_scale: i32,
    pub lot_size: i64,
    pub lot_size_scale: i32,
    /// open, close, suspend, halt, halt-freeze
    pub status: String,
    pub id: i64,
    pub auction_price: Option<Decimal>,
    pub auction_size: Option<Decimal>,
    /// HHMM
    pub auction_time: Option<String>,
    pub imbalance: Option<Decimal>,
}

/// Symbols channel snapshot, one entry per instrument
#[derive(Debug, Clone, Deserialize)]
pub struct SymbolsSnapshot {
    #[serde(default)]
    pub seqnum: u64,
    pub symbols: BTreeMap<String, SymbolRecord>,
}

impl SymbolsSnapshot {
    /// Unpack into per-instrument records tagged with their name
    pub fn into_records(self) -> Vec<SymbolRecord> {
        let seqnum = self.seqnum;
        self.symbols
            .into_iter()
            .map(|(name, mut record)| {
                record.name = name;
                record.seqnum = seqnum;
                record
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Balance {
    pub currency: String,
    pub balance: Decimal,
    pub available: Decimal,
    pub balance_local: Decimal,
    pub available_local: Decimal,
    pub rate: Decimal,
}

/// Account balances
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Balances {
    #[serde(default)]
    pub seqnum: u64,
    pub event: Event,
    #[serde(default)]
    pub balances: Vec<Balance>,
    #[serde(default)]
    pub total_available_local: Option<Decimal>,
    #[serde(default)]
    pub total_balance_local: Option<Decimal>,
}

/// Order state as reported on the trading channel
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct ExecutionReport {
    pub seqnum: u64,
    #[serde(rename = "orderID")]
    pub order_id: Option<String>,
    #[serde(rename = "clOrdID")]
    pub cl_ord_id: Option<String>,
    pub symbol: Option<String>,
    pub side: Option<Side>,
    #[serde(rename = "ordType")]
    pub ord_type: Option<OrdType>,
    #[serde(rename = "orderQty")]
    pub order_qty: Option<Decimal>,
    #[serde(rename = "leavesQty")]
    pub leaves_qty: Option<Decimal>,
    #[serde(rename = "cumQty")]
    pub cum_qty: Option<Decimal>,
    #[serde(rename = "avgPx")]
    pub avg_px: Option<Decimal>,
    #[serde(rename = "ordStatus")]
    pub ord_status: Option<OrdStatus>,
    #[serde(rename = "timeInForce")]
    pub time_in_force: Option<TimeInForce>,
    pub text: Option<String>,
    #[serde(rename = "execType")]
    pub exec_type: Option<ExecType>,
    #[serde(rename = "execID")]
    pub exec_id: Option<String>,
    #[serde(rename = "transactTime")]
    pub transact_time: Option<String>,
    #[serde(rename = "msgType")]
    pub msg_type: Option<MsgType>,
    #[serde(rename = "lastPx")]
    pub last_px: Option<Decimal>,
    #[serde(rename = "lastShares")]
    pub last_shares: Option<Decimal>,
    #[serde(rename = "tradeId")]
    pub trade_id: Option<String>,
    pub price: Option<Decimal>,
    #[serde(rename = "stopPx")]
    pub stop_px: Option<Decimal>,
}

/// Open orders at trading subscription time
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TradingSnapshot {
    #[serde(default)]
    pub seqnum: u64,
    #[serde(default)]
    pub orders: Vec<ExecutionReport>,
}

/// Rejection of a trading command or of the trading subscription
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TradingReject {
    #[serde(default)]
    pub seqnum: u64,
    #[serde(default)]
    pub text: String,
    #[serde(rename = "clOrdID", default)]
    pub cl_ord_id: Option<String>,
    #[serde(rename = "orderID", default)]
    pub order_id: Option<String>,
}

/// Reason attached to a non-trading rejection
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RejectReason {
    #[serde(default)]
    pub text: Option<String>,
}

/// Anything delivered on the trading queue
#[derive(Debug, Clone, PartialEq)]
pub enum TradingMessage {
    Snapshot(TradingSnapshot),
    Update(ExecutionReport),
    Reject(TradingReject),
}

impl TradingMessage {
    pub fn is_snapshot(&self) -> bool {
        matches!(self, TradingMessage::Snapshot(_))
    }

    pub fn is_update(&self) -> bool {
        matches!(self, TradingMessage::Update(_))
    }

    pub fn is_reject(&self) -> bool {
        matches!(self, TradingMessage::Reject(_))
    }

    pub fn seqnum(&self) -> u64 {
        match self {
            TradingMessage::Snapshot(s) => s.seqnum,
            TradingMessage::Update(u) => u.seqnum,
            TradingMessage::Reject(r) => r.seqnum,
        }
    }
}
