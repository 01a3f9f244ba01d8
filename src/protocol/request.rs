//! Outbound request shapes
//!
//! Every request is a single JSON object with an `action` and a `channel`;
//! subscription requests add the channel parameters, trading commands add
//! the order fields.

use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

use super::{Channel, ExecInst, Granularity, OrdType, Side, TimeInForce};
use crate::error::{Result, StreamError};

const ACTION_SUBSCRIBE: &str = "subscribe";
const ACTION_UNSUBSCRIBE: &str = "unsubscribe";
const ACTION_NEW_ORDER: &str = "NewOrderSingle";
const ACTION_CANCEL_ORDER: &str = "CancelOrderRequest";
const ACTION_BULK_CANCEL: &str = "BulkCancelOrderRequest";

/// A channel subscription together with its parameters
#[derive(Clone, PartialEq, Eq)]
pub enum Subscription {
    Heartbeat,
    Symbols,
    L2 { symbol: String },
    L3 { symbol: String },
    Prices { symbol: String, granularity: Granularity },
    Ticker { symbol: String },
    Trades { symbol: String },
    Balances,
    Trading,
    Auth { token: String },
}

impl Subscription {
    pub fn channel(&self) -> Channel {
        match self {
            Subscription::Heartbeat => Channel::Heartbeat,
            Subscription::Symbols => Channel::Symbols,
            Subscription::L2 { .. } => Channel::L2,
            Subscription::L3 { .. } => Channel::L3,
            Subscription::Prices { .. } => Channel::Prices,
            Subscription::Ticker { .. } => Channel::Ticker,
            Subscription::Trades { .. } => Channel::Trades,
            Subscription::Balances => Channel::Balances,
            Subscription::Trading => Channel::Trading,
            Subscription::Auth { .. } => Channel::Auth,
        }
    }

    pub fn symbol(&self) -> Option<&str> {
        match self {
            Subscription::L2 { symbol }
            | Subscription::L3 { symbol }
            | Subscription::Prices { symbol, .. }
            | Subscription::Ticker { symbol }
            | Subscription::Trades { symbol } => Some(symbol),
            _ => None,
        }
    }

    /// Serialize the `subscribe` request for this channel
    pub fn subscribe_frame(&self) -> Result<String> {
        self.encode(ACTION_SUBSCRIBE)
    }

    /// Serialize the `unsubscribe` request for this channel
    pub fn unsubscribe_frame(&self) -> Result<String> {
        self.encode(ACTION_UNSUBSCRIBE)
    }

    fn encode(&self, action: &'static str) -> Result<String> {
        let frame = SubscriptionFrame {
            action,
            channel: self.channel(),
            symbol: self.symbol(),
            granularity: match self {
                Subscription::Prices { granularity, .. } => Some(*granularity),
                _ => None,
            },
            token: match self {
                Subscription::Auth { token } => Some(token.as_str()),
                _ => None,
            },
        };
        to_frame(&frame)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Never print the token
            Subscription::Auth { .. } => f.write_str("Auth { token: \"***\" }"),
            Subscription::Prices {
                symbol,
                granularity,
            } => f
                .debug_struct("Prices")
                .field("symbol", symbol)
                .field("granularity", &granularity.seconds())
                .finish(),
            other => match other.symbol() {
                Some(symbol) => write!(f, "{:?} {{ symbol: {:?} }}", other.channel(), symbol),
                None => write!(f, "{:?}", other.channel()),
            },
        }
    }
}

#[derive(Serialize)]
struct SubscriptionFrame<'a> {
    action: &'static str,
    channel: Channel,
    #[serde(skip_serializing_if = "Option::is_none")]
    symbol: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    granularity: Option<Granularity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
}

/// Authentication request sent during `start(true)`
#[derive(Serialize)]
pub struct AuthRequest<'a> {
    pub token: &'a str,
    pub action: &'static str,
    pub channel: Channel,
}

impl<'a> AuthRequest<'a> {
    pub fn new(token: &'a str) -> Self {
        Self {
            token,
            action: ACTION_SUBSCRIBE,
            channel: Channel::Auth,
        }
    }
}

/// Order parameters supplied by the caller
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderSingle {
    /// Client reference, alphanumeric, at most 20 characters
    pub cl_ord_id: String,
    pub symbol: String,
    pub ord_type: OrdType,
    pub side: Side,
    /// Size in base currency
    pub order_qty: Decimal,
    pub time_in_force: Option<TimeInForce>,
    /// Limit price
    pub price: Option<Decimal>,
    /// Trigger price for stop orders
    pub stop_px: Option<Decimal>,
    /// Minimum IOC fill quantity
    pub min_qty: Option<Decimal>,
    /// GTD expiry as YYYYMMDD
    pub expire_date: Option<u32>,
    pub exec_inst: Option<ExecInst>,
}

impl NewOrderSingle {
    pub fn limit(
        cl_ord_id: impl Into<String>,
        symbol: impl Into<String>,
        side: Side,
        order_qty: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            cl_ord_id: cl_ord_id.into(),
            symbol: symbol.into(),
            ord_type: OrdType::Limit,
            side,
            order_qty,
            time_in_force: Some(TimeInForce::GoodTillCancel),
            price: Some(price),
            stop_px: None,
            min_qty: None,
            expire_date: None,
            exec_inst: None,
        }
    }

    pub fn market(
        cl_ord_id: impl Into<String>,
        symbol: impl Into<String>,
        side: Side,
        order_qty: Decimal,
    ) -> Self {
        Self {
            cl_ord_id: cl_ord_id.into(),
            symbol: symbol.into(),
            ord_type: OrdType::Market,
            side,
            order_qty,
            time_in_force: None,
            price: None,
            stop_px: None,
            min_qty: None,
            expire_date: None,
            exec_inst: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.cl_ord_id.is_empty()
            || self.cl_ord_id.len() > 20
            || !self.cl_ord_id.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(StreamError::Serialization(format!(
                "invalid clOrdID {:?}: expected 1-20 alphanumeric characters",
                self.cl_ord_id
            )));
        }
        if self.order_qty <= Decimal::ZERO {
            return Err(StreamError::Serialization(
                "orderQty must be positive".to_string(),
            ));
        }
        if matches!(self.ord_type, OrdType::Limit | OrdType::StopLimit) && self.price.is_none() {
            return Err(StreamError::Serialization(
                "limit orders require a price".to_string(),
            ));
        }
        if matches!(self.ord_type, OrdType::Stop | OrdType::StopLimit) && self.stop_px.is_none() {
            return Err(StreamError::Serialization(
                "stop orders require a stopPx".to_string(),
            ));
        }
        Ok(())
    }

    /// Serialize the `NewOrderSingle` trading command
    pub fn to_frame(&self) -> Result<String> {
        self.validate()?;
        to_frame(&NewOrderRequest::from(self))
    }
}

/// `NewOrderSingle` wire shape
#[derive(Debug, Serialize)]
pub struct NewOrderRequest<'a> {
    pub action: &'static str,
    pub channel: Channel,
    #[serde(rename = "clOrdID")]
    pub cl_ord_id: &'a str,
    pub symbol: &'a str,
    #[serde(rename = "ordType")]
    pub ord_type: OrdType,
    #[serde(rename = "timeInForce", skip_serializing_if = "Option::is_none")]
    pub time_in_force: Option<TimeInForce>,
    pub side: Side,
    #[serde(rename = "orderQty", with = "rust_decimal::serde::float")]
    pub order_qty: Decimal,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub price: Option<Decimal>,
    #[serde(
        rename = "stopPx",
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub stop_px: Option<Decimal>,
    #[serde(
        rename = "minQty",
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub min_qty: Option<Decimal>,
    #[serde(rename = "expireDate", skip_serializing_if = "Option::is_none")]
    pub expire_date: Option<u32>,
    #[serde(rename = "execInst", skip_serializing_if = "Option::is_none")]
    pub exec_inst: Option<ExecInst>,
}

impl<'a> From<&'a NewOrderSingle> for NewOrderRequest<'a> {
    fn from(order: &'a NewOrderSingle) -> Self {
        Self {
            action: ACTION_NEW_ORDER,
            channel: Channel::Trading,
            cl_ord_id: &order.cl_ord_id,
            symbol: &order.symbol,
            ord_type: order.ord_type,
            time_in_force: order.time_in_force,
            side: order.side,
            order_qty: order.order_qty,
            price: order.price,
            stop_px: order.stop_px,
            min_qty: order.min_qty,
            expire_date: order.expire_date,
            exec_inst: order.exec_inst,
        }
    }
}

/// `CancelOrderRequest` wire shape
#[derive(Debug, Serialize)]
pub struct CancelOrderRequest<'a> {
    pub action: &'static str,
    pub channel: Channel,
    #[serde(rename = "orderID")]
    pub order_id: &'a str,
}

impl<'a> CancelOrderRequest<'a> {
    pub fn new(order_id: &'a str) -> Self {
        Self {
            action: ACTION_CANCEL_ORDER,
            channel: Channel::Trading,
            order_id,
        }
    }
}

/// `BulkCancelOrderRequest` wire shape, optionally scoped to one symbol
#[derive(Debug, Serialize)]
pub struct BulkCancelRequest<'a> {
    pub action: &'static str,
    pub channel: Channel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<&'a str>,
}

impl<'a> BulkCancelRequest<'a> {
    pub fn new(symbol: Option<&'a str>) -> Self {
        Self {
            action: ACTION_BULK_CANCEL,
            channel: Channel::Trading,
            symbol,
        }
    }
}

/// Serialize any request into a text frame payload
pub fn to_frame<T: Serialize>(request: &T) -> Result<String> {
    serde_json::to_string(request).map_err(|e| StreamError::Serialization(e.to_string()))
}
