//! Per-category output queues
//!
//! One bounded FIFO per category. The read loop is the only producer; a full
//! queue makes the push wait, which holds back the next socket read until the
//! consumer catches up. Items are never dropped once classified, except when
//! the consumer has dropped its receiver.

use tokio::sync::mpsc;

use crate::error::StreamError;
use crate::parser::StreamMessage;
use crate::protocol::{
    Balances, Channel, Heartbeat, OrderBook, PriceUpdate, SymbolRecord, Ticker, TradeUpdate,
    TradingMessage,
};

/// A rejection that arrived while no subscribe call was waiting on its channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionError {
    pub channel: Channel,
    pub reason: String,
}

/// Producer side, owned by the client and cloned into the read loop
#[derive(Clone)]
pub(crate) struct OutputQueues {
    heartbeats: mpsc::Sender<Heartbeat>,
    symbols: mpsc::Sender<SymbolRecord>,
    l2: mpsc::Sender<OrderBook>,
    l3: mpsc::Sender<OrderBook>,
    prices: mpsc::Sender<PriceUpdate>,
    ticker: mpsc::Sender<Ticker>,
    trades: mpsc::Sender<TradeUpdate>,
    balances: mpsc::Sender<Balances>,
    trading: mpsc::Sender<TradingMessage>,
    subscription_errors: mpsc::Sender<SubscriptionError>,
    errors: mpsc::Sender<StreamError>,
}

/// Consumer side, handed to the caller once
pub struct Streams {
    pub heartbeats: mpsc::Receiver<Heartbeat>,
    pub symbols: mpsc::Receiver<SymbolRecord>,
    pub l2: mpsc::Receiver<OrderBook>,
    pub l3: mpsc::Receiver<OrderBook>,
    pub prices: mpsc::Receiver<PriceUpdate>,
    pub ticker: mpsc::Receiver<Ticker>,
    pub trades: mpsc::Receiver<TradeUpdate>,
    pub balances: mpsc::Receiver<Balances>,
    pub trading: mpsc::Receiver<TradingMessage>,
    pub subscription_errors: mpsc::Receiver<SubscriptionError>,
    /// Decode errors (non-fatal) and the terminal transport error
    pub errors: mpsc::Receiver<StreamError>,
}

/// Create the full set of queues with the same capacity each
pub(crate) fn output_queues(capacity: usize) -> (OutputQueues, Streams) {
    let (heartbeats_tx, heartbeats) = mpsc::channel(capacity);
    let (symbols_tx, symbols) = mpsc::channel(capacity);
    let (l2_tx, l2) = mpsc::channel(capacity);
    let (l3_tx, l3) = mpsc::channel(capacity);
    let (prices_tx, prices) = mpsc::channel(capacity);
    let (ticker_tx, ticker) = mpsc::channel(capacity);
    let (trades_tx, trades) = mpsc::channel(capacity);
    let (balances_tx, balances) = mpsc::channel(capacity);
    let (trading_tx, trading) = mpsc::channel(capacity);
    let (subscription_errors_tx, subscription_errors) = mpsc::channel(capacity);
    let (errors_tx, errors) = mpsc::channel(capacity);

    (
        OutputQueues {
            heartbeats: heartbeats_tx,
            symbols: symbols_tx,
            l2: l2_tx,
            l3: l3_tx,
            prices: prices_tx,
            ticker: ticker_tx,
            trades: trades_tx,
            balances: balances_tx,
            trading: trading_tx,
            subscription_errors: subscription_errors_tx,
            errors: errors_tx,
        },
        Streams {
            heartbeats,
            symbols,
            l2,
            l3,
            prices,
            ticker,
            trades,
            balances,
            trading,
            subscription_errors,
            errors,
        },
    )
}

impl OutputQueues {
    /// Push onto the category queue, waiting while it is full.
    ///
    /// Returns false if the consumer dropped the receiver.
    pub async fn push(&self, message: StreamMessage) -> bool {
        match message {
            StreamMessage::Heartbeat(m) => self.heartbeats.send(m).await.is_ok(),
            StreamMessage::Symbol(m) => self.symbols.send(m).await.is_ok(),
            StreamMessage::L2(m) => self.l2.send(m).await.is_ok(),
            StreamMessage::L3(m) => self.l3.send(m).await.is_ok(),
            StreamMessage::Prices(m) => self.prices.send(m).await.is_ok(),
            StreamMessage::Ticker(m) => self.ticker.send(m).await.is_ok(),
            StreamMessage::Trade(m) => self.trades.send(m).await.is_ok(),
            StreamMessage::Balances(m) => self.balances.send(m).await.is_ok(),
            StreamMessage::Trading(m) => self.trading.send(m).await.is_ok(),
        }
    }

    pub async fn push_subscription_error(&self, error: SubscriptionError) -> bool {
        self.subscription_errors.send(error).await.is_ok()
    }

    pub async fn push_error(&self, error: StreamError) -> bool {
        self.errors.send(error).await.is_ok()
    }
}
