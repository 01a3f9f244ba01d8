//! End-to-end tests against an in-process mock gateway

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_test::{assert_err, assert_ok};
use tokio_tungstenite::{accept_async, tungstenite::Message};

use bcex_stream::protocol::Side;
use bcex_stream::{
    Channel, Config, ConnectionState, NewOrderSingle, StreamClient, StreamError, Streams,
    Subscription,
};

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Builds replies for one decoded request
type Responder = Arc<dyn Fn(&Value, &Seq) -> Vec<Value> + Send + Sync>;

/// Gateway-side sequence numbers
#[derive(Default)]
struct Seq(AtomicU64);

impl Seq {
    fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

enum Mode {
    /// Reads requests and answers them with the responder
    Responsive(Responder),
    /// Accepts the connection and never reads or writes
    Silent,
    /// Never reads, writes a text `ping` every interval
    PingOnly(Duration),
}

struct MockGateway {
    addr: SocketAddr,
    /// Every JSON request the client wrote
    requests: mpsc::UnboundedReceiver<Value>,
    /// Frames to push to the client
    outbound: mpsc::UnboundedSender<Message>,
}

impl MockGateway {
    async fn start(mode: Mode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (requests_tx, requests) = mpsc::unbounded_channel();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let Ok(ws) = accept_async(stream).await else {
                return;
            };
            serve(ws, mode, requests_tx, outbound_rx).await;
        });

        Self {
            addr,
            requests,
            outbound,
        }
    }

    fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    fn push(&self, frame: Value) {
        self.outbound.send(Message::Text(frame.to_string())).unwrap();
    }

    fn push_raw(&self, frame: &str) {
        self.outbound.send(Message::Text(frame.to_string())).unwrap();
    }

    async fn next_request(&mut self) -> Value {
        timeout(RECV_TIMEOUT, self.requests.recv())
            .await
            .expect("timed out waiting for request")
            .expect("gateway closed")
    }
}

async fn serve(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    mode: Mode,
    requests: mpsc::UnboundedSender<Value>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
) {
    let (mut sink, mut stream) = ws.split();
    match mode {
        Mode::Responsive(responder) => {
            let seq = Seq::default();
            loop {
                tokio::select! {
                    incoming = stream.next() => match incoming {
                        Some(Ok(Message::Text(text))) => {
                            let Ok(request) = serde_json::from_str::<Value>(&text) else {
                                continue;
                            };
                            for reply in responder(&request, &seq) {
                                if sink.send(Message::Text(reply.to_string())).await.is_err() {
                                    return;
                                }
                            }
                            let _ = requests.send(request);
                        }
                        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                        Some(Ok(_)) => {}
                    },
                    Some(frame) = outbound.recv() => {
                        let closing = matches!(frame, Message::Close(_));
                        if sink.send(frame).await.is_err() || closing {
                            return;
                        }
                    }
                }
            }
        }
        Mode::Silent => {
            // Hold the socket open without ever polling it
            let _held = (sink, stream);
            sleep(Duration::from_secs(30)).await;
        }
        Mode::PingOnly(every) => {
            let _stream = stream;
            loop {
                sleep(every).await;
                if sink.send(Message::Text("ping".to_string())).await.is_err() {
                    return;
                }
            }
        }
    }
}

fn ack(request: &Value, seq: &Seq) -> Value {
    let event = match request["action"].as_str() {
        Some("unsubscribe") => "unsubscribed",
        _ => "subscribed",
    };
    let mut reply = json!({
        "seqnum": seq.next(),
        "event": event,
        "channel": request["channel"],
    });
    if let Some(symbol) = request.get("symbol") {
        reply["symbol"] = symbol.clone();
    }
    reply
}

fn reject(request: &Value, seq: &Seq, text: &str) -> Value {
    json!({
        "seqnum": seq.next(),
        "event": "rejected",
        "channel": request["channel"],
        "text": text,
    })
}

/// Acknowledges every subscription; accepts only the token `good`
fn acknowledge_all() -> Responder {
    Arc::new(|request: &Value, seq: &Seq| {
        if request["channel"] == "auth" && request["token"] != "good" {
            return vec![reject(request, seq, "Authentication Failed")];
        }
        match request["action"].as_str() {
            Some("subscribe") | Some("unsubscribe") => vec![ack(request, seq)],
            _ => vec![],
        }
    })
}

fn config_for(url: String) -> Config {
    Config {
        ws_endpoint: url,
        request_timeout_ms: 300,
        keepalive: false,
        queue_capacity: 64,
        ..Config::default()
    }
}

async fn connected(mode: Mode) -> (MockGateway, StreamClient, Streams) {
    let gateway = MockGateway::start(mode).await;
    let client = StreamClient::new(config_for(gateway.url())).unwrap();
    let streams = client.take_streams().unwrap();
    assert_ok!(client.start(false).await);
    (gateway, client, streams)
}

async fn recv<T>(rx: &mut mpsc::Receiver<T>) -> T {
    timeout(RECV_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for item")
        .expect("queue closed")
}

fn assert_quiet<T: std::fmt::Debug>(rx: &mut mpsc::Receiver<T>) {
    if let Ok(item) = rx.try_recv() {
        panic!("unexpected item: {:?}", item);
    }
}

#[tokio::test]
async fn test_heartbeat_end_to_end() {
    let responder: Responder = Arc::new(|request: &Value, seq: &Seq| {
        let mut replies = vec![ack(request, seq)];
        if request["channel"] == "heartbeat" {
            replies.push(json!({
                "seqnum": 1,
                "event": "updated",
                "channel": "heartbeat",
                "timestamp": "2019-05-31T08:36:45.666753Z",
            }));
        }
        replies
    });
    let (mut gateway, client, mut streams) = connected(Mode::Responsive(responder)).await;
    assert_eq!(client.state(), ConnectionState::Ready);

    assert_ok!(client.subscribe_heartbeat().await);
    let request = gateway.next_request().await;
    assert_eq!(request, json!({"action": "subscribe", "channel": "heartbeat"}));

    let heartbeat = recv(&mut streams.heartbeats).await;
    assert_eq!(heartbeat.seqnum, 1);
    assert!(heartbeat.timestamp.is_some());

    client.stop().await;
}

#[tokio::test]
async fn test_unanswered_subscription_times_out_and_connection_survives() {
    let responder: Responder = Arc::new(|request: &Value, seq: &Seq| {
        if request["channel"] == "l2" {
            vec![]
        } else {
            vec![ack(request, seq)]
        }
    });
    let (_gateway, client, mut streams) = connected(Mode::Responsive(responder)).await;

    let err = client.subscribe_l2("BTC-USD").await.unwrap_err();
    assert!(matches!(
        err,
        StreamError::SubscriptionTimeout {
            channel: Channel::L2
        }
    ));
    assert_eq!(client.state(), ConnectionState::Ready);

    assert_ok!(client.subscribe_heartbeat().await);
    assert_quiet(&mut streams.errors);

    client.stop().await;
}

#[tokio::test]
async fn test_late_ack_after_timeout_is_discarded() {
    let silent: Responder = Arc::new(|_: &Value, _: &Seq| Vec::new());
    let (gateway, client, mut streams) = connected(Mode::Responsive(silent)).await;

    assert_err!(client.subscribe_ticker("ETH-USD").await);
    gateway.push(json!({"seqnum": 1, "event": "subscribed", "channel": "ticker"}));
    gateway.push(json!({
        "seqnum": 2,
        "event": "updated",
        "channel": "ticker",
        "symbol": "ETH-USD",
        "price_24h": 4998.0,
        "volume_24h": 0.3015,
        "last_trade_price": 5000.0,
    }));

    let ticker = recv(&mut streams.ticker).await;
    assert_eq!(ticker.last_trade_price, Some(dec!(5000)));
    assert_quiet(&mut streams.errors);
    assert_quiet(&mut streams.subscription_errors);

    client.stop().await;
}

#[tokio::test]
async fn test_trading_reject_goes_to_trading_queue() {
    let responder: Responder = Arc::new(|request: &Value, seq: &Seq| {
        match request["action"].as_str() {
            Some("NewOrderSingle") => vec![json!({
                "seqnum": seq.next(),
                "event": "rejected",
                "channel": "trading",
                "text": "Invalid order",
                "clOrdID": request["clOrdID"],
            })],
            _ => vec![ack(request, seq)],
        }
    });
    let (_gateway, client, mut streams) = connected(Mode::Responsive(responder)).await;

    assert_ok!(client.subscribe_trading().await);
    let order = NewOrderSingle::limit("abc123", "BTC-USD", Side::Buy, dec!(0.5), dec!(100));
    assert_ok!(client.new_order(&order).await);

    let message = recv(&mut streams.trading).await;
    assert!(message.is_reject());
    match message {
        bcex_stream::protocol::TradingMessage::Reject(reject) => {
            assert_eq!(reject.text, "Invalid order");
            assert_eq!(reject.cl_ord_id.as_deref(), Some("abc123"));
        }
        other => panic!("expected reject, got {:?}", other),
    }
    assert_quiet(&mut streams.subscription_errors);

    client.stop().await;
}

#[tokio::test]
async fn test_malformed_frame_reports_one_decode_error() {
    let (gateway, client, mut streams) = connected(Mode::Responsive(acknowledge_all())).await;

    gateway.push_raw("{not json");
    gateway.push(json!({"seqnum": 5, "event": "updated", "channel": "heartbeat"}));

    let heartbeat = recv(&mut streams.heartbeats).await;
    assert_eq!(heartbeat.seqnum, 5);

    let err = recv(&mut streams.errors).await;
    assert!(matches!(err, StreamError::Decode(_)));
    assert!(!err.is_fatal());
    assert_quiet(&mut streams.errors);
    assert_eq!(client.state(), ConnectionState::Ready);
    assert_eq!(client.metrics().decode_errors.get(), 1);

    client.stop().await;
}

#[tokio::test]
async fn test_symbols_snapshot_fans_out_per_instrument() {
    let (gateway, client, mut streams) = connected(Mode::Responsive(acknowledge_all())).await;

    let entry = |id: i64| {
        json!({
            "base_currency": "X",
            "base_currency_scale": 8,
            "counter_currency": "USD",
            "counter_currency_scale": 2,
            "min_price_increment": 10,
            "min_price_increment_scale": 0,
            "min_order_size": 50,
            "min_order_size_scale": 2,
            "max_order_size": 0,
            "max_order_size_scale": 8,
            "lot_size": 5,
            "lot_size_scale": 2,
            "status": "open",
            "id": id,
            "auction_price": 0.0,
            "auction_size": 0.0,
            "auction_time": "",
            "imbalance": 0.0,
        })
    };
    gateway.push(json!({
        "seqnum": 1,
        "event": "snapshot",
        "channel": "symbols",
        "symbols": {"ETH-USD": entry(2), "BTC-USD": entry(1), "XLM-USD": entry(3)},
    }));

    let mut names = Vec::new();
    for _ in 0..3 {
        names.push(recv(&mut streams.symbols).await.name);
    }
    names.sort();
    assert_eq!(names, vec!["BTC-USD", "ETH-USD", "XLM-USD"]);

    sleep(Duration::from_millis(50)).await;
    assert_quiet(&mut streams.symbols);

    client.stop().await;
}

#[tokio::test]
async fn test_updates_arrive_in_gateway_order() {
    let (gateway, client, mut streams) = connected(Mode::Responsive(acknowledge_all())).await;

    for seqnum in 1..=5u64 {
        gateway.push(json!({
            "seqnum": seqnum,
            "event": "updated",
            "channel": "l2",
            "symbol": "BTC-USD",
            "bids": [{"px": 8723.45, "qty": 1.1, "num": 1}],
            "asks": [],
        }));
    }

    for expected in 1..=5u64 {
        assert_eq!(recv(&mut streams.l2).await.seqnum, expected);
    }

    client.stop().await;
}

#[tokio::test]
async fn test_concurrent_subscriptions_resolve_independently() {
    let responder: Responder = Arc::new(|request: &Value, seq: &Seq| {
        if request["channel"] == "ticker" {
            vec![reject(request, seq, "Invalid symbol")]
        } else {
            vec![ack(request, seq)]
        }
    });
    let (_gateway, client, mut streams) = connected(Mode::Responsive(responder)).await;

    let (balances, ticker) =
        tokio::join!(client.subscribe_balances(), client.subscribe_ticker("FOO-BAR"));

    assert_ok!(balances);
    match ticker {
        Err(StreamError::SubscriptionRejected { channel, reason }) => {
            assert_eq!(channel, Channel::Ticker);
            assert_eq!(reason, "Invalid symbol");
        }
        other => panic!("expected rejection, got {:?}", other),
    }
    assert_quiet(&mut streams.subscription_errors);

    client.stop().await;
}

#[tokio::test]
async fn test_unmatched_reject_goes_to_subscription_errors() {
    let (gateway, client, mut streams) = connected(Mode::Responsive(acknowledge_all())).await;

    gateway.push(json!({
        "seqnum": 9,
        "event": "rejected",
        "channel": "prices",
        "text": "Invalid granularity",
    }));

    let rejection = recv(&mut streams.subscription_errors).await;
    assert_eq!(rejection.channel, Channel::Prices);
    assert_eq!(rejection.reason, "Invalid granularity");

    client.stop().await;
}

#[tokio::test]
async fn test_unsubscribe_waits_for_unsubscribed_event() {
    let (mut gateway, client, _streams) = connected(Mode::Responsive(acknowledge_all())).await;

    let trades = Subscription::Trades {
        symbol: "BTC-USD".to_string(),
    };
    assert_ok!(client.subscribe(trades.clone()).await);
    assert_ok!(client.unsubscribe(trades).await);

    let _ = gateway.next_request().await;
    let request = gateway.next_request().await;
    assert_eq!(
        request,
        json!({"action": "unsubscribe", "channel": "trades", "symbol": "BTC-USD"})
    );

    client.stop().await;
}

#[tokio::test]
async fn test_authenticated_start() {
    let mut gateway = MockGateway::start(Mode::Responsive(acknowledge_all())).await;
    let config = Config {
        api_secret: Some("good".to_string()),
        ..config_for(gateway.url())
    };
    let client = StreamClient::new(config).unwrap();

    assert_ok!(client.start(true).await);
    assert_eq!(client.state(), ConnectionState::Ready);

    let request = gateway.next_request().await;
    assert_eq!(
        request,
        json!({"token": "good", "action": "subscribe", "channel": "auth"})
    );

    client.stop().await;
}

#[tokio::test]
async fn test_rejected_authentication_stops_client() {
    let gateway = MockGateway::start(Mode::Responsive(acknowledge_all())).await;
    let config = Config {
        api_secret: Some("bad".to_string()),
        ..config_for(gateway.url())
    };
    let client = StreamClient::new(config).unwrap();

    match client.start(true).await {
        Err(StreamError::Authentication(reason)) => assert_eq!(reason, "Authentication Failed"),
        other => panic!("expected authentication error, got {:?}", other),
    }
    assert_eq!(client.state(), ConnectionState::Stopped);
}

#[tokio::test]
async fn test_authentication_requires_secret() {
    let client = StreamClient::new(config_for("ws://127.0.0.1:1".to_string())).unwrap();

    let err = client.start(true).await.unwrap_err();
    assert!(matches!(err, StreamError::Authentication(_)));
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_connect_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = StreamClient::new(config_for(format!("ws://{}", addr))).unwrap();
    let err = client.start(false).await.unwrap_err();
    assert!(matches!(err, StreamError::Connection(_)));
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let (_gateway, client, _streams) = connected(Mode::Responsive(acknowledge_all())).await;
    assert!(matches!(
        client.start(false).await,
        Err(StreamError::AlreadyStarted)
    ));
    client.stop().await;
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let idle = StreamClient::new(config_for("ws://127.0.0.1:1".to_string())).unwrap();
    idle.stop().await;
    assert_eq!(idle.state(), ConnectionState::Disconnected);

    let (_gateway, client, _streams) = connected(Mode::Responsive(acknowledge_all())).await;
    client.stop().await;
    client.stop().await;
    assert_eq!(client.state(), ConnectionState::Stopped);

    assert!(matches!(
        client.subscribe_heartbeat().await,
        Err(StreamError::NotConnected)
    ));
    assert!(matches!(
        client.cancel_order("12345").await,
        Err(StreamError::NotConnected)
    ));
}

#[tokio::test]
async fn test_nothing_delivered_after_stop() {
    let gateway = MockGateway::start(Mode::Responsive(acknowledge_all())).await;
    let config = Config {
        queue_capacity: 2,
        ..config_for(gateway.url())
    };
    let client = StreamClient::new(config).unwrap();
    let mut streams = client.take_streams().unwrap();
    assert_ok!(client.start(false).await);

    for seqnum in 1..=20u64 {
        gateway.push(json!({"seqnum": seqnum, "event": "updated", "channel": "heartbeat"}));
    }
    // Let the read loop block on the full queue
    let first = recv(&mut streams.heartbeats).await;
    assert_eq!(first.seqnum, 1);
    sleep(Duration::from_millis(100)).await;

    timeout(RECV_TIMEOUT, client.stop())
        .await
        .expect("stop blocked on a full queue");

    while streams.heartbeats.try_recv().is_ok() {}
    sleep(Duration::from_millis(100)).await;
    assert_quiet(&mut streams.heartbeats);
}

#[tokio::test]
async fn test_gateway_close_reports_one_transport_error() {
    let (gateway, client, mut streams) = connected(Mode::Responsive(acknowledge_all())).await;
    let mut states = client.state_changes();

    gateway.outbound.send(Message::Close(None)).unwrap();

    let err = recv(&mut streams.errors).await;
    assert!(matches!(err, StreamError::Transport(_)));
    assert!(err.is_fatal());

    timeout(
        RECV_TIMEOUT,
        states.wait_for(|state| *state == ConnectionState::Disconnected),
    )
    .await
    .expect("state never became disconnected")
    .unwrap();

    sleep(Duration::from_millis(50)).await;
    assert_quiet(&mut streams.errors);
    assert!(matches!(
        client.subscribe_heartbeat().await,
        Err(StreamError::NotConnected)
    ));
}

fn keepalive_config(url: String) -> Config {
    Config {
        keepalive: true,
        ping_interval_ms: 50,
        keepalive_timeout_ms: 200,
        ..config_for(url)
    }
}

#[tokio::test]
async fn test_keepalive_expiry_fails_connection_once() {
    let gateway = MockGateway::start(Mode::Silent).await;
    let client = StreamClient::new(keepalive_config(gateway.url())).unwrap();
    let mut streams = client.take_streams().unwrap();
    let mut states = client.state_changes();
    assert_ok!(client.start(false).await);

    let err = recv(&mut streams.errors).await;
    assert!(matches!(err, StreamError::KeepaliveTimeout { .. }));

    timeout(
        RECV_TIMEOUT,
        states.wait_for(|state| *state == ConnectionState::Disconnected),
    )
    .await
    .expect("state never became disconnected")
    .unwrap();

    sleep(Duration::from_millis(200)).await;
    assert_quiet(&mut streams.errors);
    assert_eq!(client.metrics().keepalive_expired.get(), 1);

    client.stop().await;
}

#[tokio::test]
async fn test_keepalive_stays_healthy_with_pongs() {
    let gateway = MockGateway::start(Mode::Responsive(acknowledge_all())).await;
    let client = StreamClient::new(keepalive_config(gateway.url())).unwrap();
    let mut streams = client.take_streams().unwrap();
    assert_ok!(client.start(false).await);

    sleep(Duration::from_millis(600)).await;

    assert_eq!(client.state(), ConnectionState::Ready);
    assert_quiet(&mut streams.errors);
    assert!(client.metrics().pings_sent.get() > 0);

    client.stop().await;
}

#[tokio::test]
async fn test_text_pings_keep_connection_alive() {
    let gateway = MockGateway::start(Mode::PingOnly(Duration::from_millis(50))).await;
    let client = StreamClient::new(keepalive_config(gateway.url())).unwrap();
    let mut streams = client.take_streams().unwrap();
    assert_ok!(client.start(false).await);

    sleep(Duration::from_millis(600)).await;

    assert_eq!(client.state(), ConnectionState::Ready);
    assert_quiet(&mut streams.errors);
    assert_eq!(client.metrics().keepalive_expired.get(), 0);

    client.stop().await;
}

#[tokio::test]
async fn test_trading_command_frames() {
    let (mut gateway, client, _streams) = connected(Mode::Responsive(acknowledge_all())).await;

    let order = NewOrderSingle::limit("ref1", "BTC-USD", Side::Sell, dec!(0.25), dec!(9000.5));
    assert_ok!(client.new_order(&order).await);
    assert_ok!(client.cancel_order("11111111").await);
    assert_ok!(client.bulk_cancel(Some("BTC-USD")).await);
    assert_ok!(client.bulk_cancel(None).await);

    assert_eq!(
        gateway.next_request().await,
        json!({
            "action": "NewOrderSingle",
            "channel": "trading",
            "clOrdID": "ref1",
            "symbol": "BTC-USD",
            "ordType": "limit",
            "timeInForce": "GTC",
            "side": "sell",
            "orderQty": 0.25,
            "price": 9000.5,
        })
    );
    assert_eq!(
        gateway.next_request().await,
        json!({"action": "CancelOrderRequest", "channel": "trading", "orderID": "11111111"})
    );
    assert_eq!(
        gateway.next_request().await,
        json!({"action": "BulkCancelOrderRequest", "channel": "trading", "symbol": "BTC-USD"})
    );
    assert_eq!(
        gateway.next_request().await,
        json!({"action": "BulkCancelOrderRequest", "channel": "trading"})
    );

    let invalid = NewOrderSingle::limit("not valid!", "BTC-USD", Side::Buy, dec!(1), dec!(1));
    assert!(matches!(
        client.new_order(&invalid).await,
        Err(StreamError::Serialization(_))
    ));

    client.stop().await;
}

#[tokio::test]
async fn test_streams_taken_once() {
    let client = StreamClient::new(config_for("ws://127.0.0.1:1".to_string())).unwrap();
    assert!(client.take_streams().is_some());
    assert!(client.take_streams().is_none());
}

/// Large enough to fill the socket buffers of a peer that never reads
fn oversized_symbol() -> String {
    "A".repeat(32 * 1024 * 1024)
}

#[tokio::test]
async fn test_stop_returns_while_write_is_stalled() {
    let gateway = MockGateway::start(Mode::Silent).await;
    let config = Config {
        request_timeout_ms: 30_000,
        ..config_for(gateway.url())
    };
    let client = Arc::new(StreamClient::new(config).unwrap());
    assert_ok!(client.start(false).await);

    let stalled = {
        let client = client.clone();
        tokio::spawn(async move { client.subscribe_l2(&oversized_symbol()).await })
    };
    sleep(Duration::from_millis(200)).await;
    assert!(!stalled.is_finished());

    timeout(Duration::from_secs(3), client.stop())
        .await
        .expect("stop blocked behind a stalled write");
    assert_eq!(client.state(), ConnectionState::Stopped);

    let result = timeout(RECV_TIMEOUT, stalled)
        .await
        .expect("stalled subscribe never returned")
        .unwrap();
    assert!(matches!(result, Err(StreamError::NotConnected)));
}

#[tokio::test]
async fn test_request_timeout_covers_stalled_write() {
    let gateway = MockGateway::start(Mode::Silent).await;
    let client = Arc::new(StreamClient::new(config_for(gateway.url())).unwrap());
    assert_ok!(client.start(false).await);

    let stalled = {
        let client = client.clone();
        tokio::spawn(async move { client.subscribe_l2(&oversized_symbol()).await })
    };
    // Queued behind the stalled writer
    let queued = timeout(Duration::from_secs(1), client.subscribe_heartbeat())
        .await
        .expect("subscribe ran past its request timeout");
    assert!(matches!(
        queued,
        Err(StreamError::SubscriptionTimeout {
            channel: Channel::Heartbeat
        })
    ));

    let result = timeout(Duration::from_secs(1), stalled)
        .await
        .expect("stalled subscribe ran past its request timeout")
        .unwrap();
    assert!(matches!(
        result,
        Err(StreamError::SubscriptionTimeout {
            channel: Channel::L2
        })
    ));
    assert_eq!(client.state(), ConnectionState::Ready);

    timeout(Duration::from_secs(3), client.stop())
        .await
        .expect("stop blocked behind a stalled write");
}
