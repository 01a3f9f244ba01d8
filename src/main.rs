//! BCEX Stream - gateway feed monitor
//!
//! Connects to the exchange gateway, subscribes to the configured symbols and
//! logs every delivered payload while serving health and metrics over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bcex_stream::{Config, ConnectionState, StreamClient, Streams};

/// Application state shared with the HTTP handlers
#[derive(Clone)]
struct AppState {
    client: Arc<StreamClient>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting BCEX stream monitor");

    let config = Config::load()?;
    info!(config = ?config, "Configuration loaded");

    let client = Arc::new(StreamClient::new(config.clone())?);
    let streams = client
        .take_streams()
        .ok_or_else(|| anyhow::anyhow!("output streams already taken"))?;

    let health_state = AppState {
        client: client.clone(),
    };
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_state).await {
            warn!(error = %e, "Health server error");
        }
    });

    client.start(config.api_secret.is_some()).await?;

    client.subscribe_heartbeat().await?;
    client.subscribe_symbols().await?;
    for symbol in &config.symbols {
        for result in [
            client.subscribe_l2(symbol).await,
            client.subscribe_ticker(symbol).await,
            client.subscribe_trades(symbol).await,
        ] {
            if let Err(e) = result {
                warn!(symbol = %symbol, error = %e, "Subscription failed");
            }
        }
    }
    if config.api_secret.is_some() {
        client.subscribe_balances().await?;
        client.subscribe_trading().await?;
    }

    let outcome = tokio::select! {
        result = drain(streams) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
            Ok(())
        }
    };

    client.stop().await;
    outcome
}

/// Log everything the client delivers until a fatal error arrives
async fn drain(mut streams: Streams) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            Some(heartbeat) = streams.heartbeats.recv() => {
                info!(seqnum = heartbeat.seqnum, timestamp = ?heartbeat.timestamp, "Heartbeat");
            }
            Some(symbol) = streams.symbols.recv() => {
                info!(symbol = %symbol.name, status = ?symbol.status, "Symbol");
            }
            Some(book) = streams.l2.recv() => {
                info!(
                    symbol = %book.symbol,
                    event = %book.event,
                    bids = book.bids.len(),
                    asks = book.asks.len(),
                    "L2 book"
                );
            }
            Some(book) = streams.l3.recv() => {
                info!(symbol = %book.symbol, event = %book.event, "L3 book");
            }
            Some(candle) = streams.prices.recv() => {
                info!(symbol = %candle.symbol, close = %candle.price.close, "Price");
            }
            Some(ticker) = streams.ticker.recv() => {
                info!(symbol = %ticker.symbol, last = ?ticker.last_trade_price, "Ticker");
            }
            Some(trade) = streams.trades.recv() => {
                info!(symbol = %trade.symbol, price = %trade.price, qty = %trade.qty, "Trade");
            }
            Some(balances) = streams.balances.recv() => {
                info!(assets = balances.balances.len(), "Balances");
            }
            Some(message) = streams.trading.recv() => {
                info!(message = ?message, "Trading");
            }
            Some(rejection) = streams.subscription_errors.recv() => {
                warn!(channel = %rejection.channel, reason = %rejection.reason, "Subscription rejected");
            }
            Some(err) = streams.errors.recv() => {
                if err.is_fatal() {
                    error!(error = %err, "Connection lost");
                    return Err(err.into());
                }
                warn!(error = %err, "Stream error");
            }
            else => return Ok(()),
        }
    }
}

/// Start HTTP server for health checks and metrics
async fn start_health_server(state: AppState) -> anyhow::Result<()> {
    let port = state.client.config().health_port;
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(addr = %addr, "Starting health check server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let connection = state.client.state();
    let status = if connection == ConnectionState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(serde_json::json!({
            "status": if status == StatusCode::OK { "healthy" } else { "degraded" },
            "component": "bcex-stream",
            "connection": format!("{:?}", connection),
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
}

async fn metrics(State(state): State<AppState>) -> (StatusCode, String) {
    match state.client.metrics().encode() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
