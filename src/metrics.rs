//! Prometheus counters for one client

use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

use crate::error::{Result, StreamError};

/// Counters kept in a registry owned by the client
#[derive(Clone)]
pub struct StreamMetrics {
    registry: Registry,
    pub frames_received: IntCounter,
    pub decode_errors: IntCounter,
    pub messages_delivered: IntCounterVec,
    pub subscription_outcomes: IntCounterVec,
    pub pings_sent: IntCounter,
    pub keepalive_expired: IntCounter,
}

impl StreamMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("bcex_stream".to_string()), None)
            .map_err(metrics_error)?;

        let frames_received =
            IntCounter::new("frames_received_total", "Text frames read from the gateway")
                .map_err(metrics_error)?;
        let decode_errors =
            IntCounter::new("decode_errors_total", "Frames dropped because they failed to decode")
                .map_err(metrics_error)?;
        let messages_delivered = IntCounterVec::new(
            Opts::new("messages_delivered_total", "Payloads pushed onto output queues"),
            &["channel"],
        )
        .map_err(metrics_error)?;
        let subscription_outcomes = IntCounterVec::new(
            Opts::new("subscription_outcomes_total", "Resolved subscription requests"),
            &["channel", "outcome"],
        )
        .map_err(metrics_error)?;
        let pings_sent = IntCounter::new("pings_sent_total", "Protocol pings written")
            .map_err(metrics_error)?;
        let keepalive_expired = IntCounter::new(
            "keepalive_expired_total",
            "Connections closed for missing pongs",
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(frames_received.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(decode_errors.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(messages_delivered.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(subscription_outcomes.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(pings_sent.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(keepalive_expired.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            frames_received,
            decode_errors,
            messages_delivered,
            subscription_outcomes,
            pings_sent,
            keepalive_expired,
        })
    }

    /// Render all counters in the Prometheus text format
    pub fn encode(&self) -> Result<String> {
        use prometheus::{Encoder, TextEncoder};

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| StreamError::Serialization(e.to_string()))
    }
}

fn metrics_error(err: prometheus::Error) -> StreamError {
    StreamError::Config(format!("metrics: {}", err))
}
