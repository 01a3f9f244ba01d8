//! Configuration module for the streaming client

use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, StreamError};
use crate::protocol::{DEFAULT_ORIGIN, WS_ENDPOINT, WS_STAGING_ENDPOINT};

/// Gateway environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Prod,
    Staging,
}

impl Environment {
    pub fn endpoint(&self) -> &'static str {
        match self {
            Environment::Prod => WS_ENDPOINT,
            Environment::Staging => WS_STAGING_ENDPOINT,
        }
    }

    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "prod" | "production" => Ok(Environment::Prod),
            "staging" => Ok(Environment::Staging),
            other => Err(StreamError::Config(format!("unknown environment: {}", other))),
        }
    }
}

/// Client configuration
#[derive(Clone)]
pub struct Config {
    pub environment: Environment,

    /// Gateway WebSocket endpoint
    pub ws_endpoint: String,

    /// Token sent on the auth channel
    pub api_secret: Option<String>,

    /// Origin header sent on the handshake
    pub origin: String,

    /// Symbols the demo binary subscribes to (e.g., ["BTC-USD", "ETH-USD"])
    pub symbols: Vec<String>,

    /// Bounded wait for subscription and auth acknowledgements
    pub request_timeout_ms: u64,

    /// Keepalive settings
    pub keepalive: bool,
    pub ping_interval_ms: u64,
    pub keepalive_timeout_ms: u64,

    /// Per-category queue depth before the read loop waits on the consumer
    pub queue_capacity: usize,

    /// Health check server port for the demo binary
    pub health_port: u16,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a dotenv file without touching the process environment
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self> {
        let vars = dotenvy::from_path_iter(path.as_ref())
            .map_err(|e| StreamError::Config(e.to_string()))?
            .collect::<std::result::Result<HashMap<String, String>, _>>()
            .map_err(|e| StreamError::Config(e.to_string()))?;
        let config = Self::from_lookup(|key| vars.get(key).cloned())?;
        config.validate()?;
        Ok(config)
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let environment = match get("BCEX_ENV") {
            Some(value) => Environment::parse(&value)?,
            None => defaults.environment,
        };

        let symbols: Vec<String> = get("SYMBOLS")
            .unwrap_or_else(|| "BTC-USD".to_string())
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            environment,
            ws_endpoint: get("WS_ENDPOINT").unwrap_or_else(|| environment.endpoint().to_string()),
            api_secret: get("BCEX_API_SECRET").filter(|s| !s.is_empty()),
            origin: get("WS_ORIGIN").unwrap_or(defaults.origin),
            symbols,
            request_timeout_ms: parse_or(&get, "REQUEST_TIMEOUT_MS", defaults.request_timeout_ms),
            keepalive: parse_or(&get, "KEEPALIVE", defaults.keepalive),
            ping_interval_ms: parse_or(&get, "PING_INTERVAL_MS", defaults.ping_interval_ms),
            keepalive_timeout_ms: parse_or(
                &get,
                "KEEPALIVE_TIMEOUT_MS",
                defaults.keepalive_timeout_ms,
            ),
            queue_capacity: parse_or(&get, "QUEUE_CAPACITY", defaults.queue_capacity),
            health_port: parse_or(&get, "HEALTH_PORT", defaults.health_port),
        })
    }

    /// Reject settings the client cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.ws_endpoint.is_empty() {
            return Err(StreamError::Config("ws_endpoint is empty".to_string()));
        }
        if self.request_timeout_ms == 0 {
            return Err(StreamError::Config(
                "request_timeout_ms must be positive".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(StreamError::Config(
                "queue_capacity must be positive".to_string(),
            ));
        }
        if self.keepalive {
            if self.ping_interval_ms == 0 {
                return Err(StreamError::Config(
                    "ping_interval_ms must be positive".to_string(),
                ));
            }
            if self.keepalive_timeout_ms < self.ping_interval_ms {
                return Err(StreamError::Config(format!(
                    "keepalive_timeout_ms ({}) shorter than ping_interval_ms ({})",
                    self.keepalive_timeout_ms, self.ping_interval_ms
                )));
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn keepalive_timeout(&self) -> Duration {
        Duration::from_millis(self.keepalive_timeout_ms)
    }
}

fn parse_or<T: std::str::FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    get(key)
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("environment", &self.environment)
            .field("ws_endpoint", &self.ws_endpoint)
            .field("api_secret", &self.api_secret.as_ref().map(|_| "***"))
            .field("origin", &self.origin)
            .field("symbols", &self.symbols)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("keepalive", &self.keepalive)
            .field("ping_interval_ms", &self.ping_interval_ms)
            .field("keepalive_timeout_ms", &self.keepalive_timeout_ms)
            .field("queue_capacity", &self.queue_capacity)
            .field("health_port", &self.health_port)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: Environment::Prod,
            ws_endpoint: WS_ENDPOINT.to_string(),
            api_secret: None,
            origin: DEFAULT_ORIGIN.to_string(),
            symbols: vec!["BTC-USD".to_string()],
            request_timeout_ms: 60_000,
            keepalive: true,
            ping_interval_ms: 5_000,
            keepalive_timeout_ms: 60_000,
            queue_capacity: 1024,
            health_port: 9090,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ping_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_from_env_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "BCEX_ENV=staging").unwrap();
        writeln!(file, "BCEX_API_SECRET=top-secret").unwrap();
        writeln!(file, "SYMBOLS=btc-usd, eth-btc").unwrap();
        writeln!(file, "REQUEST_TIMEOUT_MS=2500").unwrap();
        writeln!(file, "KEEPALIVE=false").unwrap();
        writeln!(file, "QUEUE_CAPACITY=not-a-number").unwrap();

        let config = Config::from_env_file(file.path()).unwrap();
        assert_eq!(config.environment, Environment::Staging);
        assert_eq!(config.ws_endpoint, WS_STAGING_ENDPOINT);
        assert_eq!(config.api_secret.as_deref(), Some("top-secret"));
        assert_eq!(config.symbols, vec!["BTC-USD", "ETH-BTC"]);
        assert_eq!(config.request_timeout(), Duration::from_millis(2500));
        assert!(!config.keepalive);
        assert_eq!(config.queue_capacity, 1024);
        assert!(!format!("{:?}", config).contains("top-secret"));
    }

    #[test]
    fn test_explicit_endpoint_overrides_environment() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "BCEX_ENV=staging").unwrap();
        writeln!(file, "WS_ENDPOINT=ws://127.0.0.1:9000").unwrap();

        let config = Config::from_env_file(file.path()).unwrap();
        assert_eq!(config.ws_endpoint, "ws://127.0.0.1:9000");
    }

    #[test]
    fn test_unknown_environment_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "BCEX_ENV=moon").unwrap();
        assert!(matches!(
            Config::from_env_file(file.path()),
            Err(StreamError::Config(_))
        ));
    }

    #[test]
    fn test_keepalive_timeout_must_cover_ping_interval() {
        let config = Config {
            ping_interval_ms: 10_000,
            keepalive_timeout_ms: 5_000,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            keepalive: false,
            ..config
        };
        assert!(config.validate().is_ok());
    }
}
