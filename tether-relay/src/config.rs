use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

pub const LISTEN_ENV: &str = "TETHER_RELAY_LISTEN";
pub const HEARTBEAT_ENV: &str = "TETHER_RELAY_HEARTBEAT_SECS";

/// Default listen address
pub const DEFAULT_LISTEN: &str = "0.0.0.0:9090";

/// Heartbeat interval in seconds
pub const DEFAULT_HEARTBEAT_SECS: u64 = 30;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid TETHER_RELAY_LISTEN {0:?} (expected host:port)")]
    Listen(String),
    #[error("invalid TETHER_RELAY_HEARTBEAT_SECS {0:?} (expected a positive number of seconds)")]
    Heartbeat(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub listen: SocketAddr,
    /// How often the relay pings each connection to keep it alive.
    pub heartbeat_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 9090)),
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
        }
    }
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let listen = get(LISTEN_ENV).unwrap_or_else(|| DEFAULT_LISTEN.to_string());
        let listen: SocketAddr = listen
            .trim()
            .parse()
            .map_err(|_| ConfigError::Listen(listen.clone()))?;

        let heartbeat_interval = match get(HEARTBEAT_ENV) {
            None => Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => return Err(ConfigError::Heartbeat(raw)),
            },
        };

        Ok(Self {
            listen,
            heartbeat_interval,
        })
    }
}
