//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::repeater::DEFAULT_POOL_SIZE;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Where packets are received.
    pub listener: ListenerConfig,

    /// Where packets are repeated to.
    pub repeater: RepeaterSettings,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Packet listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address.
    pub address: IpAddr,

    /// Listen port.
    pub port: u16,

    /// Largest datagram accepted; longer ones are truncated.
    pub max_datagram_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8125,
            max_datagram_size: 65535,
        }
    }
}

impl ListenerConfig {
    /// Create a listener config on `port`, bound to all interfaces.
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    /// Set the bind address.
    #[must_use]
    pub fn with_address(mut self, address: IpAddr) -> Self {
        self.address = address;
        self
    }

    /// Get the socket address.
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

/// Outbound transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Datagrams over an IPv4 socket (default).
    #[default]
    Udp4,
    /// Datagrams over an IPv6 socket.
    Udp6,
    /// Pooled stream connections.
    Tcp,
}

impl TransportMode {
    /// Configuration name of the transport.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Udp4 => "udp4",
            Self::Udp6 => "udp6",
            Self::Tcp => "tcp",
        }
    }
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Repeater settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepeaterSettings {
    /// Outbound transport.
    pub transport: TransportMode,

    /// Log matched lines and delivery errors.
    pub debug: bool,

    /// Maximum live connections per destination (tcp only).
    pub pool_size: usize,

    /// Destinations, in delivery order.
    pub destinations: Vec<DestinationConfig>,
}

impl Default for RepeaterSettings {
    fn default() -> Self {
        Self {
            transport: TransportMode::default(),
            debug: false,
            pool_size: DEFAULT_POOL_SIZE,
            destinations: Vec::new(),
        }
    }
}

impl RepeaterSettings {
    /// Create settings for `transport` with no destinations.
    #[must_use]
    pub fn new(transport: TransportMode) -> Self {
        Self {
            transport,
            ..Self::default()
        }
    }

    /// Add a destination.
    #[must_use]
    pub fn with_destination(mut self, destination: DestinationConfig) -> Self {
        self.destinations.push(destination);
        self
    }

    /// Enable or disable debug reporting.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set the per-destination pool size.
    #[must_use]
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }
}

/// A destination entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Remote host name or address.
    pub host: String,

    /// Remote port.
    pub port: u16,

    /// Regular expressions selecting the lines this destination receives.
    /// Without rules the destination receives nothing.
    #[serde(default, alias = "regexp")]
    pub rules: Vec<String>,
}

impl DestinationConfig {
    /// Create a destination entry without rules.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            rules: Vec::new(),
        }
    }

    /// Append a rule.
    #[must_use]
    pub fn with_rule(mut self, pattern: &str) -> Self {
        self.rules.push(pattern.to_string());
        self
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: LogLevel,

    /// Log format (json, pretty, compact).
    pub format: LogFormat,

    /// Output destination.
    pub output: LogOutput,
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level (most verbose).
    Trace,
    /// Debug level.
    Debug,
    /// Info level (default).
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level (least verbose).
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (machine-readable).
    Json,
    /// Pretty format with colors (default).
    #[default]
    Pretty,
    /// Compact single-line format.
    Compact,
}

/// Log output destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    /// Standard output (default).
    #[default]
    Stdout,
    /// Standard error.
    Stderr,
}
