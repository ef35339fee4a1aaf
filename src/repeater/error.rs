//! Repeater error types.

use thiserror::Error;

/// Errors that can occur while repeating packets.
#[derive(Debug, Error)]
pub enum RepeaterError {
    /// Failed to bind the outbound UDP socket.
    #[error("failed to bind outbound {transport} socket: {source}")]
    BindError {
        /// Transport the socket was bound for.
        transport: &'static str,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to send a datagram.
    #[error("failed to send datagram to {destination}: {source}")]
    SendError {
        /// The destination name (`host:port`).
        destination: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to connect to a destination.
    #[error("failed to connect to {destination}: {source}")]
    ConnectError {
        /// The destination name (`host:port`).
        destination: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a line to a pooled connection.
    #[error("failed to write to {destination}: {source}")]
    WriteError {
        /// The destination name (`host:port`).
        destination: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The pool is draining and accepts no new acquisitions.
    #[error("connection pool for {destination} is draining")]
    PoolDraining {
        /// The destination name (`host:port`).
        destination: String,
    },

    /// A filter rule failed to compile.
    #[error("invalid rule '{pattern}' for {destination}: {source}")]
    InvalidRule {
        /// The destination name (`host:port`).
        destination: String,
        /// The offending pattern.
        pattern: String,
        /// The regex compile error.
        #[source]
        source: regex::Error,
    },

    /// The dispatcher has been stopped.
    #[error("dispatcher is stopped")]
    Stopped,
}

/// Result type for repeater operations.
pub type RepeaterResult<T> = Result<T, RepeaterError>;
