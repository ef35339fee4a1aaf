//! UDP dispatcher: one shared socket, one datagram per matched line.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::TransportMode;
use crate::module::MetricsPayload;

use super::destination::Destination;
use super::diagnostics::Diagnostics;
use super::error::{RepeaterError, RepeaterResult};
use super::feed::Packet;
use super::matcher::match_lines;

/// UDP dispatcher statistics.
#[derive(Debug, Clone, Default)]
pub struct UdpStats {
    /// Lines matched across all destinations.
    pub lines_matched: u64,

    /// Datagrams sent.
    pub datagrams_sent: u64,

    /// Bytes sent.
    pub bytes_sent: u64,

    /// Failed sends.
    pub send_errors: u64,
}

#[derive(Default)]
struct UdpStatsInner {
    lines_matched: AtomicU64,
    datagrams_sent: AtomicU64,
    bytes_sent: AtomicU64,
    send_errors: AtomicU64,
}

/// Sends matched lines as independent datagrams over a shared socket.
pub struct UdpDispatcher {
    /// The shared socket; `None` once stopped.
    socket: RwLock<Option<Arc<UdpSocket>>>,

    local_addr: SocketAddr,

    destinations: Vec<Arc<Destination>>,

    diagnostics: Diagnostics,

    stats: Arc<UdpStatsInner>,
}

impl UdpDispatcher {
    /// Bind the outbound socket for `mode` (IPv6 for `udp6`, IPv4 otherwise).
    ///
    /// # Errors
    ///
    /// Returns `RepeaterError::BindError` if the socket cannot be bound.
    pub async fn bind(
        mode: TransportMode,
        destinations: Vec<Arc<Destination>>,
        diagnostics: Diagnostics,
    ) -> RepeaterResult<Self> {
        let bind_addr = match mode {
            TransportMode::Udp6 => "[::]:0",
            _ => "0.0.0.0:0",
        };

        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|source| RepeaterError::BindError {
                transport: mode.as_str(),
                source,
            })?;
        let local_addr = socket
            .local_addr()
            .map_err(|source| RepeaterError::BindError {
                transport: mode.as_str(),
                source,
            })?;

        info!(
            address = %local_addr,
            destinations = destinations.len(),
            "UDP dispatcher bound"
        );

        Ok(Self {
            socket: RwLock::new(Some(Arc::new(socket))),
            local_addr,
            destinations,
            diagnostics,
            stats: Arc::new(UdpStatsInner::default()),
        })
    }

    /// Local address of the outbound socket.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Send the lines of `packet` that match each destination.
    ///
    /// Every datagram is sent from its own task; this returns once all sends
    /// have been scheduled.
    pub async fn process(&self, packet: &Packet) {
        let Some(socket) = self.socket.read().await.clone() else {
            self.diagnostics.report(&RepeaterError::Stopped);
            return;
        };

        for destination in &self.destinations {
            match_lines(&packet.data, destination.rules(), |line| {
                self.stats.lines_matched.fetch_add(1, Ordering::Relaxed);
                self.diagnostics.line_matched(destination.name(), &line);

                let socket = Arc::clone(&socket);
                let destination = Arc::clone(destination);
                let stats = Arc::clone(&self.stats);
                let diagnostics = self.diagnostics;

                tokio::spawn(async move {
                    let target = (destination.host(), destination.port());
                    match socket.send_to(&line, target).await {
                        Ok(len) => {
                            stats.datagrams_sent.fetch_add(1, Ordering::Relaxed);
                            stats.bytes_sent.fetch_add(len as u64, Ordering::Relaxed);
                        },
                        Err(source) => {
                            stats.send_errors.fetch_add(1, Ordering::Relaxed);
                            diagnostics.report(&RepeaterError::SendError {
                                destination: destination.name().to_string(),
                                source,
                            });
                        },
                    }
                });
            });
        }
    }

    /// Close the shared socket.
    ///
    /// Returns `true` if this call closed it, `false` if it was already closed.
    /// Sends already in flight complete before the socket is released.
    pub async fn stop(&self) -> bool {
        let closed = self.socket.write().await.take().is_some();
        if closed {
            info!(address = %self.local_addr, "UDP dispatcher stopped");
        } else {
            debug!("UDP dispatcher already stopped");
        }
        closed
    }

    /// Returns `true` once the socket has been closed.
    pub async fn is_stopped(&self) -> bool {
        self.socket.read().await.is_none()
    }

    /// Get dispatcher statistics.
    #[must_use]
    pub fn stats(&self) -> UdpStats {
        UdpStats {
            lines_matched: self.stats.lines_matched.load(Ordering::Relaxed),
            datagrams_sent: self.stats.datagrams_sent.load(Ordering::Relaxed),
            bytes_sent: self.stats.bytes_sent.load(Ordering::Relaxed),
            send_errors: self.stats.send_errors.load(Ordering::Relaxed),
        }
    }

    /// Export statistics as metrics.
    #[must_use]
    pub fn metrics(&self) -> MetricsPayload {
        let stats = self.stats();
        let mut metrics = MetricsPayload::new();
        metrics.counter("lines_matched", stats.lines_matched);
        metrics.counter("datagrams_sent", stats.datagrams_sent);
        metrics.counter("bytes_sent", stats.bytes_sent);
        metrics.counter("send_errors", stats.send_errors);
        metrics.gauge("destinations", self.destinations.len() as f64);
        metrics
    }
}
