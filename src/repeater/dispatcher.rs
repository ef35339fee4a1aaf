//! Transport strategy selection.

use std::sync::Arc;

use crate::config::{RepeaterSettings, TransportMode};
use crate::module::MetricsPayload;

use super::destination::Destination;
use super::diagnostics::Diagnostics;
use super::error::RepeaterResult;
use super::feed::Packet;
use super::tcp::TcpDispatcher;
use super::udp::UdpDispatcher;

/// The active delivery strategy. Chosen once, never switched.
pub enum Dispatcher {
    /// Stateless datagrams over a shared socket.
    Udp(UdpDispatcher),
    /// Pooled stream connections.
    Tcp(TcpDispatcher),
}

impl Dispatcher {
    /// Build the dispatcher for the configured transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the UDP socket cannot be bound.
    pub async fn from_settings(
        settings: &RepeaterSettings,
        destinations: Vec<Arc<Destination>>,
        diagnostics: Diagnostics,
    ) -> RepeaterResult<Self> {
        match settings.transport {
            TransportMode::Tcp => Ok(Self::Tcp(TcpDispatcher::new(
                destinations,
                settings.pool_size,
                diagnostics,
            ))),
            mode @ (TransportMode::Udp4 | TransportMode::Udp6) => Ok(Self::Udp(
                UdpDispatcher::bind(mode, destinations, diagnostics).await?,
            )),
        }
    }

    /// Name of the transport in use.
    #[must_use]
    pub fn transport(&self) -> &'static str {
        match self {
            Self::Udp(_) => "udp",
            Self::Tcp(_) => "tcp",
        }
    }

    /// Deliver the matching lines of one packet.
    pub async fn process(&self, packet: &Packet) {
        match self {
            Self::Udp(udp) => udp.process(packet).await,
            Self::Tcp(tcp) => tcp.process(packet).await,
        }
    }

    /// Release every resource the dispatcher holds.
    pub async fn stop(&self) {
        match self {
            Self::Udp(udp) => {
                udp.stop().await;
            },
            Self::Tcp(tcp) => tcp.stop().await,
        }
    }

    /// Dispatcher metrics.
    #[must_use]
    pub fn metrics(&self) -> MetricsPayload {
        match self {
            Self::Udp(udp) => udp.metrics(),
            Self::Tcp(tcp) => tcp.metrics(),
        }
    }
}
