//! Packet feed: the channel the engine consumes and a UDP listener producing it.

use std::net::SocketAddr;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ListenerConfig;

use super::error::{RepeaterError, RepeaterResult};

/// A received packet and where it came from.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Raw packet bytes.
    pub data: Bytes,

    /// Origin address. Carried along, never used for routing.
    pub source: SocketAddr,
}

impl Packet {
    /// Create a packet.
    #[must_use]
    pub fn new(data: impl Into<Bytes>, source: SocketAddr) -> Self {
        Self {
            data: data.into(),
            source,
        }
    }
}

/// Sending half of a packet feed.
pub type PacketSender = mpsc::Sender<Packet>;

/// Receiving half of a packet feed, consumed by the engine.
pub type PacketFeed = mpsc::Receiver<Packet>;

/// Create a bounded packet feed.
#[must_use]
pub fn packet_channel(capacity: usize) -> (PacketSender, PacketFeed) {
    mpsc::channel(capacity)
}

/// A bound UDP socket turning datagrams into packets.
pub struct UdpPacketSource {
    socket: UdpSocket,
    local_addr: SocketAddr,
    max_datagram_size: usize,
}

impl UdpPacketSource {
    /// Bind the listener.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails.
    pub async fn bind(config: &ListenerConfig) -> RepeaterResult<Self> {
        let addr = config.socket_addr();
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| RepeaterError::BindError {
                transport: "listener",
                source,
            })?;
        let local_addr = socket
            .local_addr()
            .map_err(|source| RepeaterError::BindError {
                transport: "listener",
                source,
            })?;

        info!(address = %local_addr, "Packet listener bound");

        Ok(Self {
            socket,
            local_addr,
            max_datagram_size: config.max_datagram_size,
        })
    }

    /// The bound address.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Receive datagrams and push them into `sender` until the feed is closed.
    pub async fn run(self, sender: PacketSender) {
        let mut buf = vec![0u8; self.max_datagram_size];

        loop {
            tokio::select! {
                () = sender.closed() => break,
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, source)) => {
                        debug!(len, peer = %source, "Received packet");
                        let packet = Packet::new(Bytes::copy_from_slice(&buf[..len]), source);
                        if sender.send(packet).await.is_err() {
                            break;
                        }
                    },
                    Err(e) => warn!(error = %e, "Packet receive failed"),
                },
            }
        }

        debug!(address = %self.local_addr, "Packet listener stopped");
    }
}
