//! # Repeater
//!
//! Fans incoming metric packets out to downstream destinations.
//!
//! Each packet is split into lines; every destination receives the lines that
//! match one of its regular-expression rules. Delivery uses one of two
//! transports, chosen when the engine starts:
//!
//! - **udp4 / udp6** - each matched line is sent as its own datagram from a
//!   single shared socket.
//! - **tcp** - each destination owns a bounded [`ConnectionPool`]; lines are
//!   written over lazily established connections that are reused between
//!   packets and drained on shutdown.
//!
//! Delivery is best effort. Failed sends are reported through [`Diagnostics`]
//! and dropped; nothing is retried or buffered.
//!
//! ## Configuration
//!
//! ```toml
//! [repeater]
//! transport = "tcp"
//! debug = false
//! pool_size = 5
//!
//! [[repeater.destinations]]
//! host = "10.0.0.5"
//! port = 8125
//! rules = ["^api\\.", "^db\\."]
//! ```

mod destination;
mod diagnostics;
mod dispatcher;
mod engine;
mod error;
mod feed;
mod matcher;
mod pool;
mod tcp;
mod udp;

pub use destination::{Destination, RuleSet};
pub use diagnostics::Diagnostics;
pub use dispatcher::Dispatcher;
pub use engine::RepeaterEngine;
pub use error::{RepeaterError, RepeaterResult};
pub use feed::{packet_channel, Packet, PacketFeed, PacketSender, UdpPacketSource};
pub use matcher::match_lines;
pub use pool::{ConnectionPool, PoolStats, PooledConnection, Reservation, DEFAULT_POOL_SIZE};
pub use tcp::{TcpDispatcher, TcpStats};
pub use udp::{UdpDispatcher, UdpStats};
