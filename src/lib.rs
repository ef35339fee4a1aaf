//! # Line Repeater
//!
//! Repeats metric lines received as packets to downstream collectors,
//! choosing the recipients of each line with per-destination regular
//! expressions.
//!
//! ## Features
//!
//! - Line-level fan-out with ordered, per-destination rule sets
//! - UDP delivery (IPv4 or IPv6) with one datagram per matched line
//! - TCP delivery over bounded, lazily filled connection pools
//! - Graceful stop that drains every pool before returning
//! - TOML configuration with validation
//!
//! ## Architecture
//!
//! A [`repeater::RepeaterEngine`] consumes a [`repeater::PacketFeed`] and
//! hands each packet to a [`repeater::Dispatcher`] selected from the
//! configured transport. The bundled binary feeds the engine from a
//! [`repeater::UdpPacketSource`].

pub mod config;
pub mod logging;
pub mod module;
pub mod repeater;
