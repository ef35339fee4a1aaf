//! TCP dispatcher: matched lines are written over pooled connections.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tracing::info;

use crate::module::MetricsPayload;

use super::destination::Destination;
use super::diagnostics::Diagnostics;
use super::error::RepeaterError;
use super::feed::Packet;
use super::matcher::match_lines;
use super::pool::{ConnectionPool, PoolStats, Reservation};

/// TCP dispatcher statistics.
#[derive(Debug, Clone, Default)]
pub struct TcpStats {
    /// Lines matched across all destinations.
    pub lines_matched: u64,

    /// Lines written successfully.
    pub lines_written: u64,

    /// Bytes written.
    pub bytes_written: u64,

    /// Failed writes.
    pub write_errors: u64,

    /// Lines dropped because no connection could be acquired.
    pub acquire_errors: u64,
}

#[derive(Default)]
struct TcpStatsInner {
    lines_matched: AtomicU64,
    lines_written: AtomicU64,
    bytes_written: AtomicU64,
    write_errors: AtomicU64,
    acquire_errors: AtomicU64,
}

/// Writes matched lines to each destination through its connection pool.
pub struct TcpDispatcher {
    /// One pool per destination, in destination order.
    pools: Vec<ConnectionPool>,

    diagnostics: Diagnostics,

    stats: Arc<TcpStatsInner>,
}

impl TcpDispatcher {
    /// Create a dispatcher with one pool of `pool_size` per destination.
    ///
    /// No connection is opened until a line needs one.
    #[must_use]
    pub fn new(
        destinations: Vec<Arc<Destination>>,
        pool_size: usize,
        diagnostics: Diagnostics,
    ) -> Self {
        let pools: Vec<ConnectionPool> = destinations
            .into_iter()
            .map(|destination| ConnectionPool::new(destination, pool_size))
            .collect();

        info!(destinations = pools.len(), pool_size, "TCP dispatcher created");

        Self {
            pools,
            diagnostics,
            stats: Arc::new(TcpStatsInner::default()),
        }
    }

    /// The per-destination pools, in destination order.
    #[must_use]
    pub fn pools(&self) -> &[ConnectionPool] {
        &self.pools
    }

    /// Write the lines of `packet` that match each destination.
    ///
    /// Each line is delivered by its own task (acquire, write, release), so
    /// lines for one destination compete for its pool concurrently. The
    /// acquisition is reserved before the task is spawned, so a later `stop`
    /// still delivers every line matched here. Returns once all deliveries
    /// have been scheduled.
    pub async fn process(&self, packet: &Packet) {
        for pool in &self.pools {
            match_lines(&packet.data, pool.destination().rules(), |line| {
                self.stats.lines_matched.fetch_add(1, Ordering::Relaxed);
                self.diagnostics.line_matched(pool.name(), &line);

                let reservation = match pool.reserve() {
                    Ok(reservation) => reservation,
                    Err(e) => {
                        self.stats.acquire_errors.fetch_add(1, Ordering::Relaxed);
                        self.diagnostics.report(&e);
                        return;
                    },
                };

                let pool = pool.clone();
                let stats = Arc::clone(&self.stats);
                let diagnostics = self.diagnostics;

                tokio::spawn(async move {
                    send_line(&pool, reservation, line, &stats, diagnostics).await;
                });
            });
        }
    }

    /// Drain every pool, one destination at a time, in destination order.
    pub async fn stop(&self) {
        for pool in &self.pools {
            pool.drain().await;
        }
        info!("TCP dispatcher stopped");
    }

    /// Pool statistics in destination order.
    #[must_use]
    pub fn pool_stats(&self) -> Vec<PoolStats> {
        self.pools.iter().map(ConnectionPool::stats).collect()
    }

    /// Get dispatcher statistics.
    #[must_use]
    pub fn stats(&self) -> TcpStats {
        TcpStats {
            lines_matched: self.stats.lines_matched.load(Ordering::Relaxed),
            lines_written: self.stats.lines_written.load(Ordering::Relaxed),
            bytes_written: self.stats.bytes_written.load(Ordering::Relaxed),
            write_errors: self.stats.write_errors.load(Ordering::Relaxed),
            acquire_errors: self.stats.acquire_errors.load(Ordering::Relaxed),
        }
    }

    /// Export statistics as metrics.
    #[must_use]
    pub fn metrics(&self) -> MetricsPayload {
        let stats = self.stats();
        let mut metrics = MetricsPayload::new();
        metrics.counter("lines_matched", stats.lines_matched);
        metrics.counter("lines_written", stats.lines_written);
        metrics.counter("bytes_written", stats.bytes_written);
        metrics.counter("write_errors", stats.write_errors);
        metrics.counter("acquire_errors", stats.acquire_errors);

        let pools = self.pool_stats();
        metrics.counter(
            "connections_created",
            pools.iter().map(|p| p.total_created).sum(),
        );
        metrics.counter(
            "connect_errors",
            pools.iter().map(|p| p.connect_errors).sum(),
        );
        metrics.gauge(
            "live_connections",
            pools.iter().map(PoolStats::live_connections).sum::<u64>() as f64,
        );
        metrics
    }
}

/// Acquire a connection, write one line, and release the connection.
///
/// The connection goes back to the pool whether or not the write succeeded.
async fn send_line(
    pool: &ConnectionPool,
    reservation: Reservation,
    line: Bytes,
    stats: &TcpStatsInner,
    diagnostics: Diagnostics,
) {
    let mut conn = match pool.acquire_reserved(reservation).await {
        Ok(conn) => conn,
        Err(e) => {
            stats.acquire_errors.fetch_add(1, Ordering::Relaxed);
            diagnostics.report(&e);
            return;
        },
    };

    match conn.write_all(&line).await {
        Ok(()) => {
            stats.lines_written.fetch_add(1, Ordering::Relaxed);
            stats
                .bytes_written
                .fetch_add(line.len() as u64, Ordering::Relaxed);
        },
        Err(source) => {
            stats.write_errors.fetch_add(1, Ordering::Relaxed);
            diagnostics.report(&RepeaterError::WriteError {
                destination: pool.name().to_string(),
                source,
            });
        },
    }

    pool.release(conn).await;
}
