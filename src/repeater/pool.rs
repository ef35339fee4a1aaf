//! Per-destination pooling of outbound TCP connections.

use std::collections::VecDeque;
use std::io;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, trace};

use super::destination::Destination;
use super::error::{RepeaterError, RepeaterResult};

/// Default maximum number of live connections per destination.
pub const DEFAULT_POOL_SIZE: usize = 5;

/// A connection checked out of a [`ConnectionPool`].
///
/// Hand it back with [`ConnectionPool::release`]. Dropping it instead destroys
/// the connection and frees its slot.
pub struct PooledConnection {
    /// The underlying stream, taken on release.
    stream: Option<TcpStream>,

    /// Slot held while checked out.
    permit: Option<OwnedSemaphorePermit>,

    /// Pool-local connection id.
    id: u64,

    /// Owning pool, for accounting when dropped without release.
    pool: Arc<PoolInner>,
}

impl PooledConnection {
    /// Pool-local id of this connection.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Write the whole buffer to the connection.
    ///
    /// # Errors
    ///
    /// Returns the IO error of the failed write.
    pub async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self.stream.as_mut() {
            Some(stream) => stream.write_all(buf).await,
            None => Err(io::Error::from(io::ErrorKind::NotConnected)),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if self.stream.take().is_some() {
            self.pool.stats.active.fetch_sub(1, Ordering::Relaxed);
            self.pool.stats.destroyed.fetch_add(1, Ordering::Relaxed);
            debug!(
                destination = %self.pool.destination,
                id = self.id,
                "Connection dropped without release, destroyed"
            );
        }
    }
}

/// A claim on a future acquisition, taken before the acquiring task runs.
///
/// A drain that starts while reservations are outstanding waits for them to
/// be redeemed with [`ConnectionPool::acquire_reserved`] or dropped.
#[must_use = "a reservation holds off drain until it is redeemed or dropped"]
pub struct Reservation {
    pool: Arc<PoolInner>,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.pool.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.pool.pending_done.notify_waiters();
        }
    }
}

/// Statistics for a connection pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Total connections created.
    pub total_created: u64,

    /// Total acquisitions served from the idle set.
    pub total_reused: u64,

    /// Total connections destroyed.
    pub total_destroyed: u64,

    /// Failed connection attempts.
    pub connect_errors: u64,

    /// Connections waiting in the idle set.
    pub idle_connections: usize,

    /// Connections currently checked out.
    pub active_connections: usize,
}

impl PoolStats {
    /// Connections created and not yet destroyed.
    #[must_use]
    pub fn live_connections(&self) -> u64 {
        self.total_created.saturating_sub(self.total_destroyed)
    }
}

/// An idle connection waiting for reuse.
struct IdleConnection {
    id: u64,
    stream: TcpStream,
}

/// Inner statistics tracking.
#[derive(Default)]
struct PoolStatsInner {
    created: AtomicU64,
    reused: AtomicU64,
    destroyed: AtomicU64,
    connect_errors: AtomicU64,
    active: AtomicUsize,
    idle: AtomicUsize,
}

/// Shared pool state.
struct PoolInner {
    destination: Arc<Destination>,

    max_size: usize,

    /// One permit per connection that may be checked out.
    slots: Arc<Semaphore>,

    /// Connections available for reuse.
    idle: Mutex<VecDeque<IdleConnection>>,

    /// Set once drain begins; new acquisitions are refused from then on.
    draining: AtomicBool,

    /// Outstanding reservations.
    pending: AtomicUsize,

    /// Signalled when the last outstanding reservation goes away.
    pending_done: Notify,

    /// Serializes drains; `true` once a drain has completed.
    drained: Mutex<bool>,

    next_id: AtomicU64,

    stats: PoolStatsInner,
}

impl PoolInner {
    async fn destroy(&self, id: u64, mut stream: TcpStream) {
        if let Err(e) = stream.shutdown().await {
            trace!(destination = %self.destination, id, error = %e, "Shutdown failed");
        }
        self.stats.destroyed.fetch_add(1, Ordering::Relaxed);
        debug!(destination = %self.destination, id, "Connection destroyed");
    }
}

/// A bounded pool of lazily established connections to one destination.
///
/// At most `max_size` connections are alive at any time. Connections are
/// created on demand when no idle one is available, and handed to one holder
/// at a time. The pool never checks a connection's health before reuse.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Create an empty pool for `destination`.
    ///
    /// A `max_size` of zero is raised to one.
    #[must_use]
    pub fn new(destination: Arc<Destination>, max_size: usize) -> Self {
        let max_size = max_size.clamp(1, Semaphore::MAX_PERMITS);

        Self {
            inner: Arc::new(PoolInner {
                destination,
                max_size,
                slots: Arc::new(Semaphore::new(max_size)),
                idle: Mutex::new(VecDeque::new()),
                draining: AtomicBool::new(false),
                pending: AtomicUsize::new(0),
                pending_done: Notify::new(),
                drained: Mutex::new(false),
                next_id: AtomicU64::new(0),
                stats: PoolStatsInner::default(),
            }),
        }
    }

    /// The destination this pool connects to.
    #[must_use]
    pub fn destination(&self) -> &Destination {
        &self.inner.destination
    }

    /// Pool name (`host:port`).
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.destination.name()
    }

    /// Maximum number of live connections.
    #[must_use]
    pub fn max_size(&self) -> usize {
        self.inner.max_size
    }

    /// Returns `true` once a drain has begun.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.inner.draining.load(Ordering::SeqCst)
    }

    /// Reserve an acquisition to be made later, typically from a spawned task.
    ///
    /// # Errors
    ///
    /// Returns `RepeaterError::PoolDraining` once the pool is draining.
    pub fn reserve(&self) -> RepeaterResult<Reservation> {
        self.inner.pending.fetch_add(1, Ordering::SeqCst);
        let reservation = Reservation {
            pool: Arc::clone(&self.inner),
        };

        if self.is_draining() {
            return Err(self.draining_error());
        }
        Ok(reservation)
    }

    /// Check out a connection.
    ///
    /// Reuses an idle connection when one exists, otherwise connects a new one
    /// if the pool is below its bound. When the bound is reached the call
    /// waits, in arrival order, until a connection is released.
    ///
    /// # Errors
    ///
    /// Returns `RepeaterError::PoolDraining` once the pool is draining and
    /// `RepeaterError::ConnectError` if a new connection cannot be established.
    /// A failed connect is not retried and frees its slot.
    pub async fn acquire(&self) -> RepeaterResult<PooledConnection> {
        let reservation = self.reserve()?;
        self.acquire_reserved(reservation).await
    }

    /// Check out a connection against an earlier [`reserve`](Self::reserve).
    ///
    /// Served even if a drain has begun since the reservation was taken.
    ///
    /// # Errors
    ///
    /// Returns `RepeaterError::ConnectError` if a new connection cannot be
    /// established.
    pub async fn acquire_reserved(
        &self,
        reservation: Reservation,
    ) -> RepeaterResult<PooledConnection> {
        // Closed only after a drain completes, which waits for reservations.
        let permit = Arc::clone(&self.inner.slots)
            .acquire_owned()
            .await
            .map_err(|_| self.draining_error())?;
        // Holding the slot keeps the drain waiting from here on.
        drop(reservation);

        let reused = self.inner.idle.lock().await.pop_front();
        if let Some(IdleConnection { id, stream }) = reused {
            self.inner.stats.idle.fetch_sub(1, Ordering::Relaxed);
            self.inner.stats.active.fetch_add(1, Ordering::Relaxed);
            self.inner.stats.reused.fetch_add(1, Ordering::Relaxed);
            trace!(destination = %self.inner.destination, id, "Reusing pooled connection");
            return Ok(self.checked_out(id, stream, permit));
        }

        self.create(permit).await
    }

    /// Connect a new stream while holding `permit`.
    async fn create(&self, permit: OwnedSemaphorePermit) -> RepeaterResult<PooledConnection> {
        let destination = &self.inner.destination;

        match TcpStream::connect((destination.host(), destination.port())).await {
            Ok(stream) => {
                let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                self.inner.stats.created.fetch_add(1, Ordering::Relaxed);
                self.inner.stats.active.fetch_add(1, Ordering::Relaxed);
                debug!(destination = %destination, id, "Created new connection");
                Ok(self.checked_out(id, stream, permit))
            },
            Err(source) => {
                self.inner
                    .stats
                    .connect_errors
                    .fetch_add(1, Ordering::Relaxed);
                drop(permit);
                Err(RepeaterError::ConnectError {
                    destination: destination.name().to_string(),
                    source,
                })
            },
        }
    }

    fn checked_out(
        &self,
        id: u64,
        stream: TcpStream,
        permit: OwnedSemaphorePermit,
    ) -> PooledConnection {
        PooledConnection {
            stream: Some(stream),
            permit: Some(permit),
            id,
            pool: Arc::clone(&self.inner),
        }
    }

    /// Return a connection to the pool.
    ///
    /// The connection becomes available to the next `acquire`, or is destroyed
    /// if the pool is draining.
    pub async fn release(&self, mut conn: PooledConnection) {
        let Some(stream) = conn.stream.take() else {
            return;
        };
        let permit = conn.permit.take();
        let id = conn.id;

        if !Arc::ptr_eq(&conn.pool, &self.inner) {
            conn.pool.stats.active.fetch_sub(1, Ordering::Relaxed);
            conn.pool.destroy(id, stream).await;
            return;
        }

        self.inner.stats.active.fetch_sub(1, Ordering::Relaxed);

        if self.is_draining() {
            self.inner.destroy(id, stream).await;
        } else {
            self.inner
                .idle
                .lock()
                .await
                .push_back(IdleConnection { id, stream });
            self.inner.stats.idle.fetch_add(1, Ordering::Relaxed);
            trace!(destination = %self.inner.destination, id, "Connection returned to pool");
        }

        // The slot frees only after the connection is back in the idle set.
        drop(permit);
    }

    /// Drain the pool.
    ///
    /// New acquisitions are refused from the moment this is called; callers
    /// already waiting for a slot and outstanding reservations are still
    /// served. Completes once every checked-out connection has been released
    /// and every connection has been destroyed. Calling it again after
    /// completion returns immediately.
    pub async fn drain(&self) {
        let mut drained = self.inner.drained.lock().await;
        if *drained {
            return;
        }

        self.inner.draining.store(true, Ordering::SeqCst);
        info!(destination = %self.inner.destination, "Draining connection pool");

        loop {
            let mut notified = pin!(self.inner.pending_done.notified());
            notified.as_mut().enable();
            if self.inner.pending.load(Ordering::SeqCst) == 0 {
                break;
            }
            notified.await;
        }

        // Queued acquirers are ahead of us, so this resolves once they and
        // every other holder have released.
        let permits = u32::try_from(self.inner.max_size).unwrap_or(u32::MAX);
        let held = self.inner.slots.acquire_many(permits).await;

        let idle: Vec<IdleConnection> = self.inner.idle.lock().await.drain(..).collect();
        self.inner.stats.idle.store(0, Ordering::Relaxed);

        let destroyed = idle.len();
        for conn in idle {
            self.inner.destroy(conn.id, conn.stream).await;
        }

        self.inner.slots.close();
        drop(held);
        *drained = true;

        info!(
            destination = %self.inner.destination,
            destroyed,
            "Connection pool drained"
        );
    }

    /// Get pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let stats = &self.inner.stats;
        // Destroyed first so a concurrent create/destroy cannot outrun created.
        let total_destroyed = stats.destroyed.load(Ordering::Relaxed);
        PoolStats {
            total_created: stats.created.load(Ordering::Relaxed),
            total_reused: stats.reused.load(Ordering::Relaxed),
            total_destroyed,
            connect_errors: stats.connect_errors.load(Ordering::Relaxed),
            idle_connections: stats.idle.load(Ordering::Relaxed),
            active_connections: stats.active.load(Ordering::Relaxed),
        }
    }

    fn draining_error(&self) -> RepeaterError {
        RepeaterError::PoolDraining {
            destination: self.name().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repeater::destination::RuleSet;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    /// Accepts connections and hands the server side of each to the test.
    async fn start_server() -> (SocketAddr, mpsc::UnboundedReceiver<TcpStream>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                if tx.send(stream).is_err() {
                    break;
                }
            }
        });

        (addr, rx)
    }

    async fn closed_port() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    }

    fn pool_for(addr: SocketAddr, max_size: usize) -> ConnectionPool {
        let destination = Destination::new(addr.ip().to_string(), addr.port(), RuleSet::default());
        ConnectionPool::new(Arc::new(destination), max_size)
    }

    #[tokio::test]
    async fn test_pool_create_connection() {
        let (addr, _server) = start_server().await;
        let pool = pool_for(addr, DEFAULT_POOL_SIZE);

        let conn = pool.acquire().await.unwrap();
        assert_eq!(conn.id(), 0);

        let stats = pool.stats();
        assert_eq!(stats.total_created, 1);
        assert_eq!(stats.active_connections, 1);
        assert_eq!(pool.name(), addr.to_string());
    }

    #[tokio::test]
    async fn test_pool_reuses_released_connection() {
        let (addr, _server) = start_server().await;
        let pool = pool_for(addr, DEFAULT_POOL_SIZE);

        let conn = pool.acquire().await.unwrap();
        let first_id = conn.id();
        pool.release(conn).await;

        let stats = pool.stats();
        assert_eq!(stats.idle_connections, 1);
        assert_eq!(stats.active_connections, 0);

        let conn = pool.acquire().await.unwrap();
        assert_eq!(conn.id(), first_id);

        let stats = pool.stats();
        assert_eq!(stats.total_created, 1);
        assert_eq!(stats.total_reused, 1);
    }

    #[tokio::test]
    async fn test_pool_bound_queues_extra_acquire() {
        let (addr, _server) = start_server().await;
        let pool = pool_for(addr, DEFAULT_POOL_SIZE);

        let mut held = Vec::new();
        for _ in 0..DEFAULT_POOL_SIZE {
            held.push(pool.acquire().await.unwrap());
        }
        assert_eq!(pool.stats().live_connections(), DEFAULT_POOL_SIZE as u64);

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());
        assert_eq!(pool.stats().total_created, DEFAULT_POOL_SIZE as u64);

        let released_id = held[0].id();
        pool.release(held.remove(0)).await;

        let conn = waiter.await.unwrap().unwrap();
        assert_eq!(conn.id(), released_id);

        let stats = pool.stats();
        assert_eq!(stats.total_created, DEFAULT_POOL_SIZE as u64);
        assert_eq!(stats.total_reused, 1);
        assert_eq!(stats.active_connections, DEFAULT_POOL_SIZE);
    }

    #[tokio::test]
    async fn test_pool_connect_error_surfaces() {
        let addr = closed_port().await;
        let pool = pool_for(addr, 1);

        let err = pool.acquire().await.err().unwrap();
        assert!(matches!(err, RepeaterError::ConnectError { .. }));

        // The failed attempt does not keep the only slot.
        let err = pool.acquire().await.err().unwrap();
        assert!(matches!(err, RepeaterError::ConnectError { .. }));

        let stats = pool.stats();
        assert_eq!(stats.connect_errors, 2);
        assert_eq!(stats.live_connections(), 0);
    }

    #[tokio::test]
    async fn test_pool_drop_without_release_destroys() {
        let (addr, _server) = start_server().await;
        let pool = pool_for(addr, 1);

        let conn = pool.acquire().await.unwrap();
        drop(conn);

        let stats = pool.stats();
        assert_eq!(stats.total_destroyed, 1);
        assert_eq!(stats.active_connections, 0);

        let _conn = pool.acquire().await.unwrap();
        assert_eq!(pool.stats().total_created, 2);
    }

    #[tokio::test]
    async fn test_pool_drain_destroys_idle() {
        let (addr, mut server) = start_server().await;
        let pool = pool_for(addr, DEFAULT_POOL_SIZE);

        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        pool.release(a).await;
        pool.release(b).await;

        pool.drain().await;

        let stats = pool.stats();
        assert_eq!(stats.live_connections(), 0);
        assert_eq!(stats.idle_connections, 0);
        assert_eq!(stats.total_destroyed, 2);

        // The remote side sees an orderly close.
        let mut remote = server.recv().await.unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(remote.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_pool_drain_waits_for_checked_out() {
        let (addr, _server) = start_server().await;
        let pool = pool_for(addr, DEFAULT_POOL_SIZE);

        let conn = pool.acquire().await.unwrap();

        let drain = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.drain().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!drain.is_finished());
        assert!(pool.is_draining());

        pool.release(conn).await;
        drain.await.unwrap();

        let stats = pool.stats();
        assert_eq!(stats.live_connections(), 0);
        assert_eq!(stats.idle_connections, 0);
    }

    #[tokio::test]
    async fn test_pool_refuses_acquire_while_draining() {
        let (addr, _server) = start_server().await;
        let pool = pool_for(addr, DEFAULT_POOL_SIZE);

        pool.drain().await;

        let err = pool.acquire().await.err().unwrap();
        assert!(matches!(err, RepeaterError::PoolDraining { .. }));
    }

    #[tokio::test]
    async fn test_pool_drain_is_idempotent() {
        let (addr, _server) = start_server().await;
        let pool = pool_for(addr, 2);

        let conn = pool.acquire().await.unwrap();
        pool.release(conn).await;

        pool.drain().await;
        pool.drain().await;

        assert_eq!(pool.stats().total_destroyed, 1);
    }

    #[tokio::test]
    async fn test_pool_drain_serves_outstanding_reservation() {
        let (addr, _server) = start_server().await;
        let pool = pool_for(addr, 1);

        let reservation = pool.reserve().unwrap();

        let drain = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.drain().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(pool.is_draining());
        assert!(!drain.is_finished());
        assert!(matches!(
            pool.reserve().err().unwrap(),
            RepeaterError::PoolDraining { .. }
        ));

        let conn = pool.acquire_reserved(reservation).await.unwrap();
        pool.release(conn).await;
        drain.await.unwrap();

        let stats = pool.stats();
        assert_eq!(stats.total_created, 1);
        assert_eq!(stats.live_connections(), 0);
    }

    #[tokio::test]
    async fn test_pool_drain_after_dropped_reservation() {
        let (addr, _server) = start_server().await;
        let pool = pool_for(addr, 1);

        let reservation = pool.reserve().unwrap();
        drop(reservation);

        tokio::time::timeout(Duration::from_secs(1), pool.drain())
            .await
            .unwrap();
        assert_eq!(pool.stats().total_created, 0);
    }

    #[test]
    fn test_live_connections_never_underflows() {
        let stats = PoolStats {
            total_created: 0,
            total_destroyed: 1,
            ..PoolStats::default()
        };
        assert_eq!(stats.live_connections(), 0);
    }
}
