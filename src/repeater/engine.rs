//! The repeater engine: feed consumption and dispatcher lifecycle.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::{RepeaterSettings, TransportMode};
use crate::module::{MetricsPayload, ModuleStatus};

use super::destination::Destination;
use super::diagnostics::Diagnostics;
use super::dispatcher::Dispatcher;
use super::error::RepeaterResult;
use super::feed::PacketFeed;

/// Handle to a running repeater.
///
/// Created by [`RepeaterEngine::init`], which selects the transport and starts
/// consuming the packet feed. Each engine is independent; nothing is shared
/// between two engines in the same process.
pub struct RepeaterEngine {
    /// Current status.
    status: ModuleStatus,

    /// Transport chosen at init.
    transport: TransportMode,

    /// Active dispatcher; cleared by `stop`.
    dispatcher: Option<Arc<Dispatcher>>,

    /// Feed consumer task.
    feed_task: Option<JoinHandle<()>>,

    /// Shutdown signal sender for the feed consumer.
    shutdown_tx: Option<mpsc::Sender<()>>,

    /// Start time.
    started_at: Instant,
}

impl RepeaterEngine {
    /// Build the dispatcher for `settings` and start consuming `feed`.
    ///
    /// Packets are handed to the dispatcher in the order the feed delivers
    /// them.
    ///
    /// # Errors
    ///
    /// Returns an error if a rule does not compile or the outbound UDP socket
    /// cannot be bound.
    pub async fn init(settings: &RepeaterSettings, feed: PacketFeed) -> RepeaterResult<Self> {
        let diagnostics = Diagnostics::new(settings.debug);

        let destinations = settings
            .destinations
            .iter()
            .map(|config| Destination::from_config(config).map(Arc::new))
            .collect::<RepeaterResult<Vec<_>>>()?;
        let destination_count = destinations.len();

        let dispatcher =
            Arc::new(Dispatcher::from_settings(settings, destinations, diagnostics).await?);

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let feed_task = tokio::spawn(consume_feed(Arc::clone(&dispatcher), feed, shutdown_rx));

        info!(
            transport = settings.transport.as_str(),
            destinations = destination_count,
            debug = settings.debug,
            "Repeater engine started"
        );

        Ok(Self {
            status: ModuleStatus::Running,
            transport: settings.transport,
            dispatcher: Some(dispatcher),
            feed_task: Some(feed_task),
            shutdown_tx: Some(shutdown_tx),
            started_at: Instant::now(),
        })
    }

    /// Stop consuming the feed and release every socket and connection.
    ///
    /// Returns `true` once the stop sequence has completed, or `false` if the
    /// engine was already stopped, in which case nothing happens.
    pub async fn stop(&mut self) -> bool {
        let Some(dispatcher) = self.dispatcher.take() else {
            debug!("Repeater engine already stopped");
            return false;
        };

        info!(transport = dispatcher.transport(), "Stopping repeater engine");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.try_send(());
        }
        if let Some(task) = self.feed_task.take() {
            let _ = task.await;
        }

        dispatcher.stop().await;
        self.status = ModuleStatus::Stopped;

        info!("Repeater engine stopped");
        true
    }

    /// Stop the engine and invoke `on_stopped` once everything is released.
    ///
    /// The callback is not invoked if the engine was already stopped.
    pub async fn stop_with<F>(&mut self, on_stopped: F)
    where
        F: FnOnce(),
    {
        if self.stop().await {
            on_stopped();
        }
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> ModuleStatus {
        self.status.clone()
    }

    /// Transport chosen at init.
    #[must_use]
    pub fn transport(&self) -> TransportMode {
        self.transport
    }

    /// The active dispatcher, if the engine is running.
    #[must_use]
    pub fn dispatcher(&self) -> Option<&Dispatcher> {
        self.dispatcher.as_deref()
    }

    /// Engine metrics.
    #[must_use]
    pub fn metrics(&self) -> MetricsPayload {
        let mut metrics = self
            .dispatcher
            .as_ref()
            .map(|d| d.metrics())
            .unwrap_or_default();
        metrics.gauge(
            "uptime_seconds",
            self.started_at.elapsed().as_secs() as f64,
        );
        metrics.gauge(
            "running",
            if self.status.is_healthy() { 1.0 } else { 0.0 },
        );
        metrics
    }
}

/// Hand every packet to the dispatcher until shutdown or the feed closes.
///
/// On shutdown the feed is closed and packets already buffered in it are
/// still processed.
async fn consume_feed(
    dispatcher: Arc<Dispatcher>,
    mut feed: PacketFeed,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                feed.close();
                let mut flushed = 0usize;
                while let Ok(packet) = feed.try_recv() {
                    dispatcher.process(&packet).await;
                    flushed += 1;
                }
                debug!(flushed, "Packet feed closed on shutdown");
                break;
            },
            packet = feed.recv() => match packet {
                Some(packet) => dispatcher.process(&packet).await,
                None => {
                    debug!("Packet feed closed");
                    break;
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DestinationConfig;
    use crate::repeater::feed::{packet_channel, Packet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    fn udp_settings() -> RepeaterSettings {
        RepeaterSettings::new(TransportMode::Udp4)
            .with_destination(DestinationConfig::new("127.0.0.1", 9).with_rule("^foo"))
    }

    #[tokio::test]
    async fn test_engine_init_selects_transport() {
        let (_tx, feed) = packet_channel(4);
        let mut engine = RepeaterEngine::init(&udp_settings(), feed).await.unwrap();

        assert_eq!(engine.transport(), TransportMode::Udp4);
        assert!(matches!(engine.dispatcher(), Some(Dispatcher::Udp(_))));
        assert!(engine.status().is_healthy());

        engine.stop().await;
    }

    #[tokio::test]
    async fn test_engine_init_rejects_bad_rule() {
        let (_tx, feed) = packet_channel(4);
        let settings = RepeaterSettings::new(TransportMode::Tcp)
            .with_destination(DestinationConfig::new("127.0.0.1", 9).with_rule("[a-"));

        assert!(RepeaterEngine::init(&settings, feed).await.is_err());
    }

    #[tokio::test]
    async fn test_engine_second_stop_is_noop() {
        let (_tx, feed) = packet_channel(4);
        let mut engine = RepeaterEngine::init(&udp_settings(), feed).await.unwrap();

        assert!(engine.stop().await);
        assert!(engine.status().is_stopped());
        assert!(engine.dispatcher().is_none());
        assert!(!engine.stop().await);
    }

    #[tokio::test]
    async fn test_engine_stop_callback_fires_once() {
        let (_tx, feed) = packet_channel(4);
        let settings = RepeaterSettings::new(TransportMode::Tcp)
            .with_destination(DestinationConfig::new("127.0.0.1", 9).with_rule("^foo"));
        let mut engine = RepeaterEngine::init(&settings, feed).await.unwrap();

        let calls = AtomicUsize::new(0);
        engine
            .stop_with(|| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        engine
            .stop_with(|| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_engine_metrics() {
        let (_tx, feed) = packet_channel(4);
        let mut engine = RepeaterEngine::init(&udp_settings(), feed).await.unwrap();

        let metrics = engine.metrics();
        assert!(metrics.counters.contains_key("lines_matched"));
        assert_eq!(metrics.gauges.get("running"), Some(&1.0));

        engine.stop().await;
        assert_eq!(engine.metrics().gauges.get("running"), Some(&0.0));
    }

    #[tokio::test]
    async fn test_engine_stop_delivers_buffered_packets() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let reader = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            stream.read_to_end(&mut received).await.unwrap();
            received
        });

        let settings = RepeaterSettings::new(TransportMode::Tcp)
            .with_pool_size(1)
            .with_destination(DestinationConfig::new("127.0.0.1", port).with_rule("^foo"));
        let (tx, feed) = packet_channel(8);
        let mut engine = RepeaterEngine::init(&settings, feed).await.unwrap();

        let source = "127.0.0.1:40000".parse().unwrap();
        for data in [&b"foo:1|c"[..], b"foo:2|c", b"foo:3|c"] {
            tx.send(Packet::new(data, source)).await.unwrap();
        }
        assert!(engine.stop().await);

        let received = tokio::time::timeout(Duration::from_secs(2), reader)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, b"foo:1|c\nfoo:2|c\nfoo:3|c\n");
        assert!(tx.send(Packet::new(&b"foo:4|c"[..], source)).await.is_err());
    }
}
