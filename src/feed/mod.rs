//! Live feed connection management
//!
//! [`FeedConnection`] owns at most one background worker reading a subscriber
//! socket. The worker forwards every received payload to the shared
//! [`MessageProcessor`], so messages reach bus handlers in the order they
//! arrived on the socket.
//!
//! # State machine
//!
//! ```text
//! Disconnected --establish--> Connecting --socket ready--> Connected
//! Connected <--set_enabled(false / true)--> Paused
//! Connected | Paused --terminate--> Disconnected
//! ```
//!
//! The worker shares exactly two things with callers: the enabled flag and
//! the status word. Both are atomics, so lifecycle calls never contend with
//! the receive loop.
//!
//! # Example
//!
//! ```ignore
//! use feedsift::config::FeedConfig;
//! use feedsift::feed::{FeedConnection, ZmqConnector};
//!
//! let connection = FeedConnection::new(
//!     Arc::new(ZmqConnector::new()),
//!     processor,
//!     bus.publisher(),
//!     Default::default(),
//! );
//! connection.establish(FeedConfig::new("tcp://localhost:5563"))?;
//! connection.set_enabled(false); // pause: incoming messages are dropped
//! connection.set_enabled(true);
//! connection.terminate(true);
//! ```

#[cfg(feature = "mock-feed")]
pub mod mock_feed;
pub mod socket;
mod state;
mod worker;
pub mod zmq;

#[cfg(feature = "mock-feed")]
pub use mock_feed::MockFeedConnector;
pub use socket::{FeedConnector, FeedFrame, FeedSocket};
pub use zmq::{ZmqConnector, ZmqFeedSocket};

use crate::bus::{EventPublisher, FeedEvent, StatusEvent};
use crate::config::{ConnectionConfig, FeedConfig};
use crate::error::{FeedError, Result};
use crate::processor::MessageProcessor;
use crate::types::{ConnectionStatus, FeedStats};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use state::{ConnectionState, StopMode};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use worker::FeedWorker;

/// Extra wait on top of the connect timeout before giving up on a worker
const READY_GRACE: Duration = Duration::from_millis(500);

struct ActiveWorker {
    generation: u64,
    endpoint: String,
    stop: Arc<AtomicU8>,
    done: Receiver<()>,
    handle: JoinHandle<()>,
}

/// Lifecycle owner for the live feed
pub struct FeedConnection {
    connector: Arc<dyn FeedConnector>,
    processor: Arc<MessageProcessor>,
    publisher: EventPublisher,
    settings: ConnectionConfig,
    state: Arc<ConnectionState>,
    /// Serializes establish/terminate; never touched by the worker
    active: Mutex<Option<ActiveWorker>>,
    /// Endpoint of the latest establish, for status events. Held only to copy.
    last_endpoint: Mutex<String>,
}

impl FeedConnection {
    pub fn new(
        connector: Arc<dyn FeedConnector>,
        processor: Arc<MessageProcessor>,
        publisher: EventPublisher,
        settings: ConnectionConfig,
    ) -> Self {
        Self {
            connector,
            processor,
            publisher,
            settings,
            state: Arc::new(ConnectionState::new(true)),
            active: Mutex::new(None),
            last_endpoint: Mutex::new(String::new()),
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveWorker>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn last_endpoint(&self) -> String {
        self.last_endpoint
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish_status(&self, generation: u64, endpoint: &str, reason: Option<String>) {
        self.publisher.publish(FeedEvent::Status(StatusEvent {
            status: self.state.status(),
            generation,
            endpoint: endpoint.to_string(),
            reason,
        }));
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.status()
    }

    pub fn is_enabled(&self) -> bool {
        self.state.is_enabled()
    }

    /// Generation of the most recent `establish`
    pub fn generation(&self) -> u64 {
        self.state.generation()
    }

    /// Endpoint of the running worker, if any
    pub fn endpoint(&self) -> Option<String> {
        self.lock_active().as_ref().map(|w| w.endpoint.clone())
    }

    pub fn stats(&self) -> FeedStats {
        self.processor.counters().snapshot()
    }

    /// Connect to `config.endpoint` and start the worker.
    ///
    /// Any existing connection is terminated first without draining. Returns
    /// once the socket is subscribed; a connect failure is returned here and
    /// leaves the connection `Disconnected`.
    pub fn establish(&self, config: FeedConfig) -> Result<()> {
        config.validate()?;

        let mut active = self.lock_active();
        if let Some(previous) = active.take() {
            tracing::info!(
                generation = previous.generation,
                "Replacing existing connection"
            );
            let endpoint = previous.endpoint.clone();
            self.stop_worker(previous, StopMode::Abort);
            self.force_disconnected(&endpoint, None);
        }

        let generation = self.state.begin();
        let endpoint = config.endpoint.clone();
        *self
            .last_endpoint
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = endpoint.clone();
        self.publish_status(generation, &endpoint, None);

        let stop = Arc::new(AtomicU8::new(StopMode::Run as u8));
        let (ready_tx, ready_rx) = bounded(1);
        let (done_tx, done_rx) = bounded(1);

        let worker = FeedWorker {
            generation,
            config,
            settings: self.settings,
            connector: self.connector.clone(),
            processor: self.processor.clone(),
            publisher: self.publisher.clone(),
            state: self.state.clone(),
            stop: stop.clone(),
        };

        let handle = match worker.spawn(ready_tx, done_tx) {
            Ok(handle) => handle,
            Err(e) => {
                self.force_disconnected(&endpoint, Some("worker spawn failed".into()));
                return Err(FeedError::WorkerFault(format!("failed to spawn worker: {}", e)));
            }
        };

        match ready_rx.recv_timeout(self.settings.connect_timeout() + READY_GRACE) {
            Ok(Ok(())) => {
                tracing::info!(generation, endpoint = %endpoint, "Feed connected");
                *active = Some(ActiveWorker {
                    generation,
                    endpoint,
                    stop,
                    done: done_rx,
                    handle,
                });
                Ok(())
            }
            Ok(Err(e)) => {
                // The worker has already released everything and is exiting
                let _ = handle.join();
                self.force_disconnected(&endpoint, Some(e.to_string()));
                Err(match e {
                    FeedError::Transport(_) => e,
                    other => FeedError::Transport(other.to_string()),
                })
            }
            Err(RecvTimeoutError::Timeout) => {
                stop.store(StopMode::Abort as u8, Ordering::SeqCst);
                self.force_disconnected(&endpoint, Some("connect timed out".into()));
                tracing::error!(
                    generation,
                    endpoint = %endpoint,
                    "Worker never became ready, detaching"
                );
                Err(FeedError::Timeout(format!(
                    "no connection to {} within {:?}",
                    endpoint,
                    self.settings.connect_timeout()
                )))
            }
            Err(RecvTimeoutError::Disconnected) => {
                // The worker died without reporting; its exit guard already ran
                if handle.join().is_err() {
                    tracing::error!(generation, "Feed worker panicked while connecting");
                }
                self.force_disconnected(&endpoint, Some("worker exited".into()));
                Err(FeedError::Channel(format!(
                    "worker for {} exited before reporting readiness",
                    endpoint
                )))
            }
        }
    }

    /// Stop the worker and close its socket.
    ///
    /// With `drain_first` the worker finishes processing a message it is
    /// holding; otherwise such a message is discarded. Blocks at most for the
    /// join timeout, and the status is `Disconnected` afterwards either way.
    pub fn terminate(&self, drain_first: bool) {
        let mode = if drain_first {
            StopMode::Drain
        } else {
            StopMode::Abort
        };
        let mut active = self.lock_active();
        let endpoint = match active.take() {
            Some(worker) => {
                let endpoint = worker.endpoint.clone();
                self.stop_worker(worker, mode);
                endpoint
            }
            None => String::new(),
        };
        self.force_disconnected(&endpoint, None);
    }

    /// Pause or resume forwarding. Never touches the socket, and never waits
    /// on an establish or terminate in progress.
    pub fn set_enabled(&self, enabled: bool) {
        self.state.set_enabled(enabled);
        let generation = self.state.generation();
        if let Some(status) = self.state.sync_enabled(generation) {
            tracing::info!(generation, "Feed {}", status);
            self.publish_status(generation, &self.last_endpoint(), None);
        }
    }

    fn stop_worker(&self, worker: ActiveWorker, mode: StopMode) {
        worker.stop.store(mode as u8, Ordering::SeqCst);
        match worker.done.recv_timeout(self.settings.join_timeout()) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    tracing::error!(generation = worker.generation, "Feed worker panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    generation = worker.generation,
                    timeout = ?self.settings.join_timeout(),
                    "Feed worker did not stop in time, detaching"
                );
            }
        }
    }

    fn force_disconnected(&self, endpoint: &str, reason: Option<String>) {
        let generation = self.state.generation();
        if self
            .state
            .transition(generation, None, ConnectionStatus::Disconnected)
        {
            tracing::info!(generation, "Feed disconnected");
            self.publish_status(generation, endpoint, reason);
        }
    }
}

impl Drop for FeedConnection {
    fn drop(&mut self) {
        self.terminate(false);
    }
}

impl std::fmt::Debug for FeedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedConnection")
            .field("connector", &self.connector.name())
            .field("status", &self.status())
            .field("enabled", &self.is_enabled())
            .field("generation", &self.generation())
            .finish()
    }
}

#[cfg(all(test, feature = "mock-feed"))]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::classifier::MessageClassifier;
    use crate::types::FeedCounters;
    use serial_test::serial;
    use std::time::Instant;

    fn setup() -> (EventBus, MockFeedConnector, FeedConnection) {
        let counters = Arc::new(FeedCounters::default());
        let bus = EventBus::new(Default::default(), counters.clone());
        let processor = Arc::new(MessageProcessor::new(
            MessageClassifier::default(),
            bus.publisher(),
            counters,
        ));
        let connector = MockFeedConnector::new();
        let settings = ConnectionConfig {
            connect_timeout_ms: 200,
            join_timeout_ms: 300,
            fault_backoff_ms: 5,
        };
        let connection = FeedConnection::new(
            Arc::new(connector.clone()),
            processor,
            bus.publisher(),
            settings,
        );
        (bus, connector, connection)
    }

    fn config() -> FeedConfig {
        FeedConfig::new("tcp://localhost:5563").with_poll_interval_ms(10)
    }

    fn wait_until(cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    #[serial]
    fn test_establish_and_terminate() {
        let (_bus, connector, connection) = setup();
        assert_eq!(connection.status(), ConnectionStatus::Disconnected);

        connection.establish(config()).unwrap();
        assert_eq!(connection.status(), ConnectionStatus::Connected);
        assert_eq!(connection.generation(), 1);
        assert_eq!(connector.live_sockets(), 1);

        connection.terminate(true);
        assert_eq!(connection.status(), ConnectionStatus::Disconnected);
        assert_eq!(connector.live_sockets(), 0);
        assert!(connection.endpoint().is_none());
    }

    #[test]
    #[serial]
    fn test_connect_failure_is_synchronous() {
        let (_bus, connector, connection) = setup();
        connector.fail_next_connect();
        let err = connection.establish(config()).unwrap_err();
        assert!(matches!(err, FeedError::Transport(_)));
        assert_eq!(connection.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    #[serial]
    fn test_invalid_config_rejected() {
        let (_bus, _connector, connection) = setup();
        assert!(connection.establish(FeedConfig::new("localhost")).is_err());
        assert_eq!(connection.status(), ConnectionStatus::Disconnected);
        assert_eq!(connection.generation(), 0);
    }

    #[test]
    #[serial]
    fn test_reestablish_replaces_worker() {
        let (_bus, connector, connection) = setup();
        connection.establish(config()).unwrap();
        connection.establish(config()).unwrap();
        assert_eq!(connection.generation(), 2);
        assert_eq!(connector.live_sockets(), 1);
        assert_eq!(connector.peak_live_sockets(), 1);
        connection.terminate(false);
    }

    #[test]
    #[serial]
    fn test_pause_and_resume() {
        let (_bus, connector, connection) = setup();
        connection.establish(config()).unwrap();

        connection.set_enabled(false);
        assert_eq!(connection.status(), ConnectionStatus::Paused);
        connection.set_enabled(false);
        assert_eq!(connection.status(), ConnectionStatus::Paused);

        connector.publish("ALL", br#"{"type":"ManifoldData","data":[]}"#.to_vec());
        assert!(wait_until(|| connection.stats().dropped_paused == 1));

        connection.set_enabled(true);
        assert_eq!(connection.status(), ConnectionStatus::Connected);
        connection.terminate(false);
    }

    #[test]
    #[serial]
    fn test_establish_while_disabled_starts_paused() {
        let (_bus, _connector, connection) = setup();
        connection.set_enabled(false);
        connection.establish(config()).unwrap();
        assert_eq!(connection.status(), ConnectionStatus::Paused);
        connection.terminate(false);
    }

    #[test]
    #[serial]
    fn test_receive_error_does_not_stop_worker() {
        let (_bus, connector, connection) = setup();
        connection.establish(config()).unwrap();

        connector.fail_next_receive();
        assert!(wait_until(|| connection.stats().worker_faults == 1));
        assert_eq!(connection.status(), ConnectionStatus::Connected);

        connector.publish("t", br#"{"type":"ManifoldData","data":[]}"#.to_vec());
        assert!(wait_until(|| connection.stats().dispatched == 1));
        connection.terminate(false);
    }

    #[test]
    #[serial]
    fn test_slow_connect_times_out() {
        let (_bus, connector, connection) = setup();
        connector.set_connect_delay(Duration::from_millis(400));

        let start = Instant::now();
        assert!(connection.establish(config()).is_err());
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(connection.status(), ConnectionStatus::Disconnected);
        assert_eq!(connector.live_sockets(), 0);
    }

    struct StallingConnector(Duration);

    impl FeedConnector for StallingConnector {
        fn name(&self) -> &str {
            "stalling"
        }

        fn connect(&self, config: &FeedConfig, _timeout: Duration) -> Result<Box<dyn FeedSocket>> {
            std::thread::sleep(self.0);
            Err(FeedError::Transport(format!("gave up on {}", config.endpoint)))
        }
    }

    struct PanickingConnector;

    impl FeedConnector for PanickingConnector {
        fn name(&self) -> &str {
            "panicking"
        }

        fn connect(&self, _config: &FeedConfig, _timeout: Duration) -> Result<Box<dyn FeedSocket>> {
            panic!("connector blew up");
        }
    }

    fn with_connector(connector: Arc<dyn FeedConnector>) -> (EventBus, FeedConnection) {
        let (bus, _mock, connection) = setup();
        let connection = FeedConnection::new(
            connector,
            connection.processor.clone(),
            bus.publisher(),
            connection.settings,
        );
        (bus, connection)
    }

    #[test]
    #[serial]
    fn test_unresponsive_connector_is_timeout() {
        let (_bus, connection) =
            with_connector(Arc::new(StallingConnector(Duration::from_millis(1500))));

        let start = Instant::now();
        let err = connection.establish(config()).unwrap_err();
        assert!(matches!(err, FeedError::Timeout(_)), "got {:?}", err);
        assert!(start.elapsed() < Duration::from_millis(1400));
        assert_eq!(connection.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    #[serial]
    fn test_worker_dying_before_ready_is_channel_error() {
        let (_bus, connection) = with_connector(Arc::new(PanickingConnector));

        let err = connection.establish(config()).unwrap_err();
        assert!(matches!(err, FeedError::Channel(_)), "got {:?}", err);
        assert_eq!(connection.status(), ConnectionStatus::Disconnected);
        assert!(connection.endpoint().is_none());
    }

    #[test]
    #[serial]
    fn test_set_enabled_does_not_wait_for_establish() {
        let (_bus, connector, connection) = setup();
        connector.set_connect_delay(Duration::from_millis(150));

        std::thread::scope(|scope| {
            let establishing = scope.spawn(|| connection.establish(config()));
            assert!(wait_until(|| connection.status() == ConnectionStatus::Connecting));

            let start = Instant::now();
            connection.set_enabled(false);
            assert!(start.elapsed() < Duration::from_millis(100));

            establishing.join().unwrap().unwrap();
        });

        assert_eq!(connection.status(), ConnectionStatus::Paused);
        connection.terminate(false);
    }
}
