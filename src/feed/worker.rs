//! Feed worker thread
//!
//! One worker per connection. It opens the socket, reports readiness, then
//! loops on a timed receive until told to stop. Nothing that happens to a
//! single message may end the loop: processing runs under `catch_unwind`
//! and receive errors back off and retry.
//!
//! No single receive or backoff sleep lasts longer than half the join
//! timeout, so a stop request is always seen before the caller gives up
//! waiting, whatever the configured poll interval.

use super::socket::{FeedConnector, FeedFrame, FeedSocket};
use super::state::{ConnectionState, StopMode};
use crate::bus::{ErrorEvent, EventPublisher, FeedEvent, StatusEvent};
use crate::config::{ConnectionConfig, FeedConfig};
use crate::error::Result;
use crate::processor::MessageProcessor;
use crate::types::{ConnectionStatus, FeedCounters};
use crossbeam_channel::Sender;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub(crate) struct FeedWorker {
    pub generation: u64,
    pub config: FeedConfig,
    pub settings: ConnectionConfig,
    pub connector: Arc<dyn FeedConnector>,
    pub processor: Arc<MessageProcessor>,
    pub publisher: EventPublisher,
    pub state: Arc<ConnectionState>,
    pub stop: Arc<AtomicU8>,
}

/// Marks the connection disconnected however the worker exits
struct ExitGuard {
    generation: u64,
    endpoint: String,
    state: Arc<ConnectionState>,
    publisher: EventPublisher,
    done: Sender<()>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let reason = std::thread::panicking().then(|| "worker panicked".to_string());
        if self
            .state
            .transition(self.generation, None, ConnectionStatus::Disconnected)
        {
            self.publisher.publish(FeedEvent::Status(StatusEvent {
                status: ConnectionStatus::Disconnected,
                generation: self.generation,
                endpoint: self.endpoint.clone(),
                reason,
            }));
        }
        let _ = self.done.send(());
        tracing::debug!(generation = self.generation, "Feed worker exited");
    }
}

/// Receive timeout for one loop iteration: the poll interval, capped at half
/// the join timeout
pub(crate) fn recv_slice(poll_interval: Duration, join_timeout: Duration) -> Duration {
    poll_interval
        .min(join_timeout / 2)
        .max(Duration::from_millis(1))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl FeedWorker {
    /// Start the worker thread.
    ///
    /// `ready` receives the outcome of the connect attempt; `done` receives a
    /// unit once the worker has released its socket.
    pub fn spawn(
        self,
        ready: Sender<Result<()>>,
        done: Sender<()>,
    ) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name(format!("feed-worker-{}", self.generation))
            .spawn(move || self.run(ready, done))
    }

    fn stop_mode(&self) -> StopMode {
        StopMode::from_u8(self.stop.load(Ordering::SeqCst))
    }

    /// Longest single blocking wait inside the loop
    fn wait_slice(&self) -> Duration {
        recv_slice(self.config.poll_interval(), self.settings.join_timeout())
    }

    /// Sleep for the fault backoff, returning early on a stop request
    fn backoff(&self) {
        let deadline = Instant::now() + self.settings.fault_backoff();
        while self.stop_mode() == StopMode::Run {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            std::thread::sleep(remaining.min(self.wait_slice()));
        }
    }

    fn counters(&self) -> &FeedCounters {
        self.processor.counters()
    }

    fn run(self, ready: Sender<Result<()>>, done: Sender<()>) {
        let _guard = ExitGuard {
            generation: self.generation,
            endpoint: self.config.endpoint.clone(),
            state: self.state.clone(),
            publisher: self.publisher.clone(),
            done,
        };

        tracing::info!(
            generation = self.generation,
            endpoint = %self.config.endpoint,
            connector = self.connector.name(),
            "Feed worker starting"
        );

        let socket = match self
            .connector
            .connect(&self.config, self.settings.connect_timeout())
        {
            Ok(socket) => socket,
            Err(e) => {
                tracing::error!(endpoint = %self.config.endpoint, "Connect failed: {}", e);
                let _ = ready.send(Err(e));
                return;
            }
        };

        if self.stop_mode() != StopMode::Run {
            // Connect outlived the caller's wait
            return;
        }

        let status = if self.state.is_enabled() {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Paused
        };
        if !self.state.transition(
            self.generation,
            Some(&[ConnectionStatus::Connecting]),
            status,
        ) {
            return;
        }
        // set_enabled may have flipped the flag while the status was Connecting
        let status = self.state.sync_enabled(self.generation).unwrap_or(status);
        self.publisher.publish(FeedEvent::Status(StatusEvent {
            status,
            generation: self.generation,
            endpoint: self.config.endpoint.clone(),
            reason: None,
        }));
        let _ = ready.send(Ok(()));

        self.poll(socket);
    }

    fn poll(&self, mut socket: Box<dyn FeedSocket>) {
        let slice = self.wait_slice();
        loop {
            if self.stop_mode() != StopMode::Run {
                break;
            }

            match socket.recv_timeout(slice) {
                Ok(None) => continue,
                Ok(Some(frame)) => {
                    if self.stop_mode() == StopMode::Abort {
                        tracing::debug!(generation = self.generation, "Discarding in-flight message");
                        break;
                    }
                    self.handle_frame(frame);
                }
                Err(e) => {
                    if self.stop_mode() != StopMode::Run {
                        break;
                    }
                    FeedCounters::incr(&self.counters().worker_faults);
                    tracing::warn!(generation = self.generation, "Receive failed: {}", e);
                    self.publisher
                        .publish(FeedEvent::Error(ErrorEvent::worker_fault(e.to_string())));
                    self.backoff();
                }
            }
        }
        drop(socket);
        tracing::info!(generation = self.generation, "Feed worker stopping");
    }

    fn handle_frame(&self, frame: FeedFrame) {
        FeedCounters::incr(&self.counters().received);

        if !self.state.is_enabled() {
            FeedCounters::incr(&self.counters().dropped_paused);
            tracing::trace!(generation = self.generation, "Paused, dropping message");
            return;
        }

        let Some(envelope) = frame.into_envelope() else {
            return;
        };

        let processor = &self.processor;
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| processor.process(&envelope))) {
            let message = panic_message(panic.as_ref());
            FeedCounters::incr(&self.counters().worker_faults);
            tracing::error!(
                generation = self.generation,
                topic = envelope.topic().unwrap_or("-"),
                "Message processing panicked: {}",
                message
            );
            self.publisher
                .publish(FeedEvent::Error(ErrorEvent::worker_fault(message)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(boxed.as_ref()), "static message");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(boxed.as_ref()), "owned message");

        let boxed: Box<dyn Any + Send> = Box::new(42u32);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }

    #[test]
    fn test_recv_slice_is_capped_by_join_timeout() {
        let ms = Duration::from_millis;
        assert_eq!(recv_slice(ms(250), ms(1000)), ms(250));
        assert_eq!(recv_slice(ms(3000), ms(200)), ms(100));
        assert_eq!(recv_slice(ms(10), ms(0)), ms(1));
    }
}
