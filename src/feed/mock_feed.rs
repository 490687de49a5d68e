//! In-process feed for testing and demo mode
//!
//! [`MockFeedConnector`] stands in for a ZeroMQ publisher. Frames pushed with
//! [`MockFeedConnector::publish`] are delivered to whichever socket is open,
//! filtered by the socket's subscription prefix the same way a SUB socket
//! filters on the leading frame.
//!
//! # Fault injection
//!
//! - [`MockFeedConnector::fail_next_connect`] - the next connect returns a transport error
//! - [`MockFeedConnector::fail_next_receive`] - the next receive returns a transport error
//! - [`MockFeedConnector::set_connect_delay`] - connects take this long to complete
//!
//! # Enabling
//!
//! Only available with the `mock-feed` feature (on by default):
//!
//! ```bash
//! cargo run -- --mock
//! ```

use super::socket::{FeedConnector, FeedFrame, FeedSocket};
use crate::config::FeedConfig;
use crate::error::{FeedError, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct MockFeedShared {
    live_sockets: AtomicUsize,
    peak_live_sockets: AtomicUsize,
    connects: AtomicUsize,
    fail_connect: AtomicBool,
    fail_receive: AtomicBool,
    connect_delay_ms: AtomicU64,
}

/// Loopback connector
#[derive(Debug, Clone)]
pub struct MockFeedConnector {
    sender: Sender<FeedFrame>,
    receiver: Receiver<FeedFrame>,
    shared: Arc<MockFeedShared>,
}

impl Default for MockFeedConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFeedConnector {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            shared: Arc::new(MockFeedShared::default()),
        }
    }

    /// Publish a two-part message (topic, payload)
    pub fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>) {
        self.publish_frame(FeedFrame::with_topic(topic.as_bytes().to_vec(), payload));
    }

    pub fn publish_frame(&self, frame: FeedFrame) {
        // The connector owns a receiver, so the channel cannot be closed
        let _ = self.sender.send(frame);
    }

    /// Frames published but not yet received by any socket
    pub fn backlog(&self) -> usize {
        self.receiver.len()
    }

    pub fn fail_next_connect(&self) {
        self.shared.fail_connect.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_receive(&self) {
        self.shared.fail_receive.store(true, Ordering::SeqCst);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        self.shared
            .connect_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Sockets currently open
    pub fn live_sockets(&self) -> usize {
        self.shared.live_sockets.load(Ordering::SeqCst)
    }

    /// Highest number of sockets ever open at the same time
    pub fn peak_live_sockets(&self) -> usize {
        self.shared.peak_live_sockets.load(Ordering::SeqCst)
    }

    /// Successful connects so far
    pub fn connect_count(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }
}

impl FeedConnector for MockFeedConnector {
    fn name(&self) -> &str {
        "mock"
    }

    fn connect(&self, config: &FeedConfig, timeout: Duration) -> Result<Box<dyn FeedSocket>> {
        let delay = Duration::from_millis(self.shared.connect_delay_ms.load(Ordering::SeqCst));
        if !delay.is_zero() {
            std::thread::sleep(delay.min(timeout));
            if delay > timeout {
                return Err(FeedError::Transport(format!(
                    "connect to {} timed out after {:?}",
                    config.endpoint, timeout
                )));
            }
        }

        if self.shared.fail_connect.swap(false, Ordering::SeqCst) {
            return Err(FeedError::Transport(format!(
                "connection refused: {}",
                config.endpoint
            )));
        }

        let live = self.shared.live_sockets.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.peak_live_sockets.fetch_max(live, Ordering::SeqCst);
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(endpoint = %config.endpoint, live, "Mock socket opened");

        Ok(Box::new(MockFeedSocket {
            frames: self.receiver.clone(),
            prefix: config.subscription().as_bytes().to_vec(),
            shared: self.shared.clone(),
        }))
    }
}

struct MockFeedSocket {
    frames: Receiver<FeedFrame>,
    prefix: Vec<u8>,
    shared: Arc<MockFeedShared>,
}

impl MockFeedSocket {
    fn accepts(&self, frame: &FeedFrame) -> bool {
        self.prefix.is_empty()
            || frame
                .leading()
                .is_some_and(|lead| lead.starts_with(&self.prefix))
    }
}

impl FeedSocket for MockFeedSocket {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<FeedFrame>> {
        if self.shared.fail_receive.swap(false, Ordering::SeqCst) {
            return Err(FeedError::Transport("injected receive failure".into()));
        }

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.frames.recv_timeout(remaining) {
                Ok(frame) if self.accepts(&frame) => return Ok(Some(frame)),
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(FeedError::Transport("mock feed closed".into()))
                }
            }
        }
    }
}

impl Drop for MockFeedSocket {
    fn drop(&mut self) {
        self.shared.live_sockets.fetch_sub(1, Ordering::SeqCst);
    }
}
