//! In-process typed event bus
//!
//! Publishers on any thread enqueue [`FeedEvent`]s onto a bounded crossbeam
//! channel. The single consumer thread that owns the [`EventBus`] drains that
//! queue and runs every matching [`Handler`] serially, in registration order.
//! Handler and renderer code therefore never runs concurrently with itself,
//! independent of which thread published the event.
//!
//! # Architecture
//!
//! - [`EventPublisher`] - Cloneable, `Send + Sync` enqueue handle; never blocks
//! - [`EventBus`] - Consumer-side registry and drain loop
//! - [`Handler`] - Something subscribed to one or more [`EventTopic`]s
//!
//! The subscriber list lives only on the consumer thread, so `publish` never
//! contends with `subscribe`.
//!
//! # Example
//!
//! ```ignore
//! use feedsift::bus::{EventBus, FeedEvent};
//! use feedsift::types::MessageKind;
//!
//! let mut bus = EventBus::with_capacity(1024);
//! bus.subscribe([MessageKind::FeatureCollection], |event: &FeedEvent| {
//!     tracing::info!(?event, "features arrived");
//! });
//!
//! let publisher = bus.publisher();
//! std::thread::spawn(move || { /* publisher.publish(...) */ });
//!
//! // Once per tick on the consumer thread
//! bus.dispatch_pending();
//! ```

pub mod event;
pub mod handler;

pub use event::{
    DerivedEvent, DispatchEvent, ErrorEvent, ErrorKind, EventTopic, FeedEvent, StatusEvent,
};
#[cfg(test)]
pub use handler::MockRenderer;
pub use handler::{
    BackgroundHandler, Handler, LoggingHandler, Renderer, RendererHandler, RendererId,
    RendererSet,
};

use crate::config::BusConfig;
use crate::types::{FeedCounters, MessageKind};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Enqueue handle usable from any thread
#[derive(Clone)]
pub struct EventPublisher {
    sender: Sender<FeedEvent>,
    counters: Arc<FeedCounters>,
}

impl EventPublisher {
    /// Queue an event for the consumer thread.
    ///
    /// Returns false if the event was dropped because the queue is full or
    /// the bus is gone. Never blocks.
    pub fn publish(&self, event: FeedEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                FeedCounters::incr(&self.counters.bus_overflow);
                tracing::warn!(topic = ?event.topic(), "Event bus full, dropping event");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!("Event bus closed, dropping event");
                false
            }
        }
    }

    /// Events waiting for the consumer
    pub fn pending(&self) -> usize {
        self.sender.len()
    }
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("pending", &self.sender.len())
            .finish()
    }
}

/// Identifies a subscription for later removal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    topics: HashSet<EventTopic>,
    handler: Box<dyn Handler>,
}

/// Consumer-side event registry
pub struct EventBus {
    subscriptions: Vec<Subscription>,
    receiver: Receiver<FeedEvent>,
    publisher: EventPublisher,
    next_id: u64,
}

impl EventBus {
    /// Create a bus sharing ingestion counters with the rest of the pipeline
    pub fn new(config: BusConfig, counters: Arc<FeedCounters>) -> Self {
        let (sender, receiver) = bounded(config.capacity.max(1));
        Self {
            subscriptions: Vec::new(),
            receiver,
            publisher: EventPublisher { sender, counters },
            next_id: 1,
        }
    }

    /// Create a standalone bus with the given queue capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(
            BusConfig {
                capacity,
                ..Default::default()
            },
            Arc::new(FeedCounters::default()),
        )
    }

    pub fn publisher(&self) -> EventPublisher {
        self.publisher.clone()
    }

    /// Subscribe a handler to dispatch events of the given kinds
    pub fn subscribe<H>(
        &mut self,
        kinds: impl IntoIterator<Item = MessageKind>,
        handler: H,
    ) -> SubscriptionId
    where
        H: Handler + 'static,
    {
        let topics = kinds
            .into_iter()
            .filter(|k| *k != MessageKind::Unknown)
            .map(EventTopic::Message);
        self.subscribe_topics(topics, handler)
    }

    /// Subscribe a handler to arbitrary topics (errors, status, derived results)
    pub fn subscribe_topics<H>(
        &mut self,
        topics: impl IntoIterator<Item = EventTopic>,
        handler: H,
    ) -> SubscriptionId
    where
        H: Handler + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;

        let topics: HashSet<EventTopic> = topics.into_iter().collect();
        tracing::debug!(
            handler = handler.name(),
            topics = topics.len(),
            "Handler subscribed"
        );
        self.subscriptions.push(Subscription {
            id,
            topics,
            handler: Box::new(handler),
        });
        id
    }

    /// Remove a subscription; returns false if it was not registered
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        before != self.subscriptions.len()
    }

    /// Number of handlers that would receive an event on `topic`
    pub fn subscriber_count(&self, topic: EventTopic) -> usize {
        self.subscriptions
            .iter()
            .filter(|s| s.topics.contains(&topic))
            .count()
    }

    /// Deliver one event synchronously to every matching handler.
    ///
    /// A panicking handler is logged and skipped; later handlers still run.
    pub fn deliver(&mut self, event: &FeedEvent) -> usize {
        let topic = event.topic();
        let mut delivered = 0;
        for sub in self.subscriptions.iter_mut() {
            if !sub.topics.contains(&topic) {
                continue;
            }
            let handler = &mut sub.handler;
            match catch_unwind(AssertUnwindSafe(|| handler.handle(event))) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    tracing::error!(handler = sub.handler.name(), ?topic, "Handler panicked");
                }
            }
        }
        delivered
    }

    /// Drain every queued event; returns how many were delivered
    pub fn dispatch_pending(&mut self) -> usize {
        let mut count = 0;
        while let Ok(event) = self.receiver.try_recv() {
            self.deliver(&event);
            count += 1;
        }
        count
    }

    /// Wait up to `timeout` for the next event, then drain the queue
    pub fn dispatch_timeout(&mut self, timeout: Duration) -> usize {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => {
                self.deliver(&event);
                1 + self.dispatch_pending()
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    /// Consumer loop: dispatch until `stop` is set
    pub fn run_until(&mut self, stop: &AtomicBool, tick: Duration) {
        tracing::info!("Event consumer started");
        while !stop.load(Ordering::SeqCst) {
            self.dispatch_timeout(tick);
        }
        // Deliver whatever was queued before the stop request
        self.dispatch_pending();
        tracing::info!("Event consumer stopped");
    }
}
