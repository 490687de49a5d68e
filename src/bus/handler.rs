//! Handlers that can be attached to the [`EventBus`](super::EventBus)

use super::event::{DerivedEvent, DispatchEvent, ErrorEvent, ErrorKind, FeedEvent};
use super::EventPublisher;
use crate::error::Result;
use crate::payload::Payload;
use crate::types::MessageKind;
use crossbeam_channel::{bounded, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

/// Queue depth for a background handler's pending jobs
const BACKGROUND_QUEUE: usize = 64;

/// Something that reacts to bus events on the consumer thread
pub trait Handler: Send {
    /// Name used in logs
    fn name(&self) -> &str {
        "handler"
    }

    fn handle(&mut self, event: &FeedEvent);
}

impl<F> Handler for F
where
    F: FnMut(&FeedEvent) + Send,
{
    fn handle(&mut self, event: &FeedEvent) {
        self(event)
    }
}

/// A visual consumer of decoded payloads
#[cfg_attr(test, mockall::automock)]
pub trait Renderer: Send {
    fn name(&self) -> String;

    fn render(&mut self, kind: MessageKind, payload: &Payload);
}

/// Identifies an attached renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RendererId(u64);

/// Renderers that can be attached or detached while the bus is running
#[derive(Clone, Default)]
pub struct RendererSet {
    renderers: Arc<Mutex<Vec<(RendererId, Box<dyn Renderer>)>>>,
    next_id: Arc<AtomicU64>,
}

impl RendererSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(RendererId, Box<dyn Renderer>)>> {
        self.renderers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn attach(&self, renderer: Box<dyn Renderer>) -> RendererId {
        let id = RendererId(self.next_id.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(renderer = %renderer.name(), "Renderer attached");
        self.lock().push((id, renderer));
        id
    }

    pub fn detach(&self, id: RendererId) -> Option<Box<dyn Renderer>> {
        let mut renderers = self.lock();
        let idx = renderers.iter().position(|(rid, _)| *rid == id)?;
        let (_, renderer) = renderers.remove(idx);
        tracing::debug!(renderer = %renderer.name(), "Renderer detached");
        Some(renderer)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render on every attached renderer, in attach order
    pub fn render_all(&self, kind: MessageKind, payload: &Payload) -> usize {
        let mut renderers = self.lock();
        for (_, renderer) in renderers.iter_mut() {
            renderer.render(kind, payload);
        }
        renderers.len()
    }
}

impl std::fmt::Debug for RendererSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererSet")
            .field("renderers", &self.len())
            .finish()
    }
}

/// Forwards dispatch events to a [`RendererSet`]
pub struct RendererHandler {
    renderers: RendererSet,
}

impl RendererHandler {
    pub fn new(renderers: RendererSet) -> Self {
        Self { renderers }
    }
}

impl Handler for RendererHandler {
    fn name(&self) -> &str {
        "renderers"
    }

    fn handle(&mut self, event: &FeedEvent) {
        if let FeedEvent::Dispatch(ev) = event {
            self.renderers.render_all(ev.kind, &ev.payload);
        }
    }
}

/// Runs a job per dispatch event on its own thread.
///
/// Results come back through the bus as [`FeedEvent::Derived`], so the
/// consumer thread never waits on the computation. Jobs beyond the queue
/// depth are dropped with a warning.
pub struct BackgroundHandler {
    name: String,
    jobs: Option<Sender<DispatchEvent>>,
    worker: Option<JoinHandle<()>>,
}

impl BackgroundHandler {
    pub fn spawn<F>(name: impl Into<String>, publisher: EventPublisher, mut job: F) -> Result<Self>
    where
        F: FnMut(&DispatchEvent) -> Result<serde_json::Value> + Send + 'static,
    {
        let name = name.into();
        let (tx, rx) = bounded::<DispatchEvent>(BACKGROUND_QUEUE);
        let producer = name.clone();

        let worker = std::thread::Builder::new()
            .name(format!("job-{}", name))
            .spawn(move || {
                for event in rx {
                    let outcome = match job(&event) {
                        Ok(value) => FeedEvent::Derived(DerivedEvent {
                            source_kind: event.kind,
                            producer: producer.clone(),
                            value,
                        }),
                        Err(e) => {
                            tracing::warn!(job = %producer, kind = %event.kind, "Job failed: {}", e);
                            FeedEvent::Error(ErrorEvent {
                                error_kind: ErrorKind::JobFailed,
                                message_kind: Some(event.kind),
                                origin: event.origin,
                                topic: event.topic.clone(),
                                detail: e.to_string(),
                            })
                        }
                    };
                    publisher.publish(outcome);
                }
                tracing::debug!(job = %producer, "Job thread exiting");
            })?;

        Ok(Self {
            name,
            jobs: Some(tx),
            worker: Some(worker),
        })
    }
}

impl Handler for BackgroundHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&mut self, event: &FeedEvent) {
        let FeedEvent::Dispatch(ev) = event else {
            return;
        };
        let Some(jobs) = &self.jobs else {
            return;
        };
        match jobs.try_send(ev.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!(job = %self.name, "Job queue full, skipping event");
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::error!(job = %self.name, "Job thread is gone");
                self.jobs = None;
            }
        }
    }
}

impl Drop for BackgroundHandler {
    fn drop(&mut self) {
        // Closing the queue ends the job loop
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!(job = %self.name, "Job thread panicked");
            }
        }
    }
}

/// Logs every event it sees
#[derive(Debug, Default)]
pub struct LoggingHandler {
    seen: u64,
}

impl LoggingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self) -> u64 {
        self.seen
    }
}

impl Handler for LoggingHandler {
    fn name(&self) -> &str {
        "logging"
    }

    fn handle(&mut self, event: &FeedEvent) {
        self.seen += 1;
        match event {
            FeedEvent::Dispatch(ev) => tracing::info!(
                origin = %ev.origin,
                topic = ev.topic.as_deref().unwrap_or("-"),
                "{}",
                ev.payload.summary()
            ),
            FeedEvent::Error(ev) => tracing::warn!(
                origin = %ev.origin,
                kind = ?ev.error_kind,
                "{}",
                ev.detail
            ),
            FeedEvent::Status(ev) => tracing::info!(
                endpoint = %ev.endpoint,
                generation = ev.generation,
                "Connection {}",
                ev.status
            ),
            FeedEvent::Derived(ev) => tracing::debug!(
                producer = %ev.producer,
                kind = %ev.source_kind,
                "Derived result ready"
            ),
        }
    }
}
