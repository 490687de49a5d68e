//! Application wiring
//!
//! [`FeedApp`] is the explicit context object that owns every pipeline
//! component. It is built once at startup and lives on the consumer thread;
//! the feed worker and file-import threads only see the shared
//! [`MessageProcessor`] and the bus publisher.

use crate::bus::{DispatchEvent, EventBus, EventPublisher, RendererHandler, RendererSet};
use crate::classifier::{MessageClassifier, ScanWindow};
use crate::config::AppConfig;
use crate::error::Result;
use crate::feed::{FeedConnection, FeedConnector, ZmqConnector};
use crate::processor::MessageProcessor;
use crate::types::{FeedCounters, FeedStats, MessageKind};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Owner of the classifier, processor, connection and bus
pub struct FeedApp {
    config: AppConfig,
    bus: EventBus,
    processor: Arc<MessageProcessor>,
    connection: Arc<FeedConnection>,
    renderers: RendererSet,
}

impl FeedApp {
    /// Build the pipeline around a ZeroMQ connector
    pub fn new(config: AppConfig) -> Self {
        Self::with_connector(config, Arc::new(ZmqConnector::new()))
    }

    /// Build the pipeline around any connector
    pub fn with_connector(config: AppConfig, connector: Arc<dyn FeedConnector>) -> Self {
        let counters = Arc::new(FeedCounters::default());
        let mut bus = EventBus::new(config.bus, counters.clone());

        let classifier = MessageClassifier::new(ScanWindow::from(config.classifier));
        let processor = Arc::new(MessageProcessor::new(
            classifier,
            bus.publisher(),
            counters,
        ));
        let connection = Arc::new(FeedConnection::new(
            connector,
            processor.clone(),
            bus.publisher(),
            config.connection,
        ));

        // Renderers may come and go; the handler stays subscribed to every kind
        let renderers = RendererSet::new();
        bus.subscribe(MessageKind::all(), RendererHandler::new(renderers.clone()));

        tracing::debug!(
            rules = processor.classifier().rules().len(),
            capacity = config.bus.capacity,
            "Pipeline wired"
        );

        Self {
            config,
            bus,
            processor,
            connection,
            renderers,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Bus for registering handlers
    pub fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    pub fn publisher(&self) -> EventPublisher {
        self.bus.publisher()
    }

    pub fn processor(&self) -> &Arc<MessageProcessor> {
        &self.processor
    }

    pub fn connection(&self) -> &Arc<FeedConnection> {
        &self.connection
    }

    pub fn renderers(&self) -> &RendererSet {
        &self.renderers
    }

    pub fn stats(&self) -> FeedStats {
        self.connection.stats()
    }

    /// Establish the configured feed connection
    pub fn connect(&self) -> Result<()> {
        self.connection.establish(self.config.feed.clone())
    }

    /// Import a file synchronously on the calling thread
    pub fn import_file(&self, path: impl AsRef<Path>) -> Result<DispatchEvent> {
        self.processor.process_file(path)
    }

    /// Deliver everything queued since the last tick
    pub fn tick(&mut self) -> usize {
        self.bus.dispatch_pending()
    }

    /// Run the consumer loop until `stop` is set
    pub fn run_until(&mut self, stop: &AtomicBool) {
        let tick = self.config.bus.tick();
        self.bus.run_until(stop, tick);
    }

    /// Terminate the feed and deliver what it left behind
    pub fn shutdown(&mut self) {
        self.connection.terminate(true);
        self.bus.dispatch_pending();
        tracing::info!(stats = ?self.stats(), "Pipeline shut down");
    }
}
