//! Classification, deserialization and publication
//!
//! [`MessageProcessor`] is shared by the feed worker and the file-drop entry
//! points so both transports see identical downstream behavior. They differ
//! only in how failures are reported:
//!
//! - **Network** ([`MessageProcessor::process`]) - unrecognised payloads are
//!   logged and dropped; schema mismatches become [`ErrorEvent`]s on the bus.
//! - **File** ([`MessageProcessor::process_strict`]) - every failure is
//!   returned to the caller, since a user is waiting on the result.

use crate::bus::{DispatchEvent, ErrorEvent, EventPublisher, FeedEvent};
use crate::classifier::MessageClassifier;
use crate::error::{FeedError, Result, ResultExt};
use crate::payload;
use crate::types::{FeedCounters, MessageEnvelope, MessageKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Glue between the classifier, the decoders and the bus
pub struct MessageProcessor {
    classifier: MessageClassifier,
    publisher: EventPublisher,
    counters: Arc<FeedCounters>,
}

impl MessageProcessor {
    pub fn new(
        classifier: MessageClassifier,
        publisher: EventPublisher,
        counters: Arc<FeedCounters>,
    ) -> Self {
        Self {
            classifier,
            publisher,
            counters,
        }
    }

    pub fn classifier(&self) -> &MessageClassifier {
        &self.classifier
    }

    pub fn counters(&self) -> &Arc<FeedCounters> {
        &self.counters
    }

    /// Classify and decode without publishing
    pub fn decode(&self, envelope: &MessageEnvelope) -> Result<DispatchEvent> {
        let kind = self.classifier.classify(envelope);
        if kind == MessageKind::Unknown {
            return Err(FeedError::ClassificationMiss {
                source_hint: envelope.source_hint().map(str::to_string),
            });
        }
        let payload = payload::decode(kind, envelope.payload())?;
        Ok(DispatchEvent::new(payload, envelope))
    }

    fn publish(&self, event: &DispatchEvent) {
        if self.publisher.publish(FeedEvent::Dispatch(event.clone())) {
            FeedCounters::incr(&self.counters.dispatched);
        }
    }

    fn count_failure(&self, err: &FeedError) {
        match err.root() {
            FeedError::ClassificationMiss { .. } => FeedCounters::incr(&self.counters.unclassified),
            _ => FeedCounters::incr(&self.counters.rejected),
        }
    }

    /// Network-path processing. Never fails; returns the event if one was
    /// published.
    pub fn process(&self, envelope: &MessageEnvelope) -> Option<DispatchEvent> {
        match self.decode(envelope) {
            Ok(event) => {
                tracing::debug!(
                    kind = %event.kind,
                    topic = envelope.topic().unwrap_or("-"),
                    "Dispatching"
                );
                self.publish(&event);
                Some(event)
            }
            Err(err) => {
                self.count_failure(&err);
                match err.root() {
                    FeedError::ClassificationMiss { .. } => {
                        tracing::debug!(
                            topic = envelope.topic().unwrap_or("-"),
                            bytes = envelope.payload().len(),
                            "Dropping unrecognised payload"
                        );
                    }
                    _ => {
                        tracing::warn!(
                            topic = envelope.topic().unwrap_or("-"),
                            "Rejected payload: {}",
                            err
                        );
                        self.publisher
                            .publish(FeedEvent::Error(ErrorEvent::from_error(&err, envelope)));
                    }
                }
                None
            }
        }
    }

    /// File-path processing. Publishes on success and returns every failure.
    pub fn process_strict(&self, envelope: &MessageEnvelope) -> Result<DispatchEvent> {
        match self.decode(envelope) {
            Ok(event) => {
                tracing::info!(
                    kind = %event.kind,
                    source = envelope.source_hint().unwrap_or("-"),
                    "Imported {}",
                    event.payload.summary()
                );
                self.publish(&event);
                Ok(event)
            }
            Err(err) => {
                self.count_failure(&err);
                Err(err)
            }
        }
    }

    /// Read a dropped file and process it with the file name as hint
    pub fn process_file(&self, path: impl AsRef<Path>) -> Result<DispatchEvent> {
        let path = path.as_ref();
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let hint = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        self.process_strict(&MessageEnvelope::file(bytes, hint))
    }

    /// Import a file on a short-lived background thread
    pub fn spawn_file_import(
        self: &Arc<Self>,
        path: impl Into<PathBuf>,
    ) -> Result<JoinHandle<Result<DispatchEvent>>> {
        let path = path.into();
        let processor = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("file-import".into())
            .spawn(move || processor.process_file(&path))?;
        Ok(handle)
    }
}

impl std::fmt::Debug for MessageProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageProcessor")
            .field("rules", &self.classifier.rules().len())
            .finish()
    }
}
