//! Events carried by the bus

use crate::error::FeedError;
use crate::payload::Payload;
use crate::types::{ConnectionStatus, MessageEnvelope, MessageKind, Transport};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A deserialized message ready for handlers
#[derive(Debug, Clone)]
pub struct DispatchEvent {
    pub kind: MessageKind,
    /// Shared so fan-out and background jobs never copy the payload
    pub payload: Arc<Payload>,
    pub origin: Transport,
    pub topic: Option<String>,
    pub source_hint: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl DispatchEvent {
    pub fn new(payload: Payload, envelope: &MessageEnvelope) -> Self {
        Self {
            kind: payload.kind(),
            payload: Arc::new(payload),
            origin: envelope.transport(),
            topic: envelope.topic().map(str::to_string),
            source_hint: envelope.source_hint().map(str::to_string),
            received_at: envelope.received_at(),
        }
    }
}

/// What went wrong for an [`ErrorEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ClassificationMiss,
    SchemaMismatch,
    WorkerFault,
    Transport,
    /// A background handler job failed
    JobFailed,
}

/// Diagnostic event for failures that must not escape the network path
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub error_kind: ErrorKind,
    /// Detected kind, when classification succeeded
    pub message_kind: Option<MessageKind>,
    pub origin: Transport,
    pub topic: Option<String>,
    pub detail: String,
}

impl ErrorEvent {
    /// Build from a pipeline error and the envelope it concerned
    pub fn from_error(err: &FeedError, envelope: &MessageEnvelope) -> Self {
        let (error_kind, message_kind) = match err.root() {
            FeedError::ClassificationMiss { .. } => (ErrorKind::ClassificationMiss, None),
            FeedError::SchemaMismatch { kind, .. } => (ErrorKind::SchemaMismatch, Some(*kind)),
            FeedError::Transport(_) | FeedError::Timeout(_) => (ErrorKind::Transport, None),
            _ => (ErrorKind::WorkerFault, None),
        };
        Self {
            error_kind,
            message_kind,
            origin: envelope.transport(),
            topic: envelope.topic().map(str::to_string),
            detail: err.to_string(),
        }
    }

    /// Fault raised by the worker outside any particular message
    pub fn worker_fault(detail: impl Into<String>) -> Self {
        Self {
            error_kind: ErrorKind::WorkerFault,
            message_kind: None,
            origin: Transport::Network,
            topic: None,
            detail: detail.into(),
        }
    }
}

/// Connection state change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub status: ConnectionStatus,
    /// Connection generation that changed state
    pub generation: u64,
    pub endpoint: String,
    pub reason: Option<String>,
}

/// Result published later by an asynchronous handler
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedEvent {
    pub source_kind: MessageKind,
    /// Name of the handler that produced the result
    pub producer: String,
    pub value: serde_json::Value,
}

/// Everything the bus delivers
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Dispatch(DispatchEvent),
    Error(ErrorEvent),
    Status(StatusEvent),
    Derived(DerivedEvent),
}

/// Subscription key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTopic {
    Message(MessageKind),
    Errors,
    Status,
    Derived,
}

impl FeedEvent {
    pub fn topic(&self) -> EventTopic {
        match self {
            FeedEvent::Dispatch(ev) => EventTopic::Message(ev.kind),
            FeedEvent::Error(_) => EventTopic::Errors,
            FeedEvent::Status(_) => EventTopic::Status,
            FeedEvent::Derived(_) => EventTopic::Derived,
        }
    }
}
