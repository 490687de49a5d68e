//! Error handling for feedsift
//!
//! This module defines the crate error type and a Result alias. The variants
//! follow the pipeline's failure taxonomy:
//!
//! - **ClassificationMiss** - no rule recognised the payload (per message)
//! - **SchemaMismatch** - a discriminator matched but the body is invalid (per message)
//! - **Transport** - the subscriber socket could not connect or subscribe (per connection)
//! - **WorkerFault** - something unexpected escaped one poll-loop iteration

use crate::types::MessageKind;
use thiserror::Error;

/// Main error type for feedsift operations
#[derive(Error, Debug)]
pub enum FeedError {
    /// No classification rule matched the payload
    #[error("Unrecognised payload{}", hint_suffix(.source_hint))]
    ClassificationMiss {
        /// File name or other hint that came with the payload, if any
        source_hint: Option<String>,
    },

    /// The payload carried a known discriminator but did not deserialize
    #[error("Schema mismatch for {kind}: {message}")]
    SchemaMismatch { kind: MessageKind, message: String },

    /// Socket connect/subscribe/receive failures
    #[error("Transport error: {0}")]
    Transport(String),

    /// Unexpected failure inside the feed worker loop
    #[error("Worker fault: {0}")]
    WorkerFault(String),

    /// Errors related to configuration loading/saving/validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// Timeout errors
    #[error("Timeout: {0}")]
    Timeout(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<FeedError>,
    },
}

fn hint_suffix(hint: &Option<String>) -> String {
    hint.as_deref()
        .map(|h| format!(" ({})", h))
        .unwrap_or_default()
}

impl FeedError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        FeedError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a schema mismatch error from a serde_json error
    pub fn schema(kind: MessageKind, err: impl std::fmt::Display) -> Self {
        FeedError::SchemaMismatch {
            kind,
            message: err.to_string(),
        }
    }

    /// The innermost error, skipping any context wrappers
    pub fn root(&self) -> &FeedError {
        match self {
            FeedError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether this error only affects a single message.
    ///
    /// Per-message errors never tear down a connection.
    pub fn is_per_message(&self) -> bool {
        matches!(
            self.root(),
            FeedError::ClassificationMiss { .. } | FeedError::SchemaMismatch { .. }
        )
    }
}

impl From<zeromq::ZmqError> for FeedError {
    fn from(err: zeromq::ZmqError) -> Self {
        FeedError::Transport(err.to_string())
    }
}

/// Result type alias for feedsift operations
pub type Result<T> = std::result::Result<T, FeedError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| FeedError::Io(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| FeedError::Io(e).with_context(f()))
    }
}
