//! Subscriber socket abstraction
//!
//! The worker only needs two things from a transport: a way to open a
//! subscription, and a receive that gives up after a timeout. Keeping that
//! behind a trait lets the worker run against ZeroMQ in production and an
//! in-process feed in tests.

use crate::config::FeedConfig;
use crate::error::Result;
use crate::types::MessageEnvelope;
use std::time::Duration;

/// One received message, possibly multipart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedFrame {
    parts: Vec<Vec<u8>>,
}

impl FeedFrame {
    /// Single-part message with no topic frame
    pub fn single(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            parts: vec![payload.into()],
        }
    }

    /// Two-part message: topic frame then payload frame
    pub fn with_topic(topic: impl Into<Vec<u8>>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            parts: vec![topic.into(), payload.into()],
        }
    }

    pub fn from_parts(parts: Vec<Vec<u8>>) -> Self {
        Self { parts }
    }

    pub fn parts(&self) -> &[Vec<u8>] {
        &self.parts
    }

    /// The first frame, which subscriptions are matched against
    pub fn leading(&self) -> Option<&[u8]> {
        self.parts.first().map(Vec::as_slice)
    }

    /// Topic of a multipart message
    pub fn topic(&self) -> Option<String> {
        if self.parts.len() < 2 {
            return None;
        }
        self.parts
            .first()
            .map(|t| String::from_utf8_lossy(t).into_owned())
    }

    /// Payload bytes (the last frame)
    pub fn payload(&self) -> Option<&[u8]> {
        self.parts.last().map(Vec::as_slice)
    }

    /// Wrap as a network envelope; `None` for an empty message
    pub fn into_envelope(mut self) -> Option<MessageEnvelope> {
        let topic = self.topic();
        let payload = self.parts.pop()?;
        Some(MessageEnvelope::network(payload, topic))
    }
}

/// An open subscription
pub trait FeedSocket {
    /// Wait up to `timeout` for one message.
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<FeedFrame>>;
}

/// Opens subscriber sockets.
///
/// `connect` is called on the worker thread, so the returned socket never
/// crosses threads.
pub trait FeedConnector: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Connect to `config.endpoint` and apply the topic subscription
    fn connect(&self, config: &FeedConfig, timeout: Duration) -> Result<Box<dyn FeedSocket>>;
}
