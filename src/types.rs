//! Core data types for feedsift
//!
//! This module contains the fundamental data structures shared by the
//! classifier, the processor, the feed worker and the event bus.
//!
//! # Main Types
//!
//! - [`MessageKind`] - Closed set of payload schemas the pipeline recognises
//! - [`LegacyFormat`] - Delimited-text formats identified by their header line
//! - [`MessageEnvelope`] - Raw bytes plus where they came from
//! - [`ConnectionStatus`] - Feed connection state machine
//! - [`FeedStats`] / [`FeedCounters`] - Ingestion statistics
//!
//! # Ownership
//!
//! An envelope is created the moment bytes arrive, is never mutated, and is
//! dropped as soon as classification and dispatch complete. Nothing here
//! retains message history.

use chrono::{DateTime, Utc};
use std::borrow::Cow;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// Delimited-text formats recognised by an exact header line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegacyFormat {
    /// Comma-delimited county population table
    CountyPopulation,
    /// Tab-delimited daily county case counts
    CountyCases,
}

impl LegacyFormat {
    /// All legacy formats, in registration order
    pub const ALL: [LegacyFormat; 2] = [LegacyFormat::CountyPopulation, LegacyFormat::CountyCases];

    /// Field delimiter used by this format
    pub fn delimiter(&self) -> char {
        match self {
            LegacyFormat::CountyPopulation => ',',
            LegacyFormat::CountyCases => '\t',
        }
    }

    /// Exact header prefix identifying this format
    pub fn header_prefix(&self) -> &'static str {
        match self {
            LegacyFormat::CountyPopulation => "county,county_fips,state,county_population",
            LegacyFormat::CountyCases => "date\tcounty\tstate\tfips\tcases\tdeaths",
        }
    }

    /// File extension the format must carry, if any
    pub fn required_extension(&self) -> Option<&'static str> {
        match self {
            LegacyFormat::CountyPopulation => None,
            LegacyFormat::CountyCases => Some("tsv"),
        }
    }

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            LegacyFormat::CountyPopulation => "CountyPopulation",
            LegacyFormat::CountyCases => "CountyCases",
        }
    }
}

impl std::fmt::Display for LegacyFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The closed set of payload schemas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    FeatureCollection,
    ManifoldData,
    GaussianMixtureCollection,
    ClusterCollection,
    SemanticMapCollection,
    ShapleyCollection,
    TextEmbeddingCollection,
    VectorMaskCollection,
    GraphDirectedCollection,
    LabelConfig,
    CocoAnnotation,
    CyberReport,
    /// Delimited text identified by its header line
    DelimitedLegacyFormat(LegacyFormat),
    /// No rule matched
    Unknown,
}

impl MessageKind {
    /// Every JSON kind, in declaration order
    pub fn json_kinds() -> [MessageKind; 12] {
        [
            MessageKind::FeatureCollection,
            MessageKind::ManifoldData,
            MessageKind::GaussianMixtureCollection,
            MessageKind::ClusterCollection,
            MessageKind::SemanticMapCollection,
            MessageKind::ShapleyCollection,
            MessageKind::TextEmbeddingCollection,
            MessageKind::VectorMaskCollection,
            MessageKind::GraphDirectedCollection,
            MessageKind::LabelConfig,
            MessageKind::CocoAnnotation,
            MessageKind::CyberReport,
        ]
    }

    /// Every dispatchable kind (everything except `Unknown`)
    pub fn all() -> Vec<MessageKind> {
        let mut kinds = Self::json_kinds().to_vec();
        kinds.extend(LegacyFormat::ALL.iter().map(|f| MessageKind::DelimitedLegacyFormat(*f)));
        kinds
    }

    /// Wire discriminator value (`"type": "<name>"`)
    pub fn name(&self) -> &'static str {
        match self {
            MessageKind::FeatureCollection => "FeatureCollection",
            MessageKind::ManifoldData => "ManifoldData",
            MessageKind::GaussianMixtureCollection => "GaussianMixtureCollection",
            MessageKind::ClusterCollection => "ClusterCollection",
            MessageKind::SemanticMapCollection => "SemanticMapCollection",
            MessageKind::ShapleyCollection => "ShapleyCollection",
            MessageKind::TextEmbeddingCollection => "TextEmbeddingCollection",
            MessageKind::VectorMaskCollection => "VectorMaskCollection",
            MessageKind::GraphDirectedCollection => "GraphDirectedCollection",
            MessageKind::LabelConfig => "LabelConfig",
            MessageKind::CocoAnnotation => "CocoAnnotation",
            MessageKind::CyberReport => "CyberReport",
            MessageKind::DelimitedLegacyFormat(format) => format.name(),
            MessageKind::Unknown => "Unknown",
        }
    }

    /// Inverse of [`MessageKind::name`]
    pub fn from_name(name: &str) -> Option<MessageKind> {
        Self::all().into_iter().find(|k| k.name() == name)
    }

    /// True for kinds carried as JSON
    pub fn is_json(&self) -> bool {
        !matches!(
            self,
            MessageKind::DelimitedLegacyFormat(_) | MessageKind::Unknown
        )
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Where a payload came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// Live pub/sub feed
    Network,
    /// File dropped by a user
    File,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Network => write!(f, "network"),
            Transport::File => write!(f, "file"),
        }
    }
}

/// Raw payload plus its origin
#[derive(Debug, Clone)]
pub struct MessageEnvelope {
    payload: Vec<u8>,
    transport: Transport,
    source_hint: Option<String>,
    topic: Option<String>,
    received_at: DateTime<Utc>,
}

impl MessageEnvelope {
    /// Envelope for bytes received on the live feed
    pub fn network(payload: impl Into<Vec<u8>>, topic: Option<String>) -> Self {
        Self {
            payload: payload.into(),
            transport: Transport::Network,
            source_hint: None,
            topic,
            received_at: Utc::now(),
        }
    }

    /// Envelope for the content of a dropped file
    pub fn file(payload: impl Into<Vec<u8>>, source_hint: Option<String>) -> Self {
        Self {
            payload: payload.into(),
            transport: Transport::File,
            source_hint,
            topic: None,
            received_at: Utc::now(),
        }
    }

    /// Attach a filename/extension hint
    pub fn with_source_hint(mut self, hint: impl Into<String>) -> Self {
        self.source_hint = Some(hint.into());
        self
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload as text, replacing invalid UTF-8
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn source_hint(&self) -> Option<&str> {
        self.source_hint.as_deref()
    }

    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Lower-cased extension of the source hint.
    ///
    /// A bare hint such as `"csv"` is treated as the extension itself.
    pub fn extension(&self) -> Option<String> {
        let hint = self.source_hint.as_deref()?.trim();
        if hint.is_empty() {
            return None;
        }
        let ext = match Path::new(hint).extension() {
            Some(ext) => ext.to_string_lossy().into_owned(),
            None if !hint.contains(['/', '\\']) && !hint.contains('.') && hint.len() <= 5 => {
                hint.to_string()
            }
            None => return None,
        };
        Some(ext.to_ascii_lowercase())
    }
}

/// Feed connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// No worker, no socket
    #[default]
    Disconnected,
    /// Worker spawned, socket not ready yet
    Connecting,
    /// Receiving and forwarding messages
    Connected,
    /// Receiving but discarding messages
    Paused,
}

impl ConnectionStatus {
    /// Encoding for storage in an `AtomicU8`
    pub fn as_u8(self) -> u8 {
        match self {
            ConnectionStatus::Disconnected => 0,
            ConnectionStatus::Connecting => 1,
            ConnectionStatus::Connected => 2,
            ConnectionStatus::Paused => 3,
        }
    }

    /// Decode from an `AtomicU8`; unknown values decode as `Disconnected`
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionStatus::Connecting,
            2 => ConnectionStatus::Connected,
            3 => ConnectionStatus::Paused,
            _ => ConnectionStatus::Disconnected,
        }
    }

    /// True for every state that owns a live worker
    pub fn is_active(self) -> bool {
        self != ConnectionStatus::Disconnected
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
            ConnectionStatus::Connecting => write!(f, "Connecting..."),
            ConnectionStatus::Connected => write!(f, "Connected"),
            ConnectionStatus::Paused => write!(f, "Paused"),
        }
    }
}

/// Snapshot of ingestion statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedStats {
    /// Payloads read from the socket
    pub received: u64,
    /// Events published to the bus
    pub dispatched: u64,
    /// Payloads discarded because the connection was paused
    pub dropped_paused: u64,
    /// Payloads no rule recognised
    pub unclassified: u64,
    /// Payloads whose body did not match the detected schema
    pub rejected: u64,
    /// Faults caught inside the worker loop
    pub worker_faults: u64,
    /// Events dropped because the bus queue was full
    pub bus_overflow: u64,
}

/// Shared atomic counters behind [`FeedStats`]
#[derive(Debug, Default)]
pub struct FeedCounters {
    pub received: AtomicU64,
    pub dispatched: AtomicU64,
    pub dropped_paused: AtomicU64,
    pub unclassified: AtomicU64,
    pub rejected: AtomicU64,
    pub worker_faults: AtomicU64,
    pub bus_overflow: AtomicU64,
}

impl FeedCounters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a consistent-enough snapshot for display
    pub fn snapshot(&self) -> FeedStats {
        FeedStats {
            received: self.received.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            dropped_paused: self.dropped_paused.load(Ordering::Relaxed),
            unclassified: self.unclassified.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            worker_faults: self.worker_faults.load(Ordering::Relaxed),
            bus_overflow: self.bus_overflow.load(Ordering::Relaxed),
        }
    }
}
