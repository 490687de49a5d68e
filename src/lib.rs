//! # feedsift: schema-sniffing ingestion for pub/sub feeds
//!
//! Payloads arrive either on a ZeroMQ subscription or as files dropped by a
//! user. Each payload is classified by sniffing its discriminator, decoded
//! into a typed structure, and published on an in-process event bus that fans
//! it out to handlers and renderers.
//!
//! ## Architecture
//!
//! ```text
//! socket or file -> MessageClassifier -> MessageProcessor -> EventBus -> Handler(s) -> Renderer(s)
//! ```
//!
//! - **Classifier**: Ordered rule table matching `"type"`/`"messageType"` fields or header lines
//! - **Processor**: Decodes classified payloads and publishes them; shared by both transports
//! - **Feed**: One background worker per connection doing a timed receive loop
//! - **Bus**: Crossbeam queue drained by a single consumer thread
//!
//! ## Configuration
//!
//! Settings are stored as TOML in the platform config directory under
//! `dev.hxyulin.feedsift` (see [`config`]).
//!
//! ## Example
//!
//! ```ignore
//! use feedsift::{AppConfig, FeedApp, LoggingHandler, MessageKind};
//!
//! let mut app = FeedApp::new(AppConfig::default());
//! app.bus_mut().subscribe(MessageKind::all(), LoggingHandler::new());
//! app.connect()?;
//!
//! loop {
//!     app.tick();
//!     std::thread::sleep(std::time::Duration::from_millis(16));
//! }
//! ```

pub mod app;
pub mod bus;
pub mod classifier;
pub mod config;
pub mod error;
pub mod feed;
pub mod payload;
pub mod processor;
pub mod types;

// Re-export commonly used types
pub use app::FeedApp;
pub use bus::{EventBus, EventPublisher, FeedEvent, Handler, LoggingHandler, Renderer};
pub use classifier::MessageClassifier;
pub use config::{AppConfig, FeedConfig};
pub use error::{FeedError, Result};
pub use feed::FeedConnection;
pub use payload::Payload;
pub use processor::MessageProcessor;
pub use types::{ConnectionStatus, MessageEnvelope, MessageKind, Transport};
