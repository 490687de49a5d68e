//! Mock construction helpers

use feedsift::bus::{EventTopic, FeedEvent};
use feedsift::config::{AppConfig, ConnectionConfig};
use feedsift::FeedApp;
use std::sync::{Arc, Mutex};

#[cfg(feature = "mock-feed")]
use feedsift::feed::MockFeedConnector;

/// Config with short timeouts suitable for tests
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.feed.poll_interval_ms = 10;
    config.connection = ConnectionConfig {
        connect_timeout_ms: 300,
        join_timeout_ms: 500,
        fault_backoff_ms: 5,
    };
    config
}

/// Events captured by a recording handler
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<FeedEvent>>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<FeedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    /// Payload bytes of every recorded dispatch, re-encoded to the wire form
    pub fn dispatched_wire(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|ev| match ev {
                FeedEvent::Dispatch(d) => d.payload.to_wire().ok(),
                _ => None,
            })
            .collect()
    }

    /// Subscribe a recording handler for `topics` on the app's bus
    pub fn attach(app: &mut FeedApp, topics: impl IntoIterator<Item = EventTopic>) -> Self {
        let recorder = Recorder::default();
        let sink = recorder.events.clone();
        app.bus_mut().subscribe_topics(topics, move |ev: &FeedEvent| {
            sink.lock().unwrap().push(ev.clone());
        });
        recorder
    }
}

/// App wired to a loopback feed
#[cfg(feature = "mock-feed")]
pub fn create_mock_app() -> (FeedApp, MockFeedConnector) {
    let connector = MockFeedConnector::new();
    let app = FeedApp::with_connector(test_config(), Arc::new(connector.clone()));
    (app, connector)
}
