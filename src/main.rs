//! feedsift - Main Entry Point
//!
//! Subscribes to a feed and/or imports files, logging every event the
//! pipeline produces.

use anyhow::{bail, Context};
use clap::Parser;
use feedsift::bus::{EventTopic, FeedEvent, LoggingHandler};
use feedsift::config::{default_config_path, AppConfig, LoggingConfig};
use feedsift::feed::{FeedConnector, ZmqConnector};
use feedsift::types::{ConnectionStatus, MessageKind};
use feedsift::FeedApp;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "feedsift",
    version,
    about = "Classify and dispatch pub/sub feed payloads and dropped files"
)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Feed endpoint, e.g. tcp://localhost:5563
    #[arg(long)]
    endpoint: Option<String>,

    /// Topic prefix to subscribe to ("ALL" for every topic)
    #[arg(long)]
    topic: Option<String>,

    /// Connect with forwarding paused
    #[arg(long)]
    paused: bool,

    /// Use the in-process loopback feed with generated sample payloads
    #[cfg(feature = "mock-feed")]
    #[arg(long)]
    mock: bool,

    /// Only import the given files, do not connect to a feed
    #[arg(long)]
    files_only: bool,

    /// Stop after this many seconds
    #[arg(long, value_name = "SECS")]
    run_for: Option<u64>,

    /// Files to import through the file-drop path
    files: Vec<PathBuf>,
}

fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "feedsift.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => default_config_path()
            .map(AppConfig::load_or_default)
            .unwrap_or_default(),
    };
    if let Some(endpoint) = &cli.endpoint {
        config.feed.endpoint = endpoint.clone();
    }
    if let Some(topic) = &cli.topic {
        config.feed.topic_filter = topic.clone();
    }
    Ok(config)
}

#[cfg(feature = "mock-feed")]
fn demo_payloads() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "features",
            r#"{"type": "FeatureCollection", "features": [{"data": [0.1, 0.7], "score": 0.9, "label": "cat"}]}"#,
        ),
        (
            "clusters",
            r#"{"type":"ClusterCollection","clusters":[{"clusterName":"c0","points":[[0.0,0.1],[0.2,0.3]]}]}"#,
        ),
        (
            "labels",
            r##"{"messageType": "LabelConfig", "labels": [{"label": "cat", "color": "#ff8800"}]}"##,
        ),
        ("noise", r#"{"foo": 1}"#),
    ]
}

#[cfg(feature = "mock-feed")]
fn spawn_demo_publisher(
    connector: feedsift::feed::MockFeedConnector,
    stop: Arc<AtomicBool>,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("demo-publisher".into())
        .spawn(move || {
            let payloads = demo_payloads();
            let mut i = 0;
            while !stop.load(Ordering::SeqCst) {
                let (topic, body) = payloads[i % payloads.len()];
                connector.publish(topic, body.as_bytes().to_vec());
                i += 1;
                std::thread::sleep(Duration::from_millis(250));
            }
        })
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let _log_guard = init_logging(&config.logging);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting feedsift");

    let stop = Arc::new(AtomicBool::new(false));

    #[cfg(feature = "mock-feed")]
    let demo = cli.mock.then(feedsift::feed::MockFeedConnector::new);
    #[cfg(feature = "mock-feed")]
    let connector: Arc<dyn FeedConnector> = match &demo {
        Some(mock) => Arc::new(mock.clone()),
        None => Arc::new(ZmqConnector::new()),
    };
    #[cfg(not(feature = "mock-feed"))]
    let connector: Arc<dyn FeedConnector> = Arc::new(ZmqConnector::new());

    let mut app = FeedApp::with_connector(config, connector);

    let mut topics: Vec<EventTopic> = MessageKind::all()
        .into_iter()
        .map(EventTopic::Message)
        .collect();
    topics.extend([EventTopic::Errors, EventTopic::Status, EventTopic::Derived]);
    app.bus_mut().subscribe_topics(topics, LoggingHandler::new());

    // A feed that drops out ends the run
    let watcher = stop.clone();
    app.bus_mut()
        .subscribe_topics([EventTopic::Status], move |event: &FeedEvent| {
            if let FeedEvent::Status(status) = event {
                if status.status == ConnectionStatus::Disconnected {
                    watcher.store(true, Ordering::SeqCst);
                }
            }
        });

    let mut imports = Vec::new();
    for path in &cli.files {
        let handle = app
            .processor()
            .spawn_file_import(path)
            .with_context(|| format!("Failed to start import of {}", path.display()))?;
        imports.push((path.clone(), handle));
    }

    if !cli.files_only {
        app.connection().set_enabled(!cli.paused);
        app.connect().context("Failed to connect to feed")?;
    }

    #[cfg(feature = "mock-feed")]
    let publisher_thread = match &demo {
        Some(mock) if !cli.files_only => Some(spawn_demo_publisher(mock.clone(), stop.clone())?),
        _ => None,
    };

    let deadline = cli.run_for.map(|secs| Instant::now() + Duration::from_secs(secs));
    let tick = app.config().bus.tick();
    let mut failed_imports = 0usize;

    loop {
        app.bus_mut().dispatch_timeout(tick);

        let (finished, pending): (Vec<_>, Vec<_>) =
            imports.into_iter().partition(|(_, h)| h.is_finished());
        imports = pending;
        for (path, handle) in finished {
            match handle.join() {
                Ok(Ok(event)) => {
                    tracing::info!(path = %path.display(), kind = %event.kind, "Import complete")
                }
                Ok(Err(e)) => {
                    failed_imports += 1;
                    tracing::error!(path = %path.display(), "Import failed: {}", e);
                }
                Err(_) => {
                    failed_imports += 1;
                    tracing::error!(path = %path.display(), "Import thread panicked");
                }
            }
        }

        if stop.load(Ordering::SeqCst) {
            tracing::warn!("Feed disconnected");
            break;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        if cli.files_only && imports.is_empty() {
            break;
        }
    }

    stop.store(true, Ordering::SeqCst);
    #[cfg(feature = "mock-feed")]
    let _ = publisher_thread.map(|handle| handle.join());
    app.shutdown();

    if failed_imports > 0 {
        bail!("{} of {} imports failed", failed_imports, cli.files.len());
    }
    Ok(())
}
