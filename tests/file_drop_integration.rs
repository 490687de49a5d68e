//! Integration tests for the file-drop path
//!
//! Files go through the same classifier and decoders as network payloads,
//! but every failure is returned to the caller instead of the bus.

mod common;

use common::builders::{sample_file_name, sample_payload, sample_wire};
use common::mock_helpers::{test_config, Recorder};
use feedsift::bus::EventTopic;
use feedsift::feed::ZmqConnector;
use feedsift::types::{LegacyFormat, MessageKind, Transport};
use feedsift::{FeedApp, FeedError};
use std::sync::Arc;
use tempfile::TempDir;

fn app() -> FeedApp {
    FeedApp::with_connector(test_config(), Arc::new(ZmqConnector::new()))
}

fn write(dir: &TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

#[test]
fn test_import_every_kind() {
    let mut app = app();
    let recorder = Recorder::attach(
        &mut app,
        MessageKind::all().into_iter().map(EventTopic::Message),
    );
    let dir = tempfile::tempdir().unwrap();

    let kinds = MessageKind::all();
    for kind in &kinds {
        let path = write(&dir, sample_file_name(*kind), &sample_wire(*kind));
        let event = app.import_file(&path).unwrap();
        assert_eq!(event.kind, *kind);
        assert_eq!(*event.payload, sample_payload(*kind));
        assert_eq!(event.origin, Transport::File);
        assert_eq!(event.source_hint.as_deref(), Some(sample_file_name(*kind)));
    }

    assert_eq!(app.tick(), kinds.len());
    assert_eq!(recorder.len(), kinds.len());
    assert_eq!(app.stats().dispatched, kinds.len() as u64);
}

#[test]
fn test_unknown_file_reports_hint() {
    let mut app = app();
    let recorder = Recorder::attach(&mut app, [EventTopic::Errors]);
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "notes.txt", b"just some text\n");

    let err = app.import_file(&path).unwrap_err();
    assert!(err.to_string().contains("notes.txt"));
    match err {
        FeedError::ClassificationMiss { source_hint } => {
            assert_eq!(source_hint.as_deref(), Some("notes.txt"))
        }
        other => panic!("unexpected error: {}", other),
    }

    // File failures go to the caller, not the bus
    assert_eq!(app.tick(), 0);
    assert_eq!(recorder.len(), 0);
    assert_eq!(app.stats().unclassified, 1);
}

#[test]
fn test_schema_mismatch_from_file() {
    let app = app();
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        "bad.json",
        br#"{"type": "ShapleyCollection", "values": [{"data": "oops"}]}"#,
    );

    let err = app.import_file(&path).unwrap_err();
    assert!(matches!(
        err,
        FeedError::SchemaMismatch {
            kind: MessageKind::ShapleyCollection,
            ..
        }
    ));
    assert_eq!(app.stats().rejected, 1);
}

#[test]
fn test_legacy_table_with_wrong_extension() {
    let app = app();
    let dir = tempfile::tempdir().unwrap();
    let kind = MessageKind::DelimitedLegacyFormat(LegacyFormat::CountyCases);
    let path = write(&dir, "cases.txt", &sample_wire(kind));

    assert!(matches!(
        app.import_file(&path),
        Err(FeedError::ClassificationMiss { .. })
    ));
}

#[test]
fn test_missing_file_is_io_error() {
    let app = app();
    let dir = tempfile::tempdir().unwrap();
    let err = app.import_file(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err.root(), FeedError::Io(_)));
}

#[test]
fn test_background_import() {
    let mut app = app();
    let recorder = Recorder::attach(
        &mut app,
        [EventTopic::Message(MessageKind::GraphDirectedCollection)],
    );
    let dir = tempfile::tempdir().unwrap();
    let kind = MessageKind::GraphDirectedCollection;
    let path = write(&dir, "graph.json", &sample_wire(kind));

    let handle = app.processor().spawn_file_import(path).unwrap();
    let event = handle.join().unwrap().unwrap();
    assert_eq!(event.kind, kind);

    assert_eq!(app.tick(), 1);
    assert_eq!(recorder.len(), 1);
}
