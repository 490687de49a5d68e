//! Integration tests for classification and decoding
//!
//! These tests validate, across every message kind:
//! - Canonical wire forms classify back to their own kind
//! - Decoding the wire form reproduces the payload
//! - Unrecognised payloads never produce a dispatch

mod common;

use common::builders::{sample_file_name, sample_payload, sample_wire};
use common::mock_helpers::{test_config, Recorder};
use feedsift::bus::EventTopic;
use feedsift::classifier::MessageClassifier;
use feedsift::payload;
use feedsift::types::{LegacyFormat, MessageEnvelope, MessageKind};
use feedsift::FeedApp;

fn envelope_for(kind: MessageKind) -> MessageEnvelope {
    let bytes = sample_wire(kind);
    if kind.is_json() {
        MessageEnvelope::network(bytes, Some("samples".into()))
    } else {
        MessageEnvelope::file(bytes, Some(sample_file_name(kind).into()))
    }
}

#[test]
fn test_every_kind_round_trips_through_classifier() {
    let classifier = MessageClassifier::default();
    for kind in MessageKind::all() {
        let env = envelope_for(kind);
        assert_eq!(classifier.classify(&env), kind, "wire form of {} misclassified", kind);
    }
}

#[test]
fn test_every_kind_decodes_to_its_sample() {
    for kind in MessageKind::all() {
        let decoded = payload::decode(kind, &sample_wire(kind)).unwrap();
        assert_eq!(decoded, sample_payload(kind), "decode of {} lost data", kind);
    }
}

#[test]
fn test_json_dropped_as_file_classifies_like_network() {
    let classifier = MessageClassifier::default();
    for kind in MessageKind::json_kinds() {
        let env = MessageEnvelope::file(sample_wire(kind), Some("drop.json".into()));
        assert_eq!(classifier.classify(&env), kind);
    }
}

#[test]
fn test_pretty_printed_payload_classifies() {
    let classifier = MessageClassifier::default();
    let pretty = "{\n  \"type\": \"VectorMaskCollection\",\n  \"masks\": []\n}";
    let env = MessageEnvelope::network(pretty.as_bytes().to_vec(), None);
    assert_eq!(classifier.classify(&env), MessageKind::VectorMaskCollection);
}

#[test]
fn test_discriminator_outside_scan_window_is_unknown() {
    let classifier = MessageClassifier::default();
    let mut text = String::from("{\n");
    for i in 0..50 {
        text.push_str(&format!("  \"k{}\": {},\n", i, i));
    }
    text.push_str("  \"type\": \"ManifoldData\"\n}");
    let env = MessageEnvelope::network(text.into_bytes(), None);
    assert_eq!(classifier.classify(&env), MessageKind::Unknown);
}

#[test]
fn test_legacy_header_detection() {
    let classifier = MessageClassifier::default();
    let text = "county,county_fips,state,county_population,extra\nA,1,B,2,3\n";
    let env = MessageEnvelope::file(text.as_bytes().to_vec(), Some("counties.csv".into()));
    assert_eq!(
        classifier.classify(&env),
        MessageKind::DelimitedLegacyFormat(LegacyFormat::CountyPopulation)
    );
}

#[test]
fn test_cases_header_requires_tsv_extension() {
    let classifier = MessageClassifier::default();
    let text = sample_wire(MessageKind::DelimitedLegacyFormat(LegacyFormat::CountyCases));
    let env = MessageEnvelope::file(text, Some("cases.csv".into()));
    assert_eq!(classifier.classify(&env), MessageKind::Unknown);
}

#[test]
fn test_unknown_payload_produces_no_dispatch() {
    let mut app = FeedApp::with_connector(
        test_config(),
        std::sync::Arc::new(feedsift::feed::ZmqConnector::new()),
    );
    let topics: Vec<EventTopic> = MessageKind::all()
        .into_iter()
        .map(EventTopic::Message)
        .chain([EventTopic::Errors])
        .collect();
    let recorder = Recorder::attach(&mut app, topics);

    let env = MessageEnvelope::network(br#"{"foo":1}"#.to_vec(), None);
    assert_eq!(app.processor().classifier().classify(&env), MessageKind::Unknown);
    assert!(app.processor().process(&env).is_none());

    assert_eq!(app.tick(), 0);
    assert_eq!(recorder.len(), 0);
    assert_eq!(app.stats().unclassified, 1);
}
