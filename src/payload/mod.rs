//! Deserialized payloads
//!
//! [`decode`] turns the bytes of a classified envelope into the canonical
//! structure for its kind. A payload whose discriminator matched but whose body
//! does not fit the structure is a [`FeedError::SchemaMismatch`].

pub mod legacy;
pub mod schema;

pub use legacy::DelimitedTable;
pub use schema::*;

use crate::error::{FeedError, Result};
use crate::types::MessageKind;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A decoded payload, one variant per message kind
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    FeatureCollection(FeatureCollection),
    ManifoldData(ManifoldData),
    GaussianMixtureCollection(GaussianMixtureCollection),
    ClusterCollection(ClusterCollection),
    SemanticMapCollection(SemanticMapCollection),
    ShapleyCollection(ShapleyCollection),
    TextEmbeddingCollection(TextEmbeddingCollection),
    VectorMaskCollection(VectorMaskCollection),
    GraphDirectedCollection(GraphDirectedCollection),
    LabelConfig(LabelConfig),
    CocoAnnotation(CocoAnnotation),
    CyberReport(CyberReport),
    Legacy(DelimitedTable),
}

fn from_json<T: DeserializeOwned>(kind: MessageKind, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| FeedError::schema(kind, e))
}

/// Decode bytes already classified as `kind`
pub fn decode(kind: MessageKind, bytes: &[u8]) -> Result<Payload> {
    let payload = match kind {
        MessageKind::FeatureCollection => Payload::FeatureCollection(from_json(kind, bytes)?),
        MessageKind::ManifoldData => Payload::ManifoldData(from_json(kind, bytes)?),
        MessageKind::GaussianMixtureCollection => {
            let mixtures: GaussianMixtureCollection = from_json(kind, bytes)?;
            mixtures.validate().map_err(|e| FeedError::schema(kind, e))?;
            Payload::GaussianMixtureCollection(mixtures)
        }
        MessageKind::ClusterCollection => Payload::ClusterCollection(from_json(kind, bytes)?),
        MessageKind::SemanticMapCollection => {
            Payload::SemanticMapCollection(from_json(kind, bytes)?)
        }
        MessageKind::ShapleyCollection => Payload::ShapleyCollection(from_json(kind, bytes)?),
        MessageKind::TextEmbeddingCollection => {
            Payload::TextEmbeddingCollection(from_json(kind, bytes)?)
        }
        MessageKind::VectorMaskCollection => {
            Payload::VectorMaskCollection(from_json(kind, bytes)?)
        }
        MessageKind::GraphDirectedCollection => {
            let graphs: GraphDirectedCollection = from_json(kind, bytes)?;
            graphs.validate().map_err(|e| FeedError::schema(kind, e))?;
            Payload::GraphDirectedCollection(graphs)
        }
        MessageKind::LabelConfig => Payload::LabelConfig(from_json(kind, bytes)?),
        MessageKind::CocoAnnotation => Payload::CocoAnnotation(from_json(kind, bytes)?),
        MessageKind::CyberReport => Payload::CyberReport(from_json(kind, bytes)?),
        MessageKind::DelimitedLegacyFormat(format) => {
            let text = std::str::from_utf8(bytes).map_err(|e| FeedError::schema(kind, e))?;
            Payload::Legacy(DelimitedTable::parse(format, text)?)
        }
        MessageKind::Unknown => {
            return Err(FeedError::ClassificationMiss { source_hint: None });
        }
    };
    Ok(payload)
}

/// Serialize `body` and put the discriminator key first
fn with_discriminator<T: Serialize>(key: &str, kind: MessageKind, body: &T) -> Result<String> {
    let json = serde_json::to_string(body).map_err(|e| FeedError::Serialization(e.to_string()))?;
    let rest = json
        .strip_prefix('{')
        .ok_or_else(|| FeedError::Serialization(format!("{} is not a JSON object", kind)))?;
    if rest == "}" {
        Ok(format!("{{\"{}\":\"{}\"}}", key, kind.name()))
    } else {
        Ok(format!("{{\"{}\":\"{}\",{}", key, kind.name(), rest))
    }
}

impl Payload {
    /// The kind this payload was decoded as
    pub fn kind(&self) -> MessageKind {
        match self {
            Payload::FeatureCollection(_) => MessageKind::FeatureCollection,
            Payload::ManifoldData(_) => MessageKind::ManifoldData,
            Payload::GaussianMixtureCollection(_) => MessageKind::GaussianMixtureCollection,
            Payload::ClusterCollection(_) => MessageKind::ClusterCollection,
            Payload::SemanticMapCollection(_) => MessageKind::SemanticMapCollection,
            Payload::ShapleyCollection(_) => MessageKind::ShapleyCollection,
            Payload::TextEmbeddingCollection(_) => MessageKind::TextEmbeddingCollection,
            Payload::VectorMaskCollection(_) => MessageKind::VectorMaskCollection,
            Payload::GraphDirectedCollection(_) => MessageKind::GraphDirectedCollection,
            Payload::LabelConfig(_) => MessageKind::LabelConfig,
            Payload::CocoAnnotation(_) => MessageKind::CocoAnnotation,
            Payload::CyberReport(_) => MessageKind::CyberReport,
            Payload::Legacy(table) => MessageKind::DelimitedLegacyFormat(table.format),
        }
    }

    /// Number of top-level items (features, clusters, rows, ...)
    pub fn item_count(&self) -> usize {
        match self {
            Payload::FeatureCollection(p) => p.features.len(),
            Payload::ManifoldData(p) => p.data.len(),
            Payload::GaussianMixtureCollection(p) => p.mixtures.len(),
            Payload::ClusterCollection(p) => p.clusters.len(),
            Payload::SemanticMapCollection(p) => p.semantic_maps.len(),
            Payload::ShapleyCollection(p) => p.values.len(),
            Payload::TextEmbeddingCollection(p) => p.embeddings.len(),
            Payload::VectorMaskCollection(p) => p.masks.len(),
            Payload::GraphDirectedCollection(p) => p.graphs.len(),
            Payload::LabelConfig(p) => p.labels.len(),
            Payload::CocoAnnotation(p) => p.annotations.len(),
            Payload::CyberReport(p) => p.reports.len(),
            Payload::Legacy(t) => t.rows.len(),
        }
    }

    /// One-line description for logs
    pub fn summary(&self) -> String {
        let noun = match self {
            Payload::FeatureCollection(_) => "features",
            Payload::ManifoldData(_) => "rows",
            Payload::GaussianMixtureCollection(_) => "mixtures",
            Payload::ClusterCollection(_) => "clusters",
            Payload::SemanticMapCollection(_) => "semantic maps",
            Payload::ShapleyCollection(_) => "shapley vectors",
            Payload::TextEmbeddingCollection(_) => "embeddings",
            Payload::VectorMaskCollection(_) => "masks",
            Payload::GraphDirectedCollection(_) => "graphs",
            Payload::LabelConfig(_) => "labels",
            Payload::CocoAnnotation(_) => "annotations",
            Payload::CyberReport(_) => "reports",
            Payload::Legacy(_) => "rows",
        };
        format!("{} ({} {})", self.kind(), self.item_count(), noun)
    }

    /// Canonical wire form: JSON with the discriminator first, or delimited text
    pub fn to_wire(&self) -> Result<String> {
        let kind = self.kind();
        match self {
            Payload::FeatureCollection(p) => with_discriminator("type", kind, p),
            Payload::ManifoldData(p) => with_discriminator("type", kind, p),
            Payload::GaussianMixtureCollection(p) => with_discriminator("type", kind, p),
            Payload::ClusterCollection(p) => with_discriminator("type", kind, p),
            Payload::SemanticMapCollection(p) => with_discriminator("type", kind, p),
            Payload::ShapleyCollection(p) => with_discriminator("type", kind, p),
            Payload::TextEmbeddingCollection(p) => with_discriminator("type", kind, p),
            Payload::VectorMaskCollection(p) => with_discriminator("type", kind, p),
            Payload::GraphDirectedCollection(p) => with_discriminator("type", kind, p),
            Payload::LabelConfig(p) => with_discriminator("messageType", kind, p),
            Payload::CyberReport(p) => with_discriminator("messageType", kind, p),
            Payload::CocoAnnotation(p) => {
                serde_json::to_string(p).map_err(|e| FeedError::Serialization(e.to_string()))
            }
            Payload::Legacy(table) => Ok(table.to_text()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LegacyFormat;

    #[test]
    fn test_decode_feature_collection() {
        let json = br#"{"type":"FeatureCollection","features":[{"data":[0.1,0.2],"label":"a","score":0.5}]}"#;
        let payload = decode(MessageKind::FeatureCollection, json).unwrap();
        match &payload {
            Payload::FeatureCollection(fc) => {
                assert_eq!(fc.features.len(), 1);
                assert_eq!(fc.features[0].label.as_deref(), Some("a"));
            }
            other => panic!("unexpected payload {:?}", other),
        }
        assert_eq!(payload.kind(), MessageKind::FeatureCollection);
        assert_eq!(payload.summary(), "FeatureCollection (1 features)");
    }

    #[test]
    fn test_missing_required_field_is_schema_mismatch() {
        let err = decode(MessageKind::ClusterCollection, br#"{"type":"ClusterCollection"}"#)
            .unwrap_err();
        match err {
            FeedError::SchemaMismatch { kind, message } => {
                assert_eq!(kind, MessageKind::ClusterCollection);
                assert!(message.contains("clusters"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_malformed_json_is_schema_mismatch() {
        let err = decode(MessageKind::ShapleyCollection, br#"{"type":"ShapleyCollection","values":[{"#)
            .unwrap_err();
        assert!(matches!(err, FeedError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_graph_with_dangling_edge_rejected() {
        let json = br#"{"type":"GraphDirectedCollection","graphs":[{"id":"g","nodes":[{"id":"a"}],"edges":[{"source":"a","target":"b"}]}]}"#;
        let err = decode(MessageKind::GraphDirectedCollection, json).unwrap_err();
        assert!(err.to_string().contains("undeclared node"));
    }

    #[test]
    fn test_graph_edge_weight_defaults_to_one() {
        let json = br#"{"type":"GraphDirectedCollection","graphs":[{"id":"g","nodes":[{"id":"a"},{"id":"b"}],"edges":[{"source":"a","target":"b"}]}]}"#;
        match decode(MessageKind::GraphDirectedCollection, json).unwrap() {
            Payload::GraphDirectedCollection(g) => assert_eq!(g.graphs[0].edges[0].weight, 1.0),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_mixture_covariance_shape_checked() {
        let json = br#"{"type":"GaussianMixtureCollection","mixtures":[{"label":"m","data":[{"weight":1.0,"mean":[0.0,0.0],"covariance":[[1.0,0.0]]}]}]}"#;
        let err = decode(MessageKind::GaussianMixtureCollection, json).unwrap_err();
        assert!(matches!(err, FeedError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_label_entries_visible_by_default() {
        let json = br#"{"messageType":"LabelConfig","labels":[{"label":"cat"}]}"#;
        match decode(MessageKind::LabelConfig, json).unwrap() {
            Payload::LabelConfig(cfg) => {
                assert!(cfg.labels[0].visible);
                assert!(!cfg.clear_all);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_decode_legacy() {
        let text = b"county,county_fips,state,county_population\nAutauga,1001,Alabama,55869\n";
        let payload = decode(
            MessageKind::DelimitedLegacyFormat(LegacyFormat::CountyPopulation),
            text,
        )
        .unwrap();
        assert_eq!(payload.item_count(), 1);
    }

    #[test]
    fn test_decode_unknown_is_miss() {
        let err = decode(MessageKind::Unknown, b"{}").unwrap_err();
        assert!(matches!(err, FeedError::ClassificationMiss { .. }));
    }

    #[test]
    fn test_wire_form_puts_discriminator_first() {
        let payload = Payload::ManifoldData(ManifoldData {
            data: vec![vec![1.0, 2.0]],
            ..Default::default()
        });
        let wire = payload.to_wire().unwrap();
        assert!(wire.starts_with(r#"{"type":"ManifoldData","#));

        let payload = Payload::LabelConfig(LabelConfig::default());
        let wire = payload.to_wire().unwrap();
        assert!(wire.starts_with(r#"{"messageType":"LabelConfig","#));
    }
}
