//! Sample payloads for every message kind

use feedsift::payload::*;
use feedsift::types::{LegacyFormat, MessageKind};
use feedsift::Payload;

/// A small valid payload of the given kind
pub fn sample_payload(kind: MessageKind) -> Payload {
    match kind {
        MessageKind::FeatureCollection => Payload::FeatureCollection(FeatureCollection {
            features: vec![FeatureVector {
                data: vec![0.25, 0.75],
                score: 0.5,
                label: Some("cat".into()),
                ..Default::default()
            }],
        }),
        MessageKind::ManifoldData => Payload::ManifoldData(ManifoldData {
            data: vec![vec![1.0, 2.0], vec![3.0, 4.0]],
            labels: vec!["a".into(), "b".into()],
            source: None,
        }),
        MessageKind::GaussianMixtureCollection => {
            Payload::GaussianMixtureCollection(GaussianMixtureCollection {
                mixtures: vec![GaussianMixture {
                    label: "m0".into(),
                    data: vec![GaussianMixtureData {
                        weight: 1.0,
                        mean: vec![0.0, 0.0],
                        covariance: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
                    }],
                }],
            })
        }
        MessageKind::ClusterCollection => Payload::ClusterCollection(ClusterCollection {
            clusters: vec![PointCluster {
                cluster_name: "c0".into(),
                points: vec![vec![0.0, 0.125]],
                ..Default::default()
            }],
        }),
        MessageKind::SemanticMapCollection => {
            Payload::SemanticMapCollection(SemanticMapCollection {
                semantic_maps: vec![SemanticMap {
                    name: "topics".into(),
                    entries: vec![SemanticEntry {
                        text: "rust".into(),
                        vector: vec![0.375],
                        score: 1.0,
                    }],
                }],
            })
        }
        MessageKind::ShapleyCollection => Payload::ShapleyCollection(ShapleyCollection {
            values: vec![ShapleyVector {
                entity_id: Some("e1".into()),
                label: None,
                data: vec![0.125, -0.25],
            }],
        }),
        MessageKind::TextEmbeddingCollection => {
            Payload::TextEmbeddingCollection(TextEmbeddingCollection {
                embeddings: vec![TextEmbedding {
                    text: "hello".into(),
                    vector: vec![0.875, 0.125],
                    label: None,
                    score: 0.0,
                }],
            })
        }
        MessageKind::VectorMaskCollection => Payload::VectorMaskCollection(VectorMaskCollection {
            masks: vec![VectorMask {
                label: "mask".into(),
                data: vec![1.0, 0.0],
                color: Some("#00ff00".into()),
            }],
        }),
        MessageKind::GraphDirectedCollection => {
            Payload::GraphDirectedCollection(GraphDirectedCollection {
                graphs: vec![GraphDirected {
                    id: "g".into(),
                    nodes: vec![
                        GraphNode {
                            id: "a".into(),
                            ..Default::default()
                        },
                        GraphNode {
                            id: "b".into(),
                            ..Default::default()
                        },
                    ],
                    edges: vec![GraphEdge {
                        source: "a".into(),
                        target: "b".into(),
                        weight: 0.5,
                    }],
                }],
            })
        }
        MessageKind::LabelConfig => Payload::LabelConfig(LabelConfig {
            labels: vec![LabelEntry {
                label: "cat".into(),
                color: None,
                visible: false,
            }],
            clear_all: true,
        }),
        MessageKind::CocoAnnotation => Payload::CocoAnnotation(CocoAnnotation {
            images: vec![CocoImage {
                id: 1,
                file_name: "img.png".into(),
                width: 64,
                height: 48,
            }],
            annotations: vec![CocoObject {
                id: 10,
                image_id: 1,
                category_id: 3,
                bbox: vec![1.0, 2.0, 3.0, 4.0],
                ..Default::default()
            }],
            categories: vec![CocoCategory {
                id: 3,
                name: "dog".into(),
                supercategory: "animal".into(),
            }],
            info: None,
        }),
        MessageKind::CyberReport => Payload::CyberReport(CyberReport {
            reports: vec![CyberRecord {
                id: "r1".into(),
                severity: Some("high".into()),
                vector: vec![1.0],
                ..Default::default()
            }],
        }),
        MessageKind::DelimitedLegacyFormat(format) => Payload::Legacy(sample_table(format)),
        MessageKind::Unknown => panic!("Unknown has no sample"),
    }
}

pub fn sample_table(format: LegacyFormat) -> DelimitedTable {
    let text = match format {
        LegacyFormat::CountyPopulation => {
            "county,county_fips,state,county_population\nAutauga,1001,Alabama,55869\n"
        }
        LegacyFormat::CountyCases => {
            "date\tcounty\tstate\tfips\tcases\tdeaths\n2020-03-01\tKing\tWashington\t53033\t10\t1\n"
        }
    };
    DelimitedTable::parse(format, text).unwrap()
}

/// Wire bytes of the sample payload
pub fn sample_wire(kind: MessageKind) -> Vec<u8> {
    sample_payload(kind).to_wire().unwrap().into_bytes()
}

/// File name a payload of this kind would be dropped as
pub fn sample_file_name(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::DelimitedLegacyFormat(LegacyFormat::CountyPopulation) => "population.csv",
        MessageKind::DelimitedLegacyFormat(LegacyFormat::CountyCases) => "cases.tsv",
        _ => "payload.json",
    }
}
