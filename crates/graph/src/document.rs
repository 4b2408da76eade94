//! JSON graph document: the on-disk form of a [`GraphSnapshot`].

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::store::{GraphSnapshot, ModelDef, Relationship, Twin};

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("failed to read graph document {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid graph document: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub models: Vec<ModelDef>,
    #[serde(default)]
    pub twins: Vec<Twin>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl GraphDocument {
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, GraphError> {
        let content = std::fs::read_to_string(path).map_err(|source| GraphError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn into_snapshot(self) -> GraphSnapshot {
        let mut graph = GraphSnapshot::new(self.version);
        for model in self.models {
            graph.add_model(model);
        }
        for twin in self.twins {
            graph.upsert_twin(twin);
        }
        for rel in &self.relationships {
            graph.add_relationship(&rel.source, &rel.target, &rel.rel_type);
        }
        let stats = graph.stats();
        info!(
            version = stats.version,
            twins = stats.twin_count,
            edges = stats.edge_count,
            models = stats.model_count,
            "graph snapshot built"
        );
        graph
    }
}

impl From<&GraphSnapshot> for GraphDocument {
    fn from(graph: &GraphSnapshot) -> Self {
        let mut models: Vec<ModelDef> = graph.models.values().cloned().collect();
        models.sort_by(|a, b| a.id.cmp(&b.id));
        let mut twins: Vec<Twin> = graph.twins.values().cloned().collect();
        twins.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            version: graph.version,
            models,
            twins,
            relationships: graph.edges.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::TwinGraph;
    use twinwatch_core::TwinQuery;

    const DOC: &str = r#"{
        "version": 3,
        "models": [
            {"id": "dtmi:test:Sensor;1"},
            {"id": "dtmi:test:ZoneTemp;1", "extends": ["dtmi:test:Sensor;1"]}
        ],
        "twins": [
            {"id": "VAV-1", "model_id": "dtmi:test:VAV;1", "name": "VAV 1"},
            {"id": "ZT-1", "model_id": "dtmi:test:ZoneTemp;1", "unit": "degC"}
        ],
        "relationships": [
            {"source": "ZT-1", "target": "VAV-1", "rel_type": "isCapabilityOf"}
        ]
    }"#;

    #[test]
    fn document_builds_queryable_snapshot() {
        let graph = GraphDocument::from_json(DOC).unwrap().into_snapshot();
        assert_eq!(graph.version(), 3);
        assert_eq!(graph.type_of("ZT-1").as_deref(), Some("dtmi:test:ZoneTemp;1"));
        let found = graph.resolve("VAV-1", TwinQuery::Related, "dtmi:test:Sensor;1", 2);
        assert_eq!(found[0].twin_id, "ZT-1");
    }

    #[test]
    fn snapshot_exports_back_to_document() {
        let graph = GraphDocument::from_json(DOC).unwrap().into_snapshot();
        let doc = GraphDocument::from(&graph);
        assert_eq!(doc.twins.len(), 2);
        assert_eq!(doc.twins[0].id, "VAV-1");
        assert_eq!(doc.relationships.len(), 1);
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(matches!(GraphDocument::from_json("{ nope"), Err(GraphError::Json(_))));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = GraphDocument::from_path(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.json"));
    }
}
