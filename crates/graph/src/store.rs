use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use twinwatch_core::{ModelId, TwinId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Twin {
    pub id: TwinId,
    pub model_id: ModelId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Engineering unit for point twins (e.g. `degC`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// Directed edge `source -rel_type-> target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: TwinId,
    pub target: TwinId,
    pub rel_type: String,
}

/// Model (ontology class) with its direct supertypes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDef {
    pub id: ModelId,
    #[serde(default)]
    pub extends: Vec<ModelId>,
}

#[derive(Debug, Serialize)]
pub struct GraphStats {
    pub version: u64,
    pub twin_count: usize,
    pub edge_count: usize,
    pub model_count: usize,
    pub twins_by_model: BTreeMap<String, usize>,
    pub edges_by_type: BTreeMap<String, usize>,
}

/// Arena of twins plus adjacency lists. Edges are stored once and referenced
/// by index from both endpoints.
#[derive(Debug, Clone, Default)]
pub struct GraphSnapshot {
    pub version: u64,
    pub twins: HashMap<TwinId, Twin>,
    pub models: HashMap<ModelId, ModelDef>,
    pub edges: Vec<Relationship>,
    pub outgoing: HashMap<TwinId, Vec<usize>>,
    pub incoming: HashMap<TwinId, Vec<usize>>,
    edge_dedup: HashSet<(TwinId, TwinId, String)>,
}

impl GraphSnapshot {
    pub fn new(version: u64) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    /// Insert or replace a twin.
    pub fn upsert_twin(&mut self, twin: Twin) {
        self.twins.insert(twin.id.clone(), twin);
    }

    pub fn add_model(&mut self, model: ModelDef) {
        self.models.insert(model.id.clone(), model);
    }

    /// Add an edge. Duplicate `(source, target, type)` triples are ignored.
    pub fn add_relationship(&mut self, source: &str, target: &str, rel_type: &str) {
        let key = (source.to_string(), target.to_string(), rel_type.to_string());
        if !self.edge_dedup.insert(key) {
            return;
        }
        let idx = self.edges.len();
        self.edges.push(Relationship {
            source: source.to_string(),
            target: target.to_string(),
            rel_type: rel_type.to_string(),
        });
        self.outgoing.entry(source.to_string()).or_default().push(idx);
        self.incoming.entry(target.to_string()).or_default().push(idx);
    }

    pub fn twin(&self, id: &str) -> Option<&Twin> {
        self.twins.get(id)
    }

    pub fn stats(&self) -> GraphStats {
        let mut twins_by_model: BTreeMap<String, usize> = BTreeMap::new();
        for twin in self.twins.values() {
            *twins_by_model.entry(twin.model_id.clone()).or_default() += 1;
        }

        let mut edges_by_type: BTreeMap<String, usize> = BTreeMap::new();
        for edge in &self.edges {
            *edges_by_type.entry(edge.rel_type.clone()).or_default() += 1;
        }

        GraphStats {
            version: self.version,
            twin_count: self.twins.len(),
            edge_count: self.edges.len(),
            model_count: self.models.len(),
            twins_by_model,
            edges_by_type,
        }
    }

    /// Outgoing edges of a twin paired with the twin at the other end.
    pub fn outgoing_edges(&self, twin_id: &str) -> impl Iterator<Item = (&Relationship, &Twin)> {
        self.outgoing
            .get(twin_id)
            .into_iter()
            .flatten()
            .filter_map(|&idx| self.edges.get(idx))
            .filter_map(|edge| self.twins.get(&edge.target).map(|t| (edge, t)))
    }

    /// Incoming edges of a twin paired with the twin at the other end.
    pub fn incoming_edges(&self, twin_id: &str) -> impl Iterator<Item = (&Relationship, &Twin)> {
        self.incoming
            .get(twin_id)
            .into_iter()
            .flatten()
            .filter_map(|&idx| self.edges.get(idx))
            .filter_map(|edge| self.twins.get(&edge.source).map(|t| (edge, t)))
    }

    /// Neighbours in both directions.
    pub fn neighbors(&self, twin_id: &str) -> Vec<(&Relationship, &Twin)> {
        self.outgoing_edges(twin_id)
            .chain(self.incoming_edges(twin_id))
            .collect()
    }
}
