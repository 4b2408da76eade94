//! Graph queries used by the binder: model hierarchy checks and reference
//! resolution from an origin twin.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use twinwatch_core::{relationships, ModelId, PathEdge, TwinId, TwinQuery};

use crate::store::{GraphSnapshot, Relationship, Twin};

/// A twin reached from an origin, with the hops taken to get there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub twin_id: TwinId,
    pub path: Vec<PathEdge>,
}

/// Read-only view of a twin graph. Implementations must be deterministic:
/// the same snapshot answers the same query with the same ordered result.
pub trait TwinGraph: Send + Sync {
    /// Snapshot version; changes whenever topology changes.
    fn version(&self) -> u64;

    /// Model of a twin, if the twin exists.
    fn type_of(&self, twin_id: &str) -> Option<ModelId>;

    /// True when `model` equals `ancestor` or inherits from it.
    fn is_subtype(&self, model: &str, ancestor: &str) -> bool;

    /// Twins whose model is `model` or a subtype of it, sorted by id.
    fn twins_of_model(&self, model: &str) -> Vec<TwinId>;

    /// Resolve a model reference from `origin`. Returns every match at the
    /// nearest depth that has any, sorted by twin id. `max_depth` bounds
    /// `Related` searches; `Under` follows hierarchy edges to the root.
    fn resolve(&self, origin: &str, query: TwinQuery, model: &str, max_depth: usize) -> Vec<Resolution>;
}

impl GraphSnapshot {
    fn matches_model(&self, twin: &Twin, model: &str) -> bool {
        self.is_subtype(&twin.model_id, model)
    }

    /// Level-by-level BFS from `origin`. `step` yields the edges to follow
    /// from a twin. Stops at the first level with a match.
    fn nearest<'a, F, I>(&'a self, origin: &str, model: &str, max_depth: usize, step: F) -> Vec<Resolution>
    where
        F: Fn(&str) -> I,
        I: Iterator<Item = (&'a Relationship, &'a Twin)>,
    {
        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(origin);
        let mut paths: HashMap<&str, Vec<PathEdge>> = HashMap::new();
        paths.insert(origin, Vec::new());
        let mut frontier: Vec<&str> = vec![origin];

        for _depth in 1..=max_depth {
            let mut next: BTreeMap<&str, Vec<PathEdge>> = BTreeMap::new();
            for &id in &frontier {
                let base = paths.get(id).cloned().unwrap_or_default();
                for (edge, other) in step(id) {
                    let other_id = other.id.as_str();
                    if visited.contains(other_id) || next.contains_key(other_id) {
                        continue;
                    }
                    let mut path = base.clone();
                    path.push(PathEdge {
                        from: id.to_string(),
                        relationship: edge.rel_type.clone(),
                    });
                    next.insert(other_id, path);
                }
            }
            if next.is_empty() {
                break;
            }

            let found: Vec<Resolution> = next
                .iter()
                .filter(|(id, _)| self.twins.get(**id).is_some_and(|t| self.matches_model(t, model)))
                .map(|(id, path)| Resolution {
                    twin_id: id.to_string(),
                    path: path.clone(),
                })
                .collect();
            if !found.is_empty() {
                return found;
            }

            frontier = next.keys().copied().collect();
            for (id, path) in next {
                visited.insert(id);
                paths.insert(id, path);
            }
        }
        Vec::new()
    }
}

impl TwinGraph for GraphSnapshot {
    fn version(&self) -> u64 {
        self.version
    }

    fn type_of(&self, twin_id: &str) -> Option<ModelId> {
        self.twins.get(twin_id).map(|t| t.model_id.clone())
    }

    fn is_subtype(&self, model: &str, ancestor: &str) -> bool {
        let mut stack = vec![model];
        let mut seen: HashSet<&str> = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == ancestor {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(def) = self.models.get(current) {
                stack.extend(def.extends.iter().map(String::as_str));
            }
        }
        false
    }

    fn twins_of_model(&self, model: &str) -> Vec<TwinId> {
        let mut ids: Vec<TwinId> = self
            .twins
            .values()
            .filter(|t| self.matches_model(t, model))
            .map(|t| t.id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn resolve(&self, origin: &str, query: TwinQuery, model: &str, max_depth: usize) -> Vec<Resolution> {
        let Some(origin_twin) = self.twins.get(origin) else {
            return Vec::new();
        };
        match query {
            TwinQuery::Related => {
                if self.matches_model(origin_twin, model) {
                    return vec![Resolution {
                        twin_id: origin_twin.id.clone(),
                        path: Vec::new(),
                    }];
                }
                self.nearest(origin, model, max_depth, |id| {
                    self.outgoing_edges(id).chain(self.incoming_edges(id))
                })
            }
            TwinQuery::Under => self.nearest(origin, model, self.twins.len(), |id| {
                self.outgoing_edges(id)
                    .filter(|(edge, _)| relationships::is_hierarchical(&edge.rel_type))
            }),
        }
    }
}
