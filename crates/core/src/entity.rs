use serde::{Deserialize, Serialize};

/// Twin identifier as used by the twin graph (e.g. "AHU-01", or a point's GUID).
pub type TwinId = String;

/// Model identifier, e.g. `dtmi:com:acme:ZoneAirTemperatureSensor;1`.
pub type ModelId = String;

/// Well-known relationship types used by graph queries.
pub mod relationships {
    pub const IS_PART_OF: &str = "isPartOf";
    pub const LOCATED_IN: &str = "locatedIn";
    pub const IS_CAPABILITY_OF: &str = "isCapabilityOf";
    pub const HOSTED_BY: &str = "hostedBy";
    pub const INCLUDED_IN: &str = "includedIn";
    pub const IS_CONTAINED_IN: &str = "isContainedIn";

    /// Relationships that point from a twin towards its container/parent.
    /// `UNDER(...)` queries walk these edges in their outgoing direction.
    pub const HIERARCHY: &[&str] = &[
        IS_PART_OF,
        LOCATED_IN,
        IS_CAPABILITY_OF,
        HOSTED_BY,
        INCLUDED_IN,
        IS_CONTAINED_IN,
    ];

    pub fn is_hierarchical(relationship: &str) -> bool {
        HIERARCHY.iter().any(|r| r.eq_ignore_ascii_case(relationship))
    }
}

/// One hop of a relationship path: the twin we left from and the edge type taken.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathEdge {
    pub from: TwinId,
    pub relationship: String,
}

impl std::fmt::Display for PathEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -{}->", self.from, self.relationship)
    }
}

/// How a twin reference is resolved against the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TwinQuery {
    /// Nearest twins of the model in either direction from the origin.
    Related,
    /// Nearest containers of the model reached over hierarchy edges.
    Under,
}
