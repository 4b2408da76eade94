//! Header fields every rule document carries under `metadata:`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CommonMetadata {
    /// Kebab-case id; rule instance ids are derived from it.
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// A disabled rule stays loaded but generates no instances.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

impl CommonMetadata {
    /// Metadata for documents built in code rather than loaded from YAML.
    pub fn named(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into(), description: None, tags: Vec::new(), enabled: true }
    }
}

fn enabled_by_default() -> bool {
    true
}
