//! First-pass view of a rule document: the header is typed, the body is kept
//! as a raw YAML value until `kind` says what it should become.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{CommonMetadata, RuleDocument, RuleKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleEnvelope {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: CommonMetadata,
    #[serde(flatten)]
    pub rest: serde_yaml::Value,
}

impl RuleEnvelope {
    pub fn rule_kind(&self) -> std::result::Result<RuleKind, String> {
        self.kind.parse()
    }

    /// Second pass: re-read the whole document as the type named by `kind`.
    pub fn parse_full(&self) -> std::result::Result<RuleDocument, String> {
        match self.rule_kind()? {
            RuleKind::Rule => self.decode().map(RuleDocument::Rule),
            RuleKind::GlobalMacro => self.decode().map(RuleDocument::Macro),
        }
    }

    fn decode<T: DeserializeOwned>(&self) -> std::result::Result<T, String> {
        let value = serde_yaml::to_value(self).map_err(|e| e.to_string())?;
        serde_yaml::from_value(value).map_err(|e| format!("{} document: {}", self.kind, e))
    }
}
