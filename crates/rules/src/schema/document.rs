//! Multi-kind rule document container and accessors.

use super::{CommonMetadata, GlobalMacro, Rule, RuleKind};

/// A fully deserialized document of any supported kind.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleDocument {
    Rule(Rule),
    Macro(GlobalMacro),
}

impl RuleDocument {
    /// Get the document's metadata regardless of kind.
    pub fn metadata(&self) -> &CommonMetadata {
        match self {
            RuleDocument::Rule(rule) => &rule.metadata,
            RuleDocument::Macro(global) => &global.metadata,
        }
    }

    pub fn kind(&self) -> RuleKind {
        match self {
            RuleDocument::Rule(_) => RuleKind::Rule,
            RuleDocument::Macro(_) => RuleKind::GlobalMacro,
        }
    }

    pub fn as_rule(&self) -> Option<&Rule> {
        match self {
            RuleDocument::Rule(rule) => Some(rule),
            _ => None,
        }
    }

    pub fn as_macro(&self) -> Option<&GlobalMacro> {
        match self {
            RuleDocument::Macro(global) => Some(global),
            _ => None,
        }
    }

    /// Serialize this document to YAML, delegating to the inner type.
    pub fn to_yaml(&self) -> std::result::Result<String, serde_yaml::Error> {
        match self {
            RuleDocument::Rule(r) => serde_yaml::to_string(r),
            RuleDocument::Macro(m) => serde_yaml::to_string(m),
        }
    }
}
