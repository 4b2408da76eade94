//! Rule validation with structured errors and suggestions.
//!
//! Checks document headers, parameter and trigger expressions, and the UI
//! knobs that drive windowing. Returns a [`ValidationResult`] with errors
//! (the rule is rejected) and warnings (advisory).

mod element_checks;
mod expression_checks;
mod schema_checks;

pub mod fuzzy;

use crate::schema::*;
use serde::{Deserialize, Serialize};

// ── Result types ────────────────────────────────────────────────────

/// Overall validation outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

/// A blocking validation error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    /// Path-like location, e.g. `"triggers[0].condition"`.
    pub path: String,
    pub message: String,
    /// Optional "Did you mean …?" suggestion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// A non-blocking advisory warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationResult {
    pub(crate) fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub(crate) fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        });
    }

    pub(crate) fn error_with_suggestion(
        &mut self,
        path: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) {
        self.valid = false;
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
            suggestion: Some(suggestion.into()),
        });
    }

    pub(crate) fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationWarning {
            path: path.into(),
            message: message.into(),
        });
    }

    /// Errors joined into one line, for load failures.
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| match &e.suggestion {
                Some(s) => format!("{}: {} (did you mean '{}'?)", e.path, e.message, s),
                None => format!("{}: {}", e.path, e.message),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

// ── Public API ──────────────────────────────────────────────────────

/// Validate a parsed [`Rule`]. `macro_names` lists global macros the rule
/// may reference in addition to its own parameters.
pub fn validate_rule(rule: &Rule, macro_names: &[&str]) -> ValidationResult {
    let mut result = ValidationResult::new();
    schema_checks::validate_header(&rule.api_version, &rule.kind, "Rule", &rule.metadata, &mut result);
    schema_checks::validate_primary_model(rule, &mut result);
    expression_checks::validate_parameters(rule, macro_names, &mut result);
    expression_checks::validate_triggers(rule, macro_names, &mut result);
    element_checks::validate_elements(rule, &mut result);
    result
}

/// Validate a [`GlobalMacro`].
pub fn validate_macro(global: &GlobalMacro) -> ValidationResult {
    let mut result = ValidationResult::new();
    schema_checks::validate_header(&global.api_version, &global.kind, "GlobalMacro", &global.metadata, &mut result);
    expression_checks::validate_macro(global, &mut result);
    result
}

/// Validate any [`RuleDocument`] variant.
pub fn validate_document(doc: &RuleDocument, macro_names: &[&str]) -> ValidationResult {
    match doc {
        RuleDocument::Rule(rule) => validate_rule(rule, macro_names),
        RuleDocument::Macro(global) => validate_macro(global),
    }
}

/// Parse raw YAML and validate. Returns parse errors merged with validation errors.
pub fn validate_yaml(yaml: &str) -> ValidationResult {
    let parsed = serde_yaml::from_str::<RuleEnvelope>(yaml)
        .map_err(|e| e.to_string())
        .and_then(|envelope| envelope.parse_full());
    match parsed {
        Ok(doc) => validate_document(&doc, &[]),
        Err(e) => {
            let mut result = ValidationResult::new();
            result.error("", format!("YAML parse error: {e}"));
            result
        }
    }
}
