//! Header validation: apiVersion, kind, metadata, primary model.

use crate::schema::*;
use super::ValidationResult;
use super::fuzzy::is_kebab_case;

pub(super) fn validate_header(
    api_version: &str,
    kind: &str,
    expected_kind: &str,
    metadata: &CommonMetadata,
    result: &mut ValidationResult,
) {
    if api_version != "v1" {
        result.error("apiVersion", format!("apiVersion must be 'v1', got '{}'", api_version));
    }

    if kind != expected_kind {
        result.error("kind", format!("kind must be '{}', got '{}'", expected_kind, kind));
    }

    if metadata.id.trim().is_empty() {
        result.error("metadata.id", "id must not be empty");
    } else if !is_kebab_case(&metadata.id) {
        // Instance ids embed the rule id, so odd characters are allowed but flagged.
        result.warn(
            "metadata.id",
            format!("id should be kebab-case (lowercase alphanumeric + hyphens), got '{}'", metadata.id),
        );
    }
}

pub(super) fn validate_primary_model(rule: &Rule, result: &mut ValidationResult) {
    if rule.primary_model_id.trim().is_empty() {
        result.error("primaryModelId", "primaryModelId must not be empty");
    } else if !rule.primary_model_id.contains(':') {
        result.warn(
            "primaryModelId",
            format!("'{}' does not look like a model id (expected dtmi:...)", rule.primary_model_id),
        );
    }
}
