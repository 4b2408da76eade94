//! Core [`RuleLoader`] struct: directory scan, two-pass parsing, validation.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use crate::schema::{macro_table, GlobalMacro, MacroTable, Rule, RuleDocument, RuleEnvelope};
use crate::validation::validate_document;

use super::error::{LoadResult, LoadStatus, Result, RuleError};

/// Filesystem-backed rule loader.
///
/// Scans a directory (recursively) for `*.yml` / `*.yaml` files and keeps
/// every document that parses and validates, keyed by `metadata.id`.
pub struct RuleLoader {
    rules_dir: PathBuf,
    documents: Arc<RwLock<HashMap<String, RuleDocument>>>,
}

impl RuleLoader {
    pub fn new(rules_dir: PathBuf) -> Self {
        Self {
            rules_dir,
            documents: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Recursively scan the rules directory and load all YAML files.
    ///
    /// Macros are registered before rules are validated, so a rule may use a
    /// macro defined in any file of the scan. Per-file failures are reported
    /// in the returned list and do not abort the scan.
    pub fn load_all(&self) -> Result<Vec<LoadResult>> {
        let mut results = Vec::new();
        let mut parsed = Vec::new();
        self.scan_dir_recursive(&self.rules_dir, &mut results, &mut parsed)?;

        // Macros first: rules validate against their names.
        parsed.sort_by_key(|(_, doc)| doc.as_rule().is_some());
        let mut macro_names: Vec<String> = self.macro_names();
        macro_names.extend(
            parsed
                .iter()
                .filter_map(|(_, doc)| doc.as_macro())
                .filter(|m| m.metadata.enabled)
                .map(|m| m.name.clone()),
        );
        let names: Vec<&str> = macro_names.iter().map(String::as_str).collect();

        for (path, doc) in parsed {
            let status = match self.accept(doc, &names) {
                Ok(rule_id) => {
                    info!(rule_id = %rule_id, path = %path.display(), "loaded rule document");
                    LoadStatus::Loaded { rule_id }
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "rejected rule document");
                    LoadStatus::Failed { error: e.to_string() }
                }
            };
            results.push(LoadResult { path, status });
        }

        Ok(results)
    }

    fn scan_dir_recursive(
        &self,
        dir: &Path,
        results: &mut Vec<LoadResult>,
        parsed: &mut Vec<(PathBuf, RuleDocument)>,
    ) -> Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "failed to read directory");
                return Ok(());
            }
        };

        let mut paths = entries.map(|entry| entry.map(|e| e.path())).collect::<std::io::Result<Vec<_>>>()?;
        paths.sort();

        for path in paths {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.starts_with('.') {
                    if path.is_file() {
                        results.push(LoadResult {
                            path,
                            status: LoadStatus::Skipped {
                                reason: "dotfile".to_string(),
                            },
                        });
                    }
                    continue;
                }
            }

            if path.is_dir() {
                self.scan_dir_recursive(&path, results, parsed)?;
                continue;
            }

            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e == "yml" || e == "yaml")
                .unwrap_or(false);

            if !is_yaml {
                results.push(LoadResult {
                    path,
                    status: LoadStatus::Skipped {
                        reason: "not a YAML file".to_string(),
                    },
                });
                continue;
            }

            match parse_file(&path) {
                Ok(doc) => parsed.push((path, doc)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to parse rule file");
                    results.push(LoadResult {
                        path,
                        status: LoadStatus::Failed { error: e.to_string() },
                    });
                }
            }
        }

        Ok(())
    }

    /// Parse and validate a single file against the macros loaded so far,
    /// then store it.
    pub fn load_file(&self, path: &Path) -> Result<RuleDocument> {
        let doc = parse_file(path)?;
        let macro_names = self.macro_names();
        let names: Vec<&str> = macro_names.iter().map(String::as_str).collect();
        self.accept(doc.clone(), &names)?;
        Ok(doc)
    }

    fn accept(&self, doc: RuleDocument, macro_names: &[&str]) -> Result<String> {
        let validation = validate_document(&doc, macro_names);
        for warning in &validation.warnings {
            warn!(rule_id = %doc.metadata().id, path = %warning.path, "{}", warning.message);
        }
        if !validation.valid {
            return Err(RuleError::Validation(format!(
                "rule '{}': {}",
                doc.metadata().id,
                validation.error_summary()
            )));
        }

        let id = doc.metadata().id.clone();
        let mut guard = self.documents.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = guard.get(&id) {
            if existing.kind() != doc.kind() {
                return Err(RuleError::Validation(format!(
                    "duplicate id '{}' used by a {} and a {}",
                    id,
                    existing.kind(),
                    doc.kind()
                )));
            }
        }
        guard.insert(id.clone(), doc);
        Ok(id)
    }

    pub fn rules_dir(&self) -> &Path {
        &self.rules_dir
    }

    /// Get the shared documents map containing all rule kinds.
    pub fn documents(&self) -> Arc<RwLock<HashMap<String, RuleDocument>>> {
        Arc::clone(&self.documents)
    }

    /// Loaded rules, ordered by id.
    pub fn rules(&self) -> Vec<Rule> {
        let guard = self.documents.read().unwrap_or_else(|e| e.into_inner());
        let mut rules: Vec<Rule> = guard.values().filter_map(|d| d.as_rule().cloned()).collect();
        rules.sort_by(|a, b| a.id().cmp(b.id()));
        rules
    }

    /// Parsed bodies of the enabled global macros.
    pub fn macros(&self) -> MacroTable {
        let guard = self.documents.read().unwrap_or_else(|e| e.into_inner());
        let globals: Vec<&GlobalMacro> = guard.values().filter_map(RuleDocument::as_macro).collect();
        macro_table(globals)
    }

    fn macro_names(&self) -> Vec<String> {
        let guard = self.documents.read().unwrap_or_else(|e| e.into_inner());
        guard
            .values()
            .filter_map(RuleDocument::as_macro)
            .filter(|m| m.metadata.enabled)
            .map(|m| m.name.clone())
            .collect()
    }
}

/// Two-pass parse: envelope for the `kind`, then the kind-specific type.
fn parse_file(path: &Path) -> Result<RuleDocument> {
    let contents = fs::read_to_string(path)?;
    let envelope: RuleEnvelope = serde_yaml::from_str(&contents)?;

    if envelope.metadata.id.is_empty() {
        return Err(RuleError::Validation("rule metadata.id must not be empty".to_string()));
    }

    envelope
        .parse_full()
        .map_err(|e| RuleError::Validation(format!("failed to parse rule '{}': {}", envelope.metadata.id, e)))
}
