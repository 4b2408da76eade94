//! Loader errors and the per-file load report.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("cannot read rule document: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed rule YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The document parsed but was rejected by validation or by a clash
    /// with an already loaded document.
    #[error("rule rejected: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, RuleError>;

/// What happened to one file during a directory scan.
#[derive(Debug)]
pub struct LoadResult {
    pub path: PathBuf,
    pub status: LoadStatus,
}

#[derive(Debug)]
pub enum LoadStatus {
    Loaded { rule_id: String },
    Skipped { reason: String },
    Failed { error: String },
}

impl LoadResult {
    pub fn is_loaded(&self) -> bool {
        matches!(self.status, LoadStatus::Loaded { .. })
    }

    pub fn loaded_id(&self) -> Option<&str> {
        match &self.status {
            LoadStatus::Loaded { rule_id } => Some(rule_id),
            _ => None,
        }
    }
}
