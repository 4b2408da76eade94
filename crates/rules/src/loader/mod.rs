//! Filesystem rule loader.
//!
//! Scans a rules directory for YAML documents, deserializes them through the
//! two-pass envelope (RuleEnvelope -> RuleDocument) and validates every rule
//! against the global macros found in the same scan.

mod core;
mod error;


pub use self::core::RuleLoader;
pub use self::error::{LoadResult, LoadStatus, Result, RuleError};
