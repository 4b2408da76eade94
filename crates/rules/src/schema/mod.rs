//! YAML schema for rule documents.
//!
//! - `RuleEnvelope`: lightweight first-pass header (apiVersion, kind, metadata)
//! - `RuleDocument`: enum dispatching to kind-specific types
//! - `Rule`: parameters, triggers and UI knobs targeting a twin model
//! - `GlobalMacro`: named expression shared across rules

mod document;
mod envelope;
mod kind;
mod macros;
mod metadata;
mod rule;

pub use document::*;
pub use envelope::*;
pub use kind::*;
pub use macros::*;
pub use metadata::*;
pub use rule::*;
