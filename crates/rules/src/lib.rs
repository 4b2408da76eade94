//! Twin-graph rules engine.
//!
//! This crate provides:
//! - YAML rule and macro documents, a directory loader and validation
//! - the graph binder that resolves `[model]` references per twin
//! - the instance generator: one [`RuleInstance`] per twin of a rule's model
//! - the rule actor: resumable streaming evaluation of one instance
//! - command and insight tracking, persisted through a [`StateStore`]
//! - [`RuleEngine`], which ties the pieces together

pub mod actor;
pub mod binder;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod generator;
pub mod instance;
pub mod loader;
pub mod schema;
pub mod store;
pub mod validation;

#[cfg(test)]
mod fixtures;

pub use actor::{process, ActorState, CancelToken, Command, Insight, ProcessOutput};
pub use binder::{Binder, BoundExpression};
pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticLog};
pub use engine::RuleEngine;
pub use error::{BindError, ContractViolation, EngineError, StoreError};
pub use generator::{generate, generate_all, Generation};
pub use instance::{BoundParameter, BoundTrigger, RuleInstance};
pub use store::{InMemorySampleSource, InMemoryStateStore, SampleSource, StateStore};
