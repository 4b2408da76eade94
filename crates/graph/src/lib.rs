//! In-memory twin graph snapshot and the query contract rules bind against.

pub mod document;
pub mod query;
pub mod store;

pub use document::{GraphDocument, GraphError};
pub use query::{Resolution, TwinGraph};
pub use store::{GraphSnapshot, GraphStats, ModelDef, Relationship, Twin};
