//! Rule expression language.
//!
//! Text such as `[dtmi:com:acme:SupplyAirTemperatureSensor;1] > 5°C & OPTION(a, b)`
//! parses into an [`Expression`] tree that prints back in canonical form,
//! folds constant sub-trees and evaluates against a [`Scope`] once every
//! twin reference has been bound to a concrete point. Time-window functions
//! such as `AVERAGE(x, 5d)` read the history a scope keeps.

pub mod ast;
pub mod display;
pub mod error;
pub mod eval;
pub mod fold;
pub mod lexer;
pub mod parser;
pub mod temporal;

pub use ast::{BinaryOp, Expression, Literal, Reference, TwinRef, UnaryOp};
pub use error::{EvalError, ParseError};
pub use eval::{evaluate, MapScope, Scope, Value};
pub use fold::fold_constants;
pub use parser::parse;
pub use temporal::{temporal_calls, Aggregate, Lookback, Subject, TemporalCall, TimeSeries, TimedValue};
