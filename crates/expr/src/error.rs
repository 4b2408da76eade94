use thiserror::Error;

/// Malformed expression text. `position` is a character offset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at {position}: {reason}")]
pub struct ParseError {
    pub position: usize,
    pub reason: String,
}

impl ParseError {
    pub fn new(position: usize, reason: impl Into<String>) -> Self {
        Self {
            position,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("type mismatch in {op}: got {found}")]
    TypeMismatch { op: String, found: String },

    #[error("no value for '{0}'")]
    MissingValue(String),

    #[error("twin reference [{0}] was not bound to a point")]
    Unbound(String),

    #[error("{op} produced a non-finite result")]
    NonFinite { op: String },

    #[error("unknown function {0}")]
    UnknownFunction(String),

    #[error("{function} expects {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: String,
        found: usize,
    },

    #[error("point {0} reported a non-finite reading")]
    NonFiniteReading(String),

    #[error("{function}: {reason}")]
    Window { function: String, reason: String },

    #[error("numeric condition needs a MinTrigger or MaxTrigger bound")]
    MissingBand,
}
