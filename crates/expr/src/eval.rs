//! Expression evaluation against a scope of variable and point values.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ast::{BinaryOp, Expression, Literal, UnaryOp};
use crate::error::EvalError;
use crate::temporal::{Aggregate, Subject, TemporalCall, TimeSeries};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(f64),
    Text(String),
    Null,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::Null => "null",
        }
    }

    /// Numeric view; booleans read as 1/0.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Truth view; numbers are true when non-zero.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => Some(*n != 0.0),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(t) => write!(f, "{:?}", t),
            Value::Null => f.write_str("null"),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// Where evaluation looks up names.
pub trait Scope {
    /// Value of a named variable (usually another rule parameter).
    fn variable(&self, name: &str) -> Option<Value>;

    /// Latest reading of a bound point.
    fn point(&self, twin_id: &str) -> Option<Value>;

    /// Recorded history of a variable or point. Without one, time-window
    /// functions treat the current value as constant over the window.
    fn history(&self, _subject: Subject<'_>) -> Option<&TimeSeries> {
        None
    }

    /// Instant the expression is evaluated at.
    fn now(&self) -> Option<DateTime<Utc>> {
        None
    }
}

/// Plain map-backed scope.
#[derive(Debug, Clone, Default)]
pub struct MapScope {
    pub variables: HashMap<String, Value>,
    pub points: HashMap<String, Value>,
    /// Variable histories, keyed by variable name.
    pub history: HashMap<String, TimeSeries>,
    pub now: Option<DateTime<Utc>>,
}

impl MapScope {
    pub fn with_variable(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.variables.insert(name.to_string(), value.into());
        self
    }

    pub fn with_point(mut self, id: &str, value: impl Into<Value>) -> Self {
        self.points.insert(id.to_string(), value.into());
        self
    }

    pub fn with_history(mut self, name: &str, series: TimeSeries, now: DateTime<Utc>) -> Self {
        self.history.insert(name.to_string(), series);
        self.now = Some(now);
        self
    }
}

impl Scope for MapScope {
    fn variable(&self, name: &str) -> Option<Value> {
        self.variables.get(name).cloned()
    }

    fn point(&self, twin_id: &str) -> Option<Value> {
        self.points.get(twin_id).cloned()
    }

    fn history(&self, subject: Subject<'_>) -> Option<&TimeSeries> {
        match subject {
            Subject::Variable(name) => self.history.get(name),
            Subject::Point(_) => None,
        }
    }

    fn now(&self) -> Option<DateTime<Utc>> {
        self.now
    }
}

/// Evaluate `expr`. Twin references must already be bound to points.
pub fn evaluate(expr: &Expression, scope: &dyn Scope) -> Result<Value, EvalError> {
    match expr {
        Expression::Literal(lit) => Ok(literal_value(lit)),
        Expression::Variable(name) => scope
            .variable(name)
            .ok_or_else(|| EvalError::MissingValue(name.clone())),
        Expression::Point(id) => match scope.point(id) {
            Some(Value::Number(n)) if !n.is_finite() => Err(EvalError::NonFiniteReading(id.clone())),
            Some(value) => Ok(value),
            None => Err(EvalError::MissingValue(id.clone())),
        },
        Expression::Twin(twin) => Err(EvalError::Unbound(twin.model.clone())),
        Expression::Unary(op, operand) => {
            let v = evaluate(operand, scope)?;
            match op {
                UnaryOp::Neg => Ok(Value::Number(-number(&v, "-")?)),
                UnaryOp::Not => Ok(Value::Bool(!boolean(&v, "!")?)),
            }
        }
        Expression::Binary(op, left, right) => evaluate_binary(*op, left, right, scope),
        Expression::Call(name, args) => evaluate_call(name, args, scope),
    }
}

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Number { value, unit } if unit.as_deref() == Some("%") => Value::Number(value / 100.0),
        Literal::Number { value, .. } => Value::Number(*value),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Text(t) => Value::Text(t.clone()),
        Literal::Null => Value::Null,
    }
}

fn number(v: &Value, op: &str) -> Result<f64, EvalError> {
    v.as_number().ok_or_else(|| EvalError::TypeMismatch {
        op: op.to_string(),
        found: v.type_name().to_string(),
    })
}

fn boolean(v: &Value, op: &str) -> Result<bool, EvalError> {
    v.as_bool().ok_or_else(|| EvalError::TypeMismatch {
        op: op.to_string(),
        found: v.type_name().to_string(),
    })
}

fn finite(value: f64, op: &str) -> Result<Value, EvalError> {
    if value.is_finite() {
        Ok(Value::Number(value))
    } else {
        Err(EvalError::NonFinite { op: op.to_string() })
    }
}

fn evaluate_binary(op: BinaryOp, left: &Expression, right: &Expression, scope: &dyn Scope) -> Result<Value, EvalError> {
    let sym = op.symbol();
    match op {
        BinaryOp::And => {
            if !boolean(&evaluate(left, scope)?, sym)? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(boolean(&evaluate(right, scope)?, sym)?))
        }
        BinaryOp::Or => {
            if boolean(&evaluate(left, scope)?, sym)? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(boolean(&evaluate(right, scope)?, sym)?))
        }
        BinaryOp::Eq | BinaryOp::Ne => {
            let l = evaluate(left, scope)?;
            let r = evaluate(right, scope)?;
            let equal = match (&l, &r) {
                (Value::Text(a), Value::Text(b)) => a == b,
                (Value::Null, Value::Null) => true,
                (Value::Null, _) | (_, Value::Null) => false,
                _ => match (l.as_number(), r.as_number()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                },
            };
            Ok(Value::Bool(if op == BinaryOp::Eq { equal } else { !equal }))
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let l = evaluate(left, scope)?;
            let r = evaluate(right, scope)?;
            let ordering = match (&l, &r) {
                (Value::Text(a), Value::Text(b)) => a.partial_cmp(b),
                _ => number(&l, sym)?.partial_cmp(&number(&r, sym)?),
            };
            let Some(ordering) = ordering else {
                return Err(EvalError::NonFinite { op: sym.to_string() });
            };
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Pow => {
            let l = number(&evaluate(left, scope)?, sym)?;
            let r = number(&evaluate(right, scope)?, sym)?;
            let result = match op {
                BinaryOp::Add => l + r,
                BinaryOp::Sub => l - r,
                BinaryOp::Mul => l * r,
                BinaryOp::Div => l / r,
                _ => l.powf(r),
            };
            finite(result, sym)
        }
    }
}

fn arity(function: &str, args: &[Expression], min: usize, max: Option<usize>) -> Result<(), EvalError> {
    let ok = args.len() >= min && max.map_or(true, |m| args.len() <= m);
    if ok {
        return Ok(());
    }
    let expected = match max {
        Some(m) if m == min => m.to_string(),
        Some(m) => format!("{}..{}", min, m),
        None => format!("at least {}", min),
    };
    Err(EvalError::Arity {
        function: function.to_string(),
        expected,
        found: args.len(),
    })
}

fn numeric_args(function: &str, args: &[Expression], scope: &dyn Scope) -> Result<Vec<f64>, EvalError> {
    args.iter()
        .map(|a| number(&evaluate(a, scope)?, function))
        .collect()
}

fn evaluate_call(name: &str, args: &[Expression], scope: &dyn Scope) -> Result<Value, EvalError> {
    if let Some(call) = TemporalCall::recognize(name, args) {
        return evaluate_temporal(&call?, scope);
    }
    match name {
        "IF" => {
            arity(name, args, 3, Some(3))?;
            if boolean(&evaluate(&args[0], scope)?, name)? {
                evaluate(&args[1], scope)
            } else {
                evaluate(&args[2], scope)
            }
        }
        // First alternative that evaluates.
        "OPTION" => {
            arity(name, args, 1, None)?;
            let mut last_err = None;
            for arg in args {
                match evaluate(arg, scope) {
                    Ok(v) => return Ok(v),
                    Err(e) => last_err = Some(e),
                }
            }
            Err(last_err.unwrap_or_else(|| EvalError::MissingValue(name.to_string())))
        }
        "ABS" | "SQRT" | "FLOOR" | "CEILING" | "FAHRENHEIT" | "CELSIUS" => {
            arity(name, args, 1, Some(1))?;
            let x = numeric_args(name, args, scope)?[0];
            let result = match name {
                "ABS" => x.abs(),
                "SQRT" => x.sqrt(),
                "FLOOR" => x.floor(),
                "CEILING" => x.ceil(),
                "FAHRENHEIT" => x * 9.0 / 5.0 + 32.0,
                _ => (x - 32.0) * 5.0 / 9.0,
            };
            finite(result, name)
        }
        "ROUND" => {
            arity(name, args, 1, Some(2))?;
            let values = numeric_args(name, args, scope)?;
            let digits = values.get(1).copied().unwrap_or(0.0);
            let scale = 10f64.powf(digits.trunc());
            finite((values[0] * scale).round() / scale, name)
        }
        "MIN" | "MAX" | "AVERAGE" => {
            arity(name, args, 1, None)?;
            let values = numeric_args(name, args, scope)?;
            let result = match name {
                "MIN" => values.iter().copied().fold(f64::INFINITY, f64::min),
                "MAX" => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                _ => values.iter().sum::<f64>() / values.len() as f64,
            };
            finite(result, name)
        }
        _ => Err(EvalError::UnknownFunction(name.to_string())),
    }
}

fn evaluate_temporal(call: &TemporalCall<'_>, scope: &dyn Scope) -> Result<Value, EvalError> {
    let function = call.aggregate.name();
    let recorded = call.subject().and_then(|s| scope.history(s)).zip(scope.now());
    let Some((series, now)) = recorded else {
        let value = evaluate(call.subject, scope)?;
        return Ok(match call.aggregate {
            Aggregate::Delta | Aggregate::Stnd | Aggregate::CountLeading => Value::Number(0.0),
            Aggregate::Count => Value::Number(1.0),
            Aggregate::Any | Aggregate::All => Value::Bool(boolean(&value, function)?),
            Aggregate::Average | Aggregate::Min | Aggregate::Max => Value::Number(number(&value, function)?),
        });
    };

    let window_error = |reason: String| EvalError::Window {
        function: function.to_string(),
        reason,
    };
    let (from, to) = call
        .lookback
        .bounds(now)
        .ok_or_else(|| window_error("window reaches outside the supported time range".to_string()))?;
    series
        .aggregate(call.aggregate, from, to)
        .ok_or_else(|| window_error(format!("no history of {} at or before {}", call.subject, to)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;

    fn eval(text: &str, scope: &MapScope) -> Result<Value, EvalError> {
        evaluate(&parse(text).unwrap(), scope)
    }

    #[test]
    fn arithmetic_and_precedence() {
        let s = MapScope::default();
        assert_eq!(eval("1 + 2 * 3", &s), Ok(Value::Number(7.0)));
        assert_eq!(eval("2 ^ 3 ^ 2", &s), Ok(Value::Number(512.0)));
        assert_eq!(eval("-2 ^ 2", &s), Ok(Value::Number(4.0)));
        assert_eq!(eval("50% * 10", &s), Ok(Value::Number(5.0)));
    }

    #[test]
    fn logic_short_circuits() {
        let s = MapScope::default().with_variable("on", true);
        assert_eq!(eval("on | missing", &s), Ok(Value::Bool(true)));
        assert_eq!(eval("!on & missing", &s), Ok(Value::Bool(false)));
        assert_eq!(eval("on & missing", &s), Err(EvalError::MissingValue("missing".into())));
    }

    #[test]
    fn comparisons_coerce_bools() {
        let s = MapScope::default().with_variable("t", 21.5).with_point("p1", true);
        assert_eq!(eval("t > 20", &s), Ok(Value::Bool(true)));
        assert_eq!(eval("t <= 21.5 & t >= 21.5", &s), Ok(Value::Bool(true)));
        let point_eq = Expression::binary(BinaryOp::Eq, Expression::Point("p1".into()), Expression::number(1.0));
        assert_eq!(evaluate(&point_eq, &s), Ok(Value::Bool(true)));
        assert_eq!(eval("'a' < 'b'", &s), Ok(Value::Bool(true)));
        assert_eq!(eval("null == null", &s), Ok(Value::Bool(true)));
    }

    #[test]
    fn non_finite_reading_is_an_error() {
        let s = MapScope::default().with_point("sat", f64::NAN).with_point("rat", f64::INFINITY);
        let read = |id: &str| evaluate(&Expression::binary(BinaryOp::Gt, Expression::Point(id.into()), Expression::number(20.0)), &s);
        assert_eq!(read("sat"), Err(EvalError::NonFiniteReading("sat".into())));
        assert_eq!(read("rat"), Err(EvalError::NonFiniteReading("rat".into())));
    }

    #[test]
    fn time_window_functions_read_history() {
        use crate::temporal::TimeSeries;
        use chrono::{TimeDelta, TimeZone};

        let t0 = Utc.with_ymd_and_hms(2022, 8, 25, 0, 0, 0).unwrap();
        let mut series = TimeSeries::default();
        for (h, v) in [(0, 10.0), (24, 20.0), (48, 30.0)] {
            series.record(t0 + TimeDelta::hours(h), v);
        }
        let s = MapScope::default()
            .with_variable("result", 30.0)
            .with_history("result", series, t0 + TimeDelta::hours(48));

        assert_eq!(eval("AVERAGE(result, 2d)", &s), Ok(Value::Number(20.0)));
        assert_eq!(eval("DELTA(result, 1d)", &s), Ok(Value::Number(10.0)));
        assert_eq!(eval("MAX(result, 1d, -1d)", &s), Ok(Value::Number(20.0)));
        assert_eq!(eval("COUNT(result, 5d)", &s), Ok(Value::Number(3.0)));
        assert!(matches!(eval("MIN(result, 1d, -3d)", &s), Err(EvalError::Window { .. })));
    }

    #[test]
    fn time_window_functions_without_history_use_the_current_value() {
        let s = MapScope::default().with_variable("result", 20.0);
        assert_eq!(eval("AVERAGE(result, 5d)", &s), Ok(Value::Number(20.0)));
        assert_eq!(eval("MAX(1, 1d)", &s), Ok(Value::Number(1.0)));
        assert_eq!(eval("DELTA(result, 1h)", &s), Ok(Value::Number(0.0)));
        assert_eq!(eval("ANY(result, 1h)", &s), Ok(Value::Bool(true)));
        assert!(matches!(eval("STND(result, 5)", &s), Err(EvalError::Window { .. })));
        assert!(matches!(eval("ANY(result)", &s), Err(EvalError::Arity { .. })));
    }

    #[test]
    fn division_by_zero_is_non_finite() {
        let s = MapScope::default();
        assert!(matches!(eval("1 / 0", &s), Err(EvalError::NonFinite { .. })));
    }

    #[test]
    fn type_mismatch_is_reported() {
        let s = MapScope::default();
        assert!(matches!(eval("'a' + 1", &s), Err(EvalError::TypeMismatch { .. })));
        assert!(matches!(eval("-null", &s), Err(EvalError::TypeMismatch { .. })));
    }

    #[test]
    fn unbound_twin_reference_cannot_evaluate() {
        let s = MapScope::default();
        assert_eq!(
            eval("[dtmi:a:Sensor;1] > 1", &s),
            Err(EvalError::Unbound("dtmi:a:Sensor;1".into()))
        );
    }

    #[test]
    fn functions() {
        let s = MapScope::default().with_variable("x", -3.0);
        assert_eq!(eval("ABS(x)", &s), Ok(Value::Number(3.0)));
        assert_eq!(eval("MAX(x, 2, 1)", &s), Ok(Value::Number(2.0)));
        assert_eq!(eval("MIN(x, 2)", &s), Ok(Value::Number(-3.0)));
        assert_eq!(eval("IF(x < 0, 'neg', 'pos')", &s), Ok(Value::Text("neg".into())));
        assert_eq!(eval("FAHRENHEIT(100)", &s), Ok(Value::Number(212.0)));
        assert_eq!(eval("ROUND(1.26, 1)", &s), Ok(Value::Number(1.3)));
        assert_eq!(eval("OPTION(missing, x)", &s), Ok(Value::Number(-3.0)));
        assert!(matches!(eval("NOPE(1)", &s), Err(EvalError::UnknownFunction(_))));
        assert!(matches!(eval("ABS(1, 2)", &s), Err(EvalError::Arity { .. })));
    }
}
