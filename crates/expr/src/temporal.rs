//! Time-window aggregation over the recent history of a variable or point:
//! `AVERAGE(x, 5d)`, `DELTA([sensor], 1h)`, `MAX(x, 1d, -4d)` and friends.
//!
//! The second argument is the window length. The optional third one moves
//! the window end into the past, so `MAX(x, 1d, -4d)` covers the day that
//! ended four days before the evaluation time. Between recorded values the
//! history is interpolated linearly; after the newest one its value holds.

use std::collections::VecDeque;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::ast::{Expression, Literal, UnaryOp};
use crate::error::EvalError;
use crate::eval::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregate {
    Average,
    Min,
    Max,
    Count,
    CountLeading,
    Any,
    All,
    Delta,
    Stnd,
}

impl Aggregate {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "AVERAGE" => Aggregate::Average,
            "MIN" => Aggregate::Min,
            "MAX" => Aggregate::Max,
            "COUNT" => Aggregate::Count,
            "COUNTLEADING" => Aggregate::CountLeading,
            "ANY" => Aggregate::Any,
            "ALL" => Aggregate::All,
            "DELTA" => Aggregate::Delta,
            "STND" => Aggregate::Stnd,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Aggregate::Average => "AVERAGE",
            Aggregate::Min => "MIN",
            Aggregate::Max => "MAX",
            Aggregate::Count => "COUNT",
            Aggregate::CountLeading => "COUNTLEADING",
            Aggregate::Any => "ANY",
            Aggregate::All => "ALL",
            Aggregate::Delta => "DELTA",
            Aggregate::Stnd => "STND",
        }
    }

    /// `MIN`, `MAX` and `AVERAGE` also work on plain arguments.
    fn windowed_only(self) -> bool {
        !matches!(self, Aggregate::Average | Aggregate::Min | Aggregate::Max)
    }
}

/// Where a time-window function reads history from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject<'a> {
    Variable(&'a str),
    Point(&'a str),
}

impl<'a> Subject<'a> {
    pub fn of(expr: &'a Expression) -> Option<Self> {
        match expr {
            Expression::Variable(name) => Some(Subject::Variable(name)),
            Expression::Point(id) => Some(Subject::Point(id)),
            _ => None,
        }
    }
}

/// Window of `length` ending `offset` (zero or negative) after now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookback {
    pub length: TimeDelta,
    pub offset: TimeDelta,
}

impl Lookback {
    /// How much history behind the evaluation time the window needs.
    pub fn horizon(&self) -> TimeDelta {
        self.length.checked_sub(&self.offset).unwrap_or(TimeDelta::MAX)
    }

    /// `[from, to]` for an evaluation at `now`. `None` when the window
    /// reaches outside the representable time range.
    pub fn bounds(&self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let to = now.checked_add_signed(self.offset)?;
        let from = to.checked_sub_signed(self.length)?;
        Some((from, to))
    }
}

/// A call such as `AVERAGE(x, 5d)` read as a time-window aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalCall<'a> {
    pub aggregate: Aggregate,
    pub subject: &'a Expression,
    pub lookback: Lookback,
}

impl<'a> TemporalCall<'a> {
    /// `None` for ordinary calls, e.g. `MAX(a, b)` or `ABS(x)`.
    pub fn recognize(name: &str, args: &'a [Expression]) -> Option<Result<Self, EvalError>> {
        let aggregate = Aggregate::from_name(name)?;
        let windowed = args.get(1).is_some_and(|arg| duration_of(arg).is_some());
        if !windowed && !aggregate.windowed_only() {
            return None;
        }
        Some(Self::build(aggregate, args))
    }

    fn build(aggregate: Aggregate, args: &'a [Expression]) -> Result<Self, EvalError> {
        let function = aggregate.name();
        let invalid = |reason: String| EvalError::Window {
            function: function.to_string(),
            reason,
        };
        if !(2..=3).contains(&args.len()) {
            return Err(EvalError::Arity {
                function: function.to_string(),
                expected: "2..3".to_string(),
                found: args.len(),
            });
        }

        let duration = |arg: &Expression| match duration_of(arg) {
            Some(Ok(d)) => Ok(d),
            Some(Err(reason)) => Err(invalid(reason)),
            None => Err(invalid(format!("'{}' is not a duration such as 5d or 1h", arg))),
        };
        let length = duration(&args[1])?;
        if length <= TimeDelta::zero() {
            return Err(invalid(format!("window length {} must be positive", args[1])));
        }
        let offset = match args.get(2) {
            Some(arg) => duration(arg)?,
            None => TimeDelta::zero(),
        };
        if offset > TimeDelta::zero() {
            return Err(invalid(format!("window offset {} must not lie in the future", args[2])));
        }

        Ok(Self {
            aggregate,
            subject: &args[0],
            lookback: Lookback { length, offset },
        })
    }

    pub fn subject(&self) -> Option<Subject<'a>> {
        Subject::of(self.subject)
    }
}

/// Every well-formed time-window call in `expr`, outermost first.
pub fn temporal_calls(expr: &Expression) -> Vec<TemporalCall<'_>> {
    let mut calls = Vec::new();
    expr.walk(&mut |node| {
        if let Expression::Call(name, args) = node {
            if let Some(Ok(call)) = TemporalCall::recognize(name, args) {
                calls.push(call);
            }
        }
    });
    calls
}

fn unit_millis(unit: &str) -> Option<f64> {
    Some(match unit {
        "s" | "sec" => 1_000.0,
        "min" => 60_000.0,
        "h" | "hr" => 3_600_000.0,
        "d" | "day" | "days" => 86_400_000.0,
        "w" | "week" | "weeks" => 604_800_000.0,
        _ => return None,
    })
}

/// A numeric literal with a time unit. `None` when `expr` is not one; an
/// error when it is but does not fit a `TimeDelta`.
fn duration_of(expr: &Expression) -> Option<Result<TimeDelta, String>> {
    match expr {
        Expression::Unary(UnaryOp::Neg, inner) => duration_of(inner).map(|d| d.map(|d| -d)),
        Expression::Literal(Literal::Number { value, unit: Some(unit) }) => {
            let ms = value * unit_millis(unit)?;
            // Beyond ±2^62 ms (about 146 million years) nothing is representable anyway.
            let fits = ms.is_finite() && ms.abs() < 4.6e18;
            Some(
                fits.then(|| TimeDelta::try_milliseconds(ms.round() as i64))
                    .flatten()
                    .ok_or_else(|| format!("duration {}{} is out of range", value, unit)),
            )
        }
        _ => None,
    }
}

// ── History ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimedValue {
    pub at: DateTime<Utc>,
    pub value: f64,
}

/// Recent numeric history of one variable or point, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeSeries {
    values: VecDeque<TimedValue>,
}

impl TimeSeries {
    /// Append `value` at `at`. A value at the newest instant replaces it;
    /// older instants and non-finite values are ignored.
    pub fn record(&mut self, at: DateTime<Utc>, value: f64) {
        if !value.is_finite() {
            return;
        }
        match self.values.back_mut() {
            Some(last) if last.at == at => last.value = value,
            Some(last) if last.at > at => {}
            _ => self.values.push_back(TimedValue { at, value }),
        }
    }

    /// Forget values before `keep_from`, except the newest of them, which
    /// still holds at `keep_from`.
    pub fn prune(&mut self, keep_from: DateTime<Utc>) {
        while self.values.len() > 1 && self.values[1].at <= keep_from {
            self.values.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn latest(&self) -> Option<&TimedValue> {
        self.values.back()
    }

    fn value_at(&self, t: DateTime<Utc>) -> Option<f64> {
        let after = self.values.partition_point(|v| v.at <= t);
        let prev = self.values.get(after.checked_sub(1)?)?;
        let Some(next) = self.values.get(after) else {
            return Some(prev.value);
        };
        let span = (next.at - prev.at).num_milliseconds() as f64;
        let part = (t - prev.at).num_milliseconds() as f64;
        Some(prev.value + (next.value - prev.value) * part / span)
    }

    /// Aggregate over `[from, to]`. `None` when nothing is known at or
    /// before `to`. When history starts inside the window, the window is
    /// shortened to begin at the oldest value.
    pub fn aggregate(&self, aggregate: Aggregate, from: DateTime<Utc>, to: DateTime<Utc>) -> Option<Value> {
        let end_value = self.value_at(to)?;
        let start = from.max(self.values.front()?.at);
        let start_value = self.value_at(start)?;

        // Interpolated outline of the window, for integrals and extremes.
        let mut outline = vec![(start, start_value)];
        outline.extend(self.values.iter().filter(|v| v.at > start && v.at < to).map(|v| (v.at, v.value)));
        if to > start {
            outline.push((to, end_value));
        }

        // Recorded values: the one holding at `start`, then those after it.
        let held = self.values.iter().rev().find(|v| v.at <= start).map(|v| v.value);
        let observed: Vec<f64> = held
            .into_iter()
            .chain(self.values.iter().filter(|v| v.at > start && v.at <= to).map(|v| v.value))
            .collect();

        let number = match aggregate {
            Aggregate::Average => average(&outline).unwrap_or(end_value),
            Aggregate::Min => outline.iter().map(|(_, v)| *v).fold(f64::INFINITY, f64::min),
            Aggregate::Max => outline.iter().map(|(_, v)| *v).fold(f64::NEG_INFINITY, f64::max),
            Aggregate::Delta => end_value - start_value,
            Aggregate::Stnd => standard_deviation(&observed),
            Aggregate::Count => self.values.iter().filter(|v| v.at >= from && v.at <= to).count() as f64,
            Aggregate::CountLeading => {
                let mut current = self.values.iter().rev().find(|v| v.at < from).is_some_and(|v| v.value != 0.0);
                let mut edges = 0u32;
                for v in self.values.iter().filter(|v| v.at >= from && v.at <= to) {
                    let truthy = v.value != 0.0;
                    if truthy && !current {
                        edges += 1;
                    }
                    current = truthy;
                }
                f64::from(edges)
            }
            Aggregate::Any => return Some(Value::Bool(observed.iter().any(|v| *v != 0.0))),
            Aggregate::All => return Some(Value::Bool(observed.iter().all(|v| *v != 0.0))),
        };
        Some(Value::Number(number))
    }
}

/// Trapezoid integral over the outline divided by its span.
fn average(outline: &[(DateTime<Utc>, f64)]) -> Option<f64> {
    let (first, last) = (outline.first()?, outline.last()?);
    let span = (last.0 - first.0).num_milliseconds();
    if span <= 0 {
        return None;
    }
    let integral: f64 = outline
        .windows(2)
        .map(|w| (w[0].1 + w[1].1) / 2.0 * (w[1].0 - w[0].0).num_milliseconds() as f64)
        .sum();
    Some(integral / span as f64)
}

fn standard_deviation(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;
    use chrono::TimeZone;

    fn hour(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 8, 25, 0, 0, 0).unwrap() + TimeDelta::hours(h)
    }

    fn series(points: &[(i64, f64)]) -> TimeSeries {
        let mut s = TimeSeries::default();
        for (h, v) in points {
            s.record(hour(*h), *v);
        }
        s
    }

    fn call(text: &str) -> Expression {
        parse(text).unwrap()
    }

    fn recognize(expr: &Expression) -> Option<Result<TemporalCall<'_>, EvalError>> {
        match expr {
            Expression::Call(name, args) => TemporalCall::recognize(name, args),
            _ => None,
        }
    }

    #[test]
    fn windows_are_read_from_time_literals() {
        let expr = call("AVERAGE(result, 1d, -4d)");
        let parsed = recognize(&expr).unwrap().unwrap();
        assert_eq!(parsed.aggregate, Aggregate::Average);
        assert_eq!(parsed.subject(), Some(Subject::Variable("result")));
        assert_eq!(parsed.lookback.length, TimeDelta::days(1));
        assert_eq!(parsed.lookback.offset, TimeDelta::days(-4));
        assert_eq!(parsed.lookback.horizon(), TimeDelta::days(5));
    }

    #[test]
    fn plain_calls_are_not_temporal() {
        assert!(recognize(&call("MAX(a, b, 3)")).is_none());
        assert!(recognize(&call("AVERAGE(a, 5)")).is_none());
        assert!(recognize(&call("ABS(x)")).is_none());
    }

    #[test]
    fn malformed_windows_are_errors() {
        for text in ["DELTA(x)", "COUNT(x, 5)", "MAX(x, 1h, 2h)", "ANY(x, 0h)", "MIN(x, 1h, 1h, 1h)"] {
            let expr = call(text);
            assert!(matches!(recognize(&expr), Some(Err(_))), "{}", text);
        }
        let huge = call(&format!("MAX(x, 1{}d)", "0".repeat(30)));
        match recognize(&huge) {
            Some(Err(EvalError::Window { reason, .. })) => assert!(reason.contains("out of range"), "{}", reason),
            other => panic!("expected a window error, got {:?}", other),
        }
    }

    #[test]
    fn calls_are_collected_from_nested_expressions() {
        let expr = call("IF(ANY(alarm, 2h), DELTA(temp, 1d), 0) + 1");
        let subjects: Vec<_> = temporal_calls(&expr).iter().filter_map(|c| c.subject()).collect();
        assert_eq!(subjects, vec![Subject::Variable("alarm"), Subject::Variable("temp")]);
    }

    #[test]
    fn average_is_time_weighted() {
        // 10 for two hours, ramping to 20 over the third.
        let s = series(&[(0, 10.0), (2, 10.0), (3, 20.0)]);
        let avg = s.aggregate(Aggregate::Average, hour(0), hour(3)).unwrap();
        assert_eq!(avg, Value::Number((10.0 * 2.0 + 15.0) / 3.0));
    }

    #[test]
    fn window_edges_are_interpolated() {
        let s = series(&[(0, 0.0), (4, 40.0)]);
        // [1h, 3h] on a straight ramp.
        assert_eq!(s.aggregate(Aggregate::Min, hour(1), hour(3)), Some(Value::Number(10.0)));
        assert_eq!(s.aggregate(Aggregate::Max, hour(1), hour(3)), Some(Value::Number(30.0)));
        assert_eq!(s.aggregate(Aggregate::Delta, hour(1), hour(3)), Some(Value::Number(20.0)));
    }

    #[test]
    fn newest_value_holds_and_history_may_start_late() {
        let s = series(&[(5, 7.0)]);
        assert_eq!(s.aggregate(Aggregate::Average, hour(0), hour(9)), Some(Value::Number(7.0)));
        assert_eq!(s.aggregate(Aggregate::Delta, hour(0), hour(9)), Some(Value::Number(0.0)));
        assert_eq!(s.aggregate(Aggregate::Average, hour(0), hour(4)), None);
    }

    #[test]
    fn counts_and_truth() {
        let s = series(&[(0, 1.0), (1, 0.0), (2, 1.0), (3, 1.0), (4, 0.0), (5, 1.0)]);
        assert_eq!(s.aggregate(Aggregate::Count, hour(1), hour(4)), Some(Value::Number(4.0)));
        // 0 at 1h, edges at 2h and 5h.
        assert_eq!(s.aggregate(Aggregate::CountLeading, hour(1), hour(5)), Some(Value::Number(2.0)));
        assert_eq!(s.aggregate(Aggregate::Any, hour(1), hour(1)), Some(Value::Bool(false)));
        assert_eq!(s.aggregate(Aggregate::All, hour(2), hour(3)), Some(Value::Bool(true)));
        assert_eq!(s.aggregate(Aggregate::All, hour(2), hour(4)), Some(Value::Bool(false)));
    }

    #[test]
    fn standard_deviation_of_recorded_values() {
        let s = series(&[(0, 2.0), (1, 4.0), (2, 4.0), (3, 4.0), (4, 5.0), (5, 5.0), (6, 7.0), (7, 9.0)]);
        assert_eq!(s.aggregate(Aggregate::Stnd, hour(0), hour(7)), Some(Value::Number(2.0)));
        assert_eq!(series(&[(0, 3.0)]).aggregate(Aggregate::Stnd, hour(0), hour(1)), Some(Value::Number(0.0)));
    }

    #[test]
    fn pruning_keeps_the_value_holding_at_the_cutoff() {
        let mut s = series(&[(0, 1.0), (1, 2.0), (2, 3.0), (3, 4.0)]);
        s.prune(hour(2) - TimeDelta::minutes(30));
        assert_eq!(s.len(), 3);
        assert_eq!(s.aggregate(Aggregate::Min, hour(2) - TimeDelta::minutes(30), hour(3)), Some(Value::Number(2.5)));
        s.record(hour(3), 9.0);
        s.record(hour(1), 0.0);
        s.record(hour(4), f64::NAN);
        assert_eq!(s.latest().map(|v| v.value), Some(9.0));
        assert_eq!(s.len(), 3);
    }
}
