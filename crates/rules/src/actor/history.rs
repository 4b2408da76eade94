//! History kept for time-window functions such as `AVERAGE(x, 5d)`.
//!
//! Only subjects that some expression of the instance aggregates over are
//! recorded, and each keeps just enough to cover its longest window.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use twinwatch_core::TwinId;
use twinwatch_expr::{temporal_calls, Subject, TimeSeries, Value};

use crate::instance::RuleInstance;

/// How far back each subject's history must reach.
#[derive(Debug, Default)]
pub(crate) struct Horizons {
    variables: HashMap<String, TimeDelta>,
    points: HashMap<TwinId, TimeDelta>,
}

impl Horizons {
    pub(crate) fn of(instance: &RuleInstance) -> Self {
        let mut horizons = Self::default();
        let expressions = instance
            .parameters
            .iter()
            .map(|p| &p.expression)
            .chain(instance.triggers.iter().flat_map(|t| [&t.condition, &t.value]));
        for expr in expressions {
            for call in temporal_calls(expr) {
                let (map, key) = match call.subject() {
                    Some(Subject::Variable(name)) => (&mut horizons.variables, name),
                    Some(Subject::Point(id)) => (&mut horizons.points, id),
                    None => continue,
                };
                let horizon = call.lookback.horizon();
                let entry = map.entry(key.to_string()).or_insert(horizon);
                *entry = (*entry).max(horizon);
            }
        }
        horizons
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub variables: IndexMap<String, TimeSeries>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub points: IndexMap<TwinId, TimeSeries>,
}

impl History {
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty() && self.points.is_empty()
    }

    pub fn series(&self, subject: Subject<'_>) -> Option<&TimeSeries> {
        match subject {
            Subject::Variable(name) => self.variables.get(name),
            Subject::Point(id) => self.points.get(id),
        }
    }

    pub(crate) fn record_variable(&mut self, horizons: &Horizons, name: &str, at: DateTime<Utc>, value: &Value) {
        if let (true, Some(x)) = (horizons.variables.contains_key(name), value.as_number()) {
            self.variables.entry(name.to_string()).or_default().record(at, x);
        }
    }

    pub(crate) fn record_point(&mut self, horizons: &Horizons, id: &str, at: DateTime<Utc>, value: &Value) {
        if let (true, Some(x)) = (horizons.points.contains_key(id), value.as_number()) {
            self.points.entry(id.to_string()).or_default().record(at, x);
        }
    }

    /// Forget values older than each subject's horizon, and subjects no
    /// expression aggregates over any more.
    pub(crate) fn prune(&mut self, horizons: &Horizons, now: DateTime<Utc>) {
        let keep_from = |horizon: &TimeDelta| now.checked_sub_signed(*horizon).unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.variables.retain(|name, series| match horizons.variables.get(name) {
            Some(horizon) => {
                series.prune(keep_from(horizon));
                true
            }
            None => false,
        });
        self.points.retain(|id, series| match horizons.points.get(id) {
            Some(horizon) => {
                series.prune(keep_from(horizon));
                true
            }
            None => false,
        });
    }
}
