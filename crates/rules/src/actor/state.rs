//! Serializable per-instance actor state. Seeds the next `process` call.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use twinwatch_core::TwinId;
use twinwatch_expr::{Scope, Subject, TimeSeries, Value};

use super::command::Command;
use super::history::History;
use super::insight::InsightState;
use super::window::TruthWindow;
use crate::instance::RuleInstance;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerState {
    pub window: TruthWindow,
    /// Raw truth at the last evaluation; selects the hysteresis bound.
    pub latched: bool,
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorState {
    pub instance_id: String,
    /// Last processed timestamp. Samples at or before it are skipped.
    pub watermark: Option<DateTime<Utc>>,
    /// Latest value per point.
    pub points: IndexMap<TwinId, Value>,
    /// Current value per parameter.
    pub parameters: IndexMap<String, Value>,
    pub triggers: IndexMap<String, TriggerState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insight: Option<InsightState>,
    /// Values recorded for time-window functions.
    #[serde(default, skip_serializing_if = "History::is_empty")]
    pub history: History,
}

impl ActorState {
    pub fn new(instance: &RuleInstance) -> Self {
        Self {
            instance_id: instance.id.clone(),
            watermark: None,
            points: IndexMap::new(),
            parameters: IndexMap::new(),
            triggers: instance
                .triggers
                .iter()
                .map(|t| (t.name.clone(), TriggerState::default()))
                .collect(),
            insight: instance.result_parameter().map(|_| InsightState::new(instance)),
            history: History::default(),
        }
    }

    /// Continue from `prior`, keeping only what the instance still defines.
    pub(crate) fn resume(instance: &RuleInstance, prior: &ActorState) -> Self {
        let mut state = prior.clone();
        state.triggers = instance
            .triggers
            .iter()
            .map(|t| {
                let carried = prior.triggers.get(&t.name).cloned().unwrap_or_default();
                (t.name.clone(), carried)
            })
            .collect();
        state.parameters.retain(|name, _| instance.parameters.iter().any(|p| &p.name == name));
        if instance.result_parameter().is_none() {
            state.insight = None;
        } else if state.insight.is_none() {
            state.insight = Some(InsightState::new(instance));
        }
        state
    }

    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.triggers.values().filter_map(|t| t.command.as_ref())
    }

    /// Drop trigger state for names not in `keep`. Returns the dropped names.
    pub fn retain_triggers(&mut self, keep: &[&str]) -> Vec<String> {
        let removed: Vec<String> = self
            .triggers
            .keys()
            .filter(|name| !keep.contains(&name.as_str()))
            .cloned()
            .collect();
        self.triggers.retain(|name, _| keep.contains(&name.as_str()));
        removed
    }

    /// The state as expressions evaluated at `now` see it.
    pub(crate) fn at(&self, now: DateTime<Utc>) -> Frame<'_> {
        Frame { state: self, now }
    }
}

pub(crate) struct Frame<'a> {
    state: &'a ActorState,
    now: DateTime<Utc>,
}

impl Scope for Frame<'_> {
    fn variable(&self, name: &str) -> Option<Value> {
        self.state.parameters.get(name).cloned()
    }

    fn point(&self, twin_id: &str) -> Option<Value> {
        self.state.points.get(twin_id).cloned()
    }

    fn history(&self, subject: Subject<'_>) -> Option<&TimeSeries> {
        self.state.history.series(subject)
    }

    fn now(&self) -> Option<DateTime<Utc>> {
        Some(self.now)
    }
}
