//! Insight tracker: fault history of one rule instance, driven by the
//! windowed value of its `result` parameter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use twinwatch_core::TwinId;

use super::window::TruthWindow;
use crate::instance::RuleInstance;

/// A run of consecutive evaluations with the same fault state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightOccurrence {
    pub started: DateTime<Utc>,
    pub ended: DateTime<Utc>,
    pub is_faulted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    /// Same as the rule instance id.
    pub id: String,
    pub rule_id: String,
    pub equipment_id: TwinId,
    pub is_faulty: bool,
    /// False when the latest evaluation of `result` failed.
    pub is_valid: bool,
    /// Number of intervals that entered the faulted state.
    pub faulted_count: u64,
    pub earliest_faulted: Option<DateTime<Utc>>,
    pub last_faulted: Option<DateTime<Utc>>,
    pub occurrences: Vec<InsightOccurrence>,
}

impl Insight {
    pub fn new(instance: &RuleInstance) -> Self {
        Self {
            id: instance.id.clone(),
            rule_id: instance.rule_id.clone(),
            equipment_id: instance.twin_id.clone(),
            is_faulty: false,
            is_valid: true,
            faulted_count: 0,
            earliest_faulted: None,
            last_faulted: None,
            occurrences: Vec::new(),
        }
    }

    fn record(&mut self, t: DateTime<Utc>, faulted: bool, max_occurrences: usize) {
        self.is_valid = true;
        match self.occurrences.last_mut() {
            Some(last) if last.is_faulted == faulted => last.ended = t,
            _ => self.occurrences.push(InsightOccurrence {
                started: t,
                ended: t,
                is_faulted: faulted,
            }),
        }
        if self.occurrences.len() > max_occurrences {
            let excess = self.occurrences.len() - max_occurrences;
            self.occurrences.drain(..excess);
        }

        if faulted {
            if !self.is_faulty {
                self.faulted_count += 1;
            }
            self.earliest_faulted.get_or_insert(t);
            self.last_faulted = Some(t);
        }
        self.is_faulty = faulted;
    }
}

/// Insight plus the window feeding it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightState {
    pub window: TruthWindow,
    pub insight: Insight,
}

impl InsightState {
    pub fn new(instance: &RuleInstance) -> Self {
        Self {
            window: TruthWindow::default(),
            insight: Insight::new(instance),
        }
    }

    pub(crate) fn observe(&mut self, t: DateTime<Utc>, faulted: bool, max_occurrences: usize) {
        self.insight.record(t, faulted, max_occurrences);
    }

    pub(crate) fn invalidate(&mut self) {
        self.insight.is_valid = false;
    }
}
