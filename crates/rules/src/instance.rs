//! Rule instances: a rule bound to one primary twin.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use twinwatch_core::{PathEdge, TwinId};
use twinwatch_expr::Expression;

use crate::schema::{CommandType, WindowSettings, RESULT_FIELD};

/// A rule parameter with every twin reference resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundParameter {
    pub name: String,
    pub field_id: String,
    pub expression: Expression,
    pub points: Vec<TwinId>,
    pub path: Vec<PathEdge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
}

/// A trigger bound to its command point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundTrigger {
    /// Unique within the instance. Equals `base_name` unless the condition
    /// bound to several candidates, in which case it is `base#p1+p2`.
    pub name: String,
    pub base_name: String,
    pub command_type: CommandType,
    /// Twin the command is written to.
    pub point_id: TwinId,
    /// Hops from the primary twin to `point_id`.
    pub path: Vec<PathEdge>,
    pub condition: Expression,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleInstance {
    /// `{twin_id}_{rule_id}`.
    pub id: String,
    pub rule_id: String,
    pub twin_id: TwinId,
    /// Version of the graph snapshot the instance was bound against.
    pub graph_version: u64,
    /// In evaluation order: every parameter follows the ones it reads.
    pub parameters: Vec<BoundParameter>,
    pub triggers: Vec<BoundTrigger>,
    pub settings: WindowSettings,
    pub command_enabled: bool,
}

impl RuleInstance {
    pub fn instance_id(twin_id: &str, rule_id: &str) -> String {
        format!("{}_{}", twin_id, rule_id)
    }

    /// Every point the instance reads or writes, sorted.
    pub fn point_ids(&self) -> BTreeSet<TwinId> {
        let mut ids = BTreeSet::new();
        for param in &self.parameters {
            ids.extend(param.points.iter().cloned());
        }
        for trigger in &self.triggers {
            ids.insert(trigger.point_id.clone());
            ids.extend(trigger.condition.points());
            ids.extend(trigger.value.points());
        }
        ids
    }

    /// Parameter that drives the insight, if the rule has one.
    pub fn result_parameter(&self) -> Option<&BoundParameter> {
        self.parameters.iter().find(|p| p.field_id == RESULT_FIELD)
    }

    pub fn trigger(&self, name: &str) -> Option<&BoundTrigger> {
        self.triggers.iter().find(|t| t.name == name)
    }
}
