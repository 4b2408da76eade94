//! Command trigger state machine.
//!
//! `Untriggered --true--> Triggered --false--> Untriggered`. A command is
//! created the first time its trigger's windowed condition holds and is
//! never dropped by the machine itself; only regeneration removes it when
//! the trigger disappears from the rule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use twinwatch_core::TwinId;

use crate::instance::{BoundTrigger, RuleInstance};
use crate::schema::CommandType;

/// One observation at which the windowed condition held.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandPoint {
    pub timestamp: DateTime<Utc>,
    pub point_id: TwinId,
    /// Latest reading of the command point, if it has reported.
    pub reading: Option<f64>,
    /// Commanded value at this timestamp.
    pub value: f64,
}

/// Persisted output of one trigger of one rule instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub rule_instance_id: String,
    pub rule_id: String,
    pub twin_id: TwinId,
    pub trigger_name: String,
    pub point_id: TwinId,
    pub command_type: CommandType,
    pub is_triggered: bool,
    /// Start of the current or most recent triggered interval.
    pub start_time: DateTime<Utc>,
    /// Last true observation of the most recent interval, set once it closes.
    pub end_time: Option<DateTime<Utc>>,
    pub last_true: DateTime<Utc>,
    /// Latest commanded value.
    pub value: f64,
    pub occurrences: Vec<DateTime<Utc>>,
    pub points: Vec<CommandPoint>,
}

impl Command {
    /// Storage key: `(rule instance, trigger)`.
    pub fn key(&self) -> (&str, &str) {
        (&self.rule_instance_id, &self.trigger_name)
    }

    fn open(instance: &RuleInstance, trigger: &BoundTrigger, point: CommandPoint) -> Self {
        Self {
            rule_instance_id: instance.id.clone(),
            rule_id: instance.rule_id.clone(),
            twin_id: instance.twin_id.clone(),
            trigger_name: trigger.name.clone(),
            point_id: trigger.point_id.clone(),
            command_type: trigger.command_type,
            is_triggered: true,
            start_time: point.timestamp,
            end_time: None,
            last_true: point.timestamp,
            value: point.value,
            occurrences: vec![point.timestamp],
            points: vec![point],
        }
    }

    fn record(&mut self, point: CommandPoint, max_occurrences: usize) {
        self.last_true = point.timestamp;
        self.value = point.value;
        self.occurrences.push(point.timestamp);
        self.points.push(point);
        cap(&mut self.occurrences, max_occurrences);
        cap(&mut self.points, max_occurrences);
    }
}

fn cap<T>(items: &mut Vec<T>, max: usize) {
    if items.len() > max {
        let excess = items.len() - max;
        items.drain(..excess);
    }
}

/// Advance the machine for one windowed truth value.
pub(crate) fn step(
    command: &mut Option<Command>,
    windowed: bool,
    point: CommandPoint,
    instance: &RuleInstance,
    trigger: &BoundTrigger,
    max_occurrences: usize,
) {
    if command.is_none() {
        if windowed {
            debug!(instance_id = %instance.id, trigger = %trigger.name, at = %point.timestamp, "command triggered");
            *command = Some(Command::open(instance, trigger, point));
        }
        return;
    }
    let Some(cmd) = command.as_mut() else {
        return;
    };

    if windowed {
        if !cmd.is_triggered {
            debug!(instance_id = %instance.id, trigger = %trigger.name, at = %point.timestamp, "command re-triggered");
            cmd.is_triggered = true;
            cmd.start_time = point.timestamp;
            cmd.end_time = None;
        }
        cmd.record(point, max_occurrences);
    } else if cmd.is_triggered {
        debug!(instance_id = %instance.id, trigger = %trigger.name, end = %cmd.last_true, "command cleared");
        cmd.is_triggered = false;
        cmd.end_time = Some(cmd.last_true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::WindowSettings;
    use chrono::{Duration, TimeZone};

    fn at(hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 8, 25, 0, 0, 0).unwrap() + Duration::hours(hour)
    }

    fn fixture() -> (RuleInstance, BoundTrigger) {
        let trigger = BoundTrigger {
            name: "reset".into(),
            base_name: "reset".into(),
            command_type: CommandType::AtLeast,
            point_id: "SP-1".into(),
            path: vec![],
            condition: twinwatch_expr::Expression::variable("result"),
            value: twinwatch_expr::Expression::number(16.0),
        };
        let instance = RuleInstance {
            id: "AHU-1_sat-high".into(),
            rule_id: "sat-high".into(),
            twin_id: "AHU-1".into(),
            graph_version: 1,
            parameters: vec![],
            triggers: vec![trigger.clone()],
            settings: WindowSettings::default(),
            command_enabled: true,
        };
        (instance, trigger)
    }

    fn drive(command: &mut Option<Command>, hour: i64, windowed: bool, max: usize) {
        let (instance, trigger) = fixture();
        let point = CommandPoint {
            timestamp: at(hour),
            point_id: "SP-1".into(),
            reading: Some(18.0),
            value: 16.0,
        };
        step(command, windowed, point, &instance, &trigger, max);
    }

    #[test]
    fn untriggered_stays_empty_until_true() {
        let mut cmd = None;
        drive(&mut cmd, 0, false, 10);
        assert!(cmd.is_none());
        drive(&mut cmd, 1, true, 10);
        let c = cmd.unwrap();
        assert!(c.is_triggered);
        assert_eq!(c.start_time, at(1));
        assert_eq!(c.end_time, None);
        assert_eq!(c.key(), ("AHU-1_sat-high", "reset"));
    }

    #[test]
    fn end_is_last_true_and_frozen() {
        let mut cmd = None;
        drive(&mut cmd, 1, true, 10);
        drive(&mut cmd, 2, true, 10);
        drive(&mut cmd, 5, false, 10);
        drive(&mut cmd, 6, false, 10);
        let c = cmd.unwrap();
        assert!(!c.is_triggered);
        assert_eq!(c.start_time, at(1));
        assert_eq!(c.end_time, Some(at(2)));
        assert_eq!(c.occurrences, vec![at(1), at(2)]);
    }

    #[test]
    fn retrigger_moves_start_forward_and_reopens() {
        let mut cmd = None;
        drive(&mut cmd, 1, true, 10);
        drive(&mut cmd, 2, false, 10);
        drive(&mut cmd, 4, true, 10);
        let c = cmd.unwrap();
        assert!(c.is_triggered);
        assert_eq!(c.start_time, at(4));
        assert_eq!(c.end_time, None);
        assert_eq!(c.occurrences.len(), 2);
    }

    #[test]
    fn occurrences_are_capped_oldest_first() {
        let mut cmd = None;
        for hour in 0..5 {
            drive(&mut cmd, hour, true, 3);
        }
        let c = cmd.unwrap();
        assert_eq!(c.occurrences, vec![at(2), at(3), at(4)]);
        assert_eq!(c.points.len(), 3);
        assert_eq!(c.start_time, at(0));
    }
}
