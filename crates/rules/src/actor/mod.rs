//! Rule actor: the streaming evaluator of one rule instance.
//!
//! [`process`] consumes an ordered batch of samples for a time range and
//! returns the next [`ActorState`] together with the instance's insight and
//! commands. Calling it on consecutive ranges, each time passing the state
//! returned by the previous call, gives the same result as one call over the
//! combined range.
//!
//! Per timestamp the actor applies every sample sharing it, evaluates the
//! parameters in dependency order, then each trigger:
//!
//! - raw truth: a boolean condition is used as is; a numeric one goes
//!   through the `MinTrigger`/`MaxTrigger` hysteresis band of its
//!   [`CommandType`](crate::schema::CommandType)
//! - windowed truth: [`TruthWindow`] applies `OverHowManyHours` and
//!   `PercentageOfTime`
//! - the command state machine advances on the windowed truth
//!
//! Parameters and points that a time-window function such as
//! `AVERAGE(x, 5d)` aggregates over are recorded in the state's [`History`].
//!
//! Evaluation failures never abort a run. A failed parameter keeps its
//! previous value; a failed trigger sits out that timestamp. Both are
//! returned as diagnostics. A non-finite reading counts as a failure.

mod cancel;
mod command;
mod history;
mod insight;
mod state;
mod window;


pub use cancel::CancelToken;
pub use command::{Command, CommandPoint};
pub use history::History;
pub use insight::{Insight, InsightOccurrence, InsightState};
pub use state::{ActorState, TriggerState};
pub use window::{Observation, TruthWindow};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};
use twinwatch_core::{EngineConfig, SampleValue, TimeRange, TimedSample};
use twinwatch_expr::{evaluate, EvalError, Value};

use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::error::ContractViolation;
use crate::instance::{BoundTrigger, RuleInstance};
use crate::schema::WindowSettings;
use history::Horizons;
use state::Frame;

/// Result of one [`process`] call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessOutput {
    /// Checkpoint to pass to the next call.
    pub state: ActorState,
    pub insights: Vec<Insight>,
    pub commands: Vec<Command>,
    pub diagnostics: Vec<Diagnostic>,
    /// The run stopped early; `state` covers everything up to its watermark.
    pub cancelled: bool,
}

/// Process `samples` within `range`, continuing from `prior`.
///
/// `samples` must be ordered by timestamp. Samples outside the range, at or
/// before the prior watermark, or for points the instance does not read are
/// skipped.
pub fn process(
    instance: &RuleInstance,
    prior: Option<&ActorState>,
    samples: &[TimedSample],
    range: &TimeRange,
    config: &EngineConfig,
    cancel: &CancelToken,
) -> Result<ProcessOutput, ContractViolation> {
    check_contract(instance, prior, samples, range).inspect_err(|e| {
        warn!(instance_id = %instance.id, error = %e, "rejected process call");
    })?;

    let mut state = match prior {
        Some(prior) => ActorState::resume(instance, prior),
        None => ActorState::new(instance),
    };

    let horizons = Horizons::of(instance);
    let relevant = instance.point_ids();
    let watermark = state.watermark;
    let pending: Vec<&TimedSample> = samples
        .iter()
        .filter(|s| range.contains(s.timestamp))
        .filter(|s| watermark.map_or(true, |w| s.timestamp > w))
        .filter(|s| relevant.contains(&s.point_id))
        .collect();

    let mut diagnostics = Vec::new();
    let mut cancelled = false;
    let mut evaluated = 0usize;
    for group in pending.chunk_by(|a, b| a.timestamp == b.timestamp) {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }
        let t = group[0].timestamp;
        for sample in group {
            let value = sample_value(sample.value);
            state.history.record_point(&horizons, &sample.point_id, t, &value);
            state.points.insert(sample.point_id.clone(), value);
        }
        evaluate_at(instance, &mut state, &horizons, t, config, &mut diagnostics);
        state.history.prune(&horizons, t);
        state.watermark = Some(t);
        evaluated += 1;
    }

    debug!(
        instance_id = %instance.id,
        samples = pending.len(),
        timestamps = evaluated,
        diagnostics = diagnostics.len(),
        cancelled,
        "processed range"
    );

    Ok(ProcessOutput {
        insights: state.insight.iter().map(|i| i.insight.clone()).collect(),
        commands: state.commands().cloned().collect(),
        state,
        diagnostics,
        cancelled,
    })
}

fn check_contract(
    instance: &RuleInstance,
    prior: Option<&ActorState>,
    samples: &[TimedSample],
    range: &TimeRange,
) -> Result<(), ContractViolation> {
    if let Some(prior) = prior {
        if prior.instance_id != instance.id {
            return Err(ContractViolation::StateMismatch {
                expected: instance.id.clone(),
                found: prior.instance_id.clone(),
            });
        }
        if let Some(watermark) = prior.watermark {
            if watermark > range.start {
                return Err(ContractViolation::StaleState {
                    watermark,
                    range_start: range.start,
                });
            }
        }
    }

    for (index, pair) in samples.windows(2).enumerate() {
        if pair[1].timestamp < pair[0].timestamp {
            return Err(ContractViolation::OutOfOrder {
                index: index + 1,
                previous: pair[0].timestamp,
                current: pair[1].timestamp,
            });
        }
    }
    Ok(())
}

fn sample_value(value: SampleValue) -> Value {
    match value {
        SampleValue::Bool(b) => Value::Bool(b),
        SampleValue::Number(n) => Value::Number(n),
    }
}

// ── Per-timestamp evaluation ────────────────────────────────────────

fn evaluate_at(
    instance: &RuleInstance,
    state: &mut ActorState,
    horizons: &Horizons,
    t: DateTime<Utc>,
    config: &EngineConfig,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let result_name = instance.result_parameter().map(|p| p.name.as_str());
    // None when the result parameter failed at this timestamp.
    let mut result_truth: Option<bool> = None;

    for param in &instance.parameters {
        let is_result = Some(param.name.as_str()) == result_name;
        let outcome = evaluate(&param.expression, &state.at(t));
        match outcome {
            Ok(value) => {
                if is_result {
                    result_truth = value.as_bool();
                    if result_truth.is_none() {
                        let e = EvalError::TypeMismatch {
                            op: "result".to_string(),
                            found: value.type_name().to_string(),
                        };
                        diagnostics.push(evaluation_failure(instance, &param.name, t, &e));
                    }
                }
                state.history.record_variable(horizons, &param.name, t, &value);
                state.parameters.insert(param.name.clone(), value);
            }
            Err(e) => diagnostics.push(evaluation_failure(instance, &param.name, t, &e)),
        }
    }

    if let Some(insight) = state.insight.as_mut() {
        match result_truth {
            Some(raw) => {
                let faulted = insight.window.observe(t, raw, &instance.settings, config.percentage_policy);
                insight.observe(t, faulted, config.max_occurrences);
            }
            None => insight.invalidate(),
        }
    }

    for trigger in &instance.triggers {
        let latched = state.triggers.get(&trigger.name).is_some_and(|s| s.latched);
        let (raw, value) = match evaluate_trigger(trigger, &state.at(t), latched, &instance.settings) {
            Ok(outcome) => outcome,
            Err(e) => {
                diagnostics.push(evaluation_failure(instance, &trigger.name, t, &e));
                continue;
            }
        };

        let point = CommandPoint {
            timestamp: t,
            point_id: trigger.point_id.clone(),
            reading: state.points.get(&trigger.point_id).and_then(Value::as_number),
            value,
        };
        let trigger_state = state.triggers.entry(trigger.name.clone()).or_default();
        trigger_state.latched = raw;
        let windowed = trigger_state
            .window
            .observe(t, raw, &instance.settings, config.percentage_policy);
        command::step(
            &mut trigger_state.command,
            windowed,
            point,
            instance,
            trigger,
            config.max_occurrences,
        );
    }
}

/// Raw truth and commanded value of a trigger at the current timestamp.
fn evaluate_trigger(
    trigger: &BoundTrigger,
    scope: &Frame<'_>,
    latched: bool,
    settings: &WindowSettings,
) -> Result<(bool, f64), EvalError> {
    let raw = match evaluate(&trigger.condition, scope)? {
        Value::Bool(b) => b,
        Value::Number(x) => trigger
            .command_type
            .holds(x, latched, settings.min_trigger, settings.max_trigger)?,
        other => {
            return Err(EvalError::TypeMismatch {
                op: "condition".to_string(),
                found: other.type_name().to_string(),
            })
        }
    };
    let value = evaluate(&trigger.value, scope)?;
    let value = value.as_number().ok_or_else(|| EvalError::TypeMismatch {
        op: "value".to_string(),
        found: value.type_name().to_string(),
    })?;
    Ok((raw, value))
}

fn evaluation_failure(instance: &RuleInstance, subject: &str, t: DateTime<Utc>, e: &EvalError) -> Diagnostic {
    debug!(instance_id = %instance.id, subject = %subject, at = %t, error = %e, "evaluation failed");
    Diagnostic::new(instance.rule_id.clone(), DiagnosticKind::Evaluation, e.to_string())
        .for_twin(instance.twin_id.clone())
        .about(subject)
        .at(t)
}
