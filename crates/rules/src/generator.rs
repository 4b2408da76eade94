//! Rule instance generator: one [`RuleInstance`] per twin of the rule's
//! primary model.
//!
//! Generation never fails as a whole. A rule that cannot be parsed or whose
//! parameters depend on each other in a cycle yields no instances and a
//! rule-level diagnostic; a twin that fails any binding is left out and
//! reported, and the remaining twins still get instances.

use rayon::prelude::*;
use tracing::{debug, info, warn};
use twinwatch_core::EngineConfig;
use twinwatch_expr::{Expression, ParseError};
use twinwatch_graph::TwinGraph;

use crate::binder::Binder;
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::error::BindError;
use crate::instance::{BoundParameter, BoundTrigger, RuleInstance};
use crate::schema::{MacroTable, Rule, RuleParameter, RuleTrigger};

/// Instances produced for one or more rules, plus everything left out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Generation {
    pub instances: Vec<RuleInstance>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Generation {
    fn rejected(diagnostic: Diagnostic) -> Self {
        Self {
            instances: Vec::new(),
            diagnostics: vec![diagnostic],
        }
    }

    fn extend(&mut self, other: Generation) {
        self.instances.extend(other.instances);
        self.diagnostics.extend(other.diagnostics);
    }
}

struct ParsedParameter<'r> {
    param: &'r RuleParameter,
    expr: &'r Expression,
}

struct ParsedTrigger<'r> {
    trigger: &'r RuleTrigger,
    condition: &'r Expression,
    point: &'r Expression,
    value: &'r Expression,
}

/// Generate instances of `rule` for every matching twin, sorted by twin id.
pub fn generate(rule: &Rule, graph: &dyn TwinGraph, macros: &MacroTable, config: &EngineConfig) -> Generation {
    if !rule.metadata.enabled {
        debug!(rule_id = %rule.id(), "rule disabled; no instances");
        return Generation::default();
    }

    let (parameters, triggers) = match parse_rule(rule) {
        Ok(parsed) => parsed,
        Err((subject, e)) => {
            warn!(rule_id = %rule.id(), subject = %subject, error = %e, "rule expression does not parse");
            return Generation::rejected(
                Diagnostic::new(rule.id(), DiagnosticKind::Parse, e.to_string()).about(subject),
            );
        }
    };

    let binder = Binder::new(graph, config)
        .with_macros(macros)
        .with_symbols(rule.parameters.iter().map(|p| p.name.clone()));

    let ordered = match dependency_order(&binder, parameters) {
        Ok(ordered) => ordered,
        Err(e) => {
            warn!(rule_id = %rule.id(), error = %e, "parameter dependencies are not a DAG");
            return Generation::rejected(Diagnostic::new(rule.id(), DiagnosticKind::Bind, e.to_string()));
        }
    };

    let mut generation = Generation::default();
    let twins = graph.twins_of_model(&rule.primary_model_id);
    for twin_id in &twins {
        match bind_instance(rule, twin_id, &binder, &ordered, &triggers, graph.version()) {
            Ok(instance) => generation.instances.push(instance),
            Err((subject, e)) => {
                warn!(rule_id = %rule.id(), twin_id = %twin_id, subject = %subject, error = %e, "excluding twin");
                generation.diagnostics.push(
                    Diagnostic::new(rule.id(), DiagnosticKind::Bind, e.to_string())
                        .for_twin(twin_id.clone())
                        .about(subject),
                );
            }
        }
    }

    info!(
        rule_id = %rule.id(),
        candidates = twins.len(),
        instances = generation.instances.len(),
        excluded = generation.diagnostics.len(),
        "generated rule instances"
    );
    generation
}

/// Generate every rule in parallel. Output is ordered by rule id, then twin id.
pub fn generate_all(rules: &[Rule], graph: &dyn TwinGraph, macros: &MacroTable, config: &EngineConfig) -> Generation {
    let mut ordered: Vec<&Rule> = rules.iter().collect();
    ordered.sort_by(|a, b| a.id().cmp(b.id()));

    let per_rule: Vec<Generation> = ordered
        .par_iter()
        .map(|rule| generate(rule, graph, macros, config))
        .collect();

    let mut all = Generation::default();
    for generation in per_rule {
        all.extend(generation);
    }
    all
}

// ── Steps ───────────────────────────────────────────────────────────

#[allow(clippy::type_complexity)]
fn parse_rule(rule: &Rule) -> Result<(Vec<ParsedParameter<'_>>, Vec<ParsedTrigger<'_>>), (String, ParseError)> {
    let parameters = rule
        .parameters
        .iter()
        .map(|param| {
            param
                .parsed()
                .map(|expr| ParsedParameter { param, expr })
                .map_err(|e| (param.name.clone(), e))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let triggers = rule
        .triggers
        .iter()
        .map(|trigger| {
            Ok(ParsedTrigger {
                trigger,
                condition: trigger_field(trigger, "condition", &trigger.condition)?,
                point: trigger_field(trigger, "point", &trigger.point)?,
                value: trigger_field(trigger, "value", &trigger.value)?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok((parameters, triggers))
}

fn trigger_field<'r>(trigger: &RuleTrigger, label: &str, param: &'r RuleParameter) -> Result<&'r Expression, (String, ParseError)> {
    param.parsed().map_err(|e| (format!("{}.{}", trigger.name, label), e))
}

/// Kahn's algorithm, always taking the earliest declared ready parameter so
/// the order is stable.
fn dependency_order<'r>(binder: &Binder<'_>, parameters: Vec<ParsedParameter<'r>>) -> Result<Vec<ParsedParameter<'r>>, BindError> {
    let mut pending: Vec<(ParsedParameter<'r>, Vec<String>)> = parameters
        .into_iter()
        .map(|p| binder.dependencies(p.expr).map(|deps| (p, deps)))
        .collect::<Result<_, _>>()?;

    let mut ordered: Vec<ParsedParameter<'r>> = Vec::with_capacity(pending.len());
    while !pending.is_empty() {
        let ready = pending.iter().position(|(_, deps)| {
            deps.iter().all(|d| ordered.iter().any(|done| &done.param.name == d))
        });
        match ready {
            Some(index) => ordered.push(pending.remove(index).0),
            None => {
                return Err(BindError::Circular {
                    chain: pending.iter().map(|(p, _)| p.param.name.clone()).collect(),
                })
            }
        }
    }
    Ok(ordered)
}

fn bind_instance(
    rule: &Rule,
    twin_id: &str,
    binder: &Binder<'_>,
    parameters: &[ParsedParameter<'_>],
    triggers: &[ParsedTrigger<'_>],
    graph_version: u64,
) -> Result<RuleInstance, (String, BindError)> {
    let mut bound_parameters = Vec::with_capacity(parameters.len());
    for parsed in parameters {
        let bound = binder
            .bind_single(parsed.expr, twin_id)
            .map_err(|e| (parsed.param.name.clone(), e))?;
        bound_parameters.push(BoundParameter {
            name: parsed.param.name.clone(),
            field_id: parsed.param.field_id.clone(),
            expression: bound.expr,
            points: bound.points,
            path: bound.path,
            units: parsed.param.units.clone(),
        });
    }

    let mut bound_triggers = Vec::new();
    for parsed in triggers {
        let name = &parsed.trigger.name;
        let subject = |label: &str| format!("{}.{}", name, label);

        let point = binder.bind_single(parsed.point, twin_id).map_err(|e| (subject("point"), e))?;
        let point_id = match &point.expr {
            Expression::Point(id) => id.clone(),
            other => {
                return Err((
                    subject("point"),
                    BindError::Unsupported(format!("'{}' does not resolve to a single twin", other)),
                ))
            }
        };
        let value = binder.bind_single(parsed.value, twin_id).map_err(|e| (subject("value"), e))?;
        let conditions = binder.bind(parsed.condition, twin_id).map_err(|e| (subject("condition"), e))?;

        let expanded = conditions.len() > 1;
        for condition in conditions {
            bound_triggers.push(BoundTrigger {
                name: if expanded {
                    format!("{}#{}", name, condition.points.join("+"))
                } else {
                    name.clone()
                },
                base_name: name.clone(),
                command_type: parsed.trigger.command_type,
                point_id: point_id.clone(),
                path: point.path.clone(),
                condition: condition.expr,
                value: value.expr.clone(),
            });
        }
    }

    Ok(RuleInstance {
        id: RuleInstance::instance_id(twin_id, rule.id()),
        rule_id: rule.id().to_string(),
        twin_id: twin_id.to_string(),
        graph_version,
        parameters: bound_parameters,
        triggers: bound_triggers,
        settings: rule.window_settings(),
        command_enabled: rule.command_enabled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;
    use crate::schema::{CommandType, GlobalMacro, RuleParameter, RuleTrigger, TriggerKind};

    fn rule(parameters: Vec<RuleParameter>, triggers: Vec<RuleTrigger>) -> Rule {
        let yaml = format!(
            "apiVersion: v1\nkind: Rule\nmetadata:\n  id: sat-high\n  name: SAT high\nprimaryModelId: \"{}\"\n",
            AHU
        );
        let mut rule: Rule = serde_yaml::from_str(&yaml).unwrap();
        rule.parameters = parameters;
        rule.triggers = triggers;
        rule
    }

    fn trigger(name: &str, condition: &str, point: &str) -> RuleTrigger {
        RuleTrigger {
            kind: TriggerKind::TriggerCommand,
            command_type: CommandType::AtLeast,
            name: name.to_string(),
            condition: RuleParameter::expr(condition),
            point: RuleParameter::expr(point),
            value: RuleParameter::expr("16"),
        }
    }

    fn run(rule: &Rule) -> Generation {
        generate(rule, &building_graph(), &MacroTable::new(), &EngineConfig::default())
    }

    #[test]
    fn instances_per_twin_with_exclusions() {
        let rule = rule(
            vec![RuleParameter::new("result", "result", format!("[{}] > 18", SUPPLY_TEMP))],
            vec![],
        );
        let generation = run(&rule);
        assert_eq!(generation.instances.len(), 1);
        assert_eq!(generation.instances[0].id, "AHU-1_sat-high");
        assert_eq!(generation.instances[0].graph_version, 7);

        assert_eq!(generation.diagnostics.len(), 1);
        let diag = &generation.diagnostics[0];
        assert_eq!(diag.twin_id.as_deref(), Some("AHU-2"));
        assert_eq!(diag.kind, DiagnosticKind::Bind);
        assert!(diag.message.contains("SAT-2a"), "{}", diag.message);
    }

    #[test]
    fn parameters_follow_dependency_order() {
        let rule = rule(
            vec![
                RuleParameter::new("result", "result", "delta > 2"),
                RuleParameter::new("delta", "delta", "sat - sp"),
                RuleParameter::new("sat", "sat", format!("[{}]", TEMP_SENSOR)),
                RuleParameter::new("sp", "sp", format!("[{}]", SETPOINT)),
            ],
            vec![],
        );
        let generation = run(&rule);
        let names: Vec<_> = generation.instances[0].parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["sat", "sp", "delta", "result"]);
    }

    #[test]
    fn parameter_cycle_rejects_rule() {
        let rule = rule(
            vec![
                RuleParameter::new("a", "a", "b + 1"),
                RuleParameter::new("b", "b", "a + 1"),
            ],
            vec![],
        );
        let generation = run(&rule);
        assert!(generation.instances.is_empty());
        assert!(generation.diagnostics[0].message.contains("circular"));
        assert!(generation.diagnostics[0].twin_id.is_none());
    }

    #[test]
    fn parse_error_is_a_rule_diagnostic() {
        let rule = rule(vec![RuleParameter::new("result", "result", "1 +")], vec![]);
        let generation = run(&rule);
        assert!(generation.instances.is_empty());
        assert_eq!(generation.diagnostics[0].kind, DiagnosticKind::Parse);
        assert_eq!(generation.diagnostics[0].subject.as_deref(), Some("result"));
    }

    #[test]
    fn trigger_point_and_path_are_resolved() {
        let rule = rule(
            vec![RuleParameter::new("result", "result", format!("[{}] > [{}]", SUPPLY_TEMP, SETPOINT))],
            vec![trigger("lower-setpoint", "result", &format!("[{}]", SETPOINT))],
        );
        let generation = run(&rule);
        let instance = &generation.instances[0];
        let bound = instance.trigger("lower-setpoint").unwrap();
        assert_eq!(bound.point_id, "SP-1");
        assert_eq!(bound.path.len(), 1);
        assert_eq!(bound.path[0].from, "AHU-1");
        assert_eq!(
            instance.point_ids().into_iter().collect::<Vec<_>>(),
            vec!["SAT-1", "SP-1"]
        );
    }

    #[test]
    fn multi_candidate_condition_expands_triggers() {
        let mut rule = rule(vec![], vec![trigger("cool", &format!("[{}] > 20", SUPPLY_TEMP), &format!("[{}]", SETPOINT))]);
        rule.metadata.id = "sat-any".to_string();
        let generation = run(&rule);
        let ahu2 = generation.instances.iter().find(|i| i.twin_id == "AHU-2").unwrap();
        let names: Vec<_> = ahu2.triggers.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["cool#SAT-2a", "cool#SAT-2b"]);
        assert!(ahu2.triggers.iter().all(|t| t.base_name == "cool"));
    }

    #[test]
    fn disabled_rule_generates_nothing() {
        let mut rule = rule(vec![RuleParameter::new("result", "result", "true")], vec![]);
        rule.metadata.enabled = false;
        assert_eq!(run(&rule), Generation::default());
    }

    #[test]
    fn macros_are_expanded_per_twin() {
        let global = GlobalMacro::new("sat_delta", format!("[{}] - [{}]", SUPPLY_TEMP, SETPOINT));
        let macros = crate::schema::macro_table([&global]);
        let rule = rule(vec![RuleParameter::new("result", "result", "sat_delta > 2")], vec![]);
        let generation = generate(&rule, &building_graph(), &macros, &EngineConfig::default());
        assert_eq!(generation.instances[0].parameters[0].points, vec!["SAT-1", "SP-1"]);
    }

    #[test]
    fn generation_is_deterministic() {
        let mut second = rule(vec![RuleParameter::new("result", "result", format!("[{}]", SETPOINT))], vec![]);
        second.metadata.id = "a-setpoint".to_string();
        let first = rule(vec![RuleParameter::new("result", "result", format!("[{}]", TEMP_SENSOR))], vec![]);
        let rules = vec![first, second];
        let graph = building_graph();
        let config = EngineConfig::default();

        let a = generate_all(&rules, &graph, &MacroTable::new(), &config);
        let b = generate_all(&rules, &graph, &MacroTable::new(), &config);
        assert_eq!(a, b);
        let ids: Vec<_> = a.instances.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["AHU-1_a-setpoint", "AHU-2_a-setpoint", "AHU-1_sat-high"]);
    }
}
