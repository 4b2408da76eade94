//! Parameter, trigger and macro expression checks.

use std::collections::HashSet;

use twinwatch_expr::{Expression, Reference, TemporalCall};

use crate::schema::*;
use super::ValidationResult;
use super::fuzzy::fuzzy_match;

pub(super) fn validate_parameters(rule: &Rule, macro_names: &[&str], result: &mut ValidationResult) {
    let mut seen = HashSet::new();
    let known = known_names(rule, macro_names);

    for (i, param) in rule.parameters.iter().enumerate() {
        let path = format!("parameters[{}]", i);
        if param.name.trim().is_empty() {
            result.error(format!("{}.name", path), "parameter name must not be empty");
        } else if !seen.insert(param.name.as_str()) {
            result.error(format!("{}.name", path), format!("duplicate parameter name '{}'", param.name));
        }

        if let Some(expr) = parsed_or_report(param, &format!("{}.expression", path), result) {
            if expr.variables().iter().any(|v| v == &param.name) {
                result.error(
                    format!("{}.expression", path),
                    format!("parameter '{}' references itself", param.name),
                );
            }
            check_variables(expr, &known, &format!("{}.expression", path), result);
            check_windows(expr, &format!("{}.expression", path), result);
        }
    }

    if !rule.parameters.is_empty() && !rule.parameters.iter().any(|p| p.field_id == RESULT_FIELD) {
        result.warn(
            "parameters",
            format!("no parameter with fieldId '{}'; the rule will not produce insights", RESULT_FIELD),
        );
    }
}

pub(super) fn validate_triggers(rule: &Rule, macro_names: &[&str], result: &mut ValidationResult) {
    let mut seen = HashSet::new();
    let known = known_names(rule, macro_names);

    for (i, trigger) in rule.triggers.iter().enumerate() {
        let path = format!("triggers[{}]", i);
        if trigger.name.trim().is_empty() {
            result.error(format!("{}.name", path), "trigger name must not be empty");
        } else if trigger.name.contains('#') {
            result.error(format!("{}.name", path), "trigger name must not contain '#'");
        } else if !seen.insert(trigger.name.as_str()) {
            result.error(format!("{}.name", path), format!("duplicate trigger name '{}'", trigger.name));
        }

        for (field, param) in [("condition", &trigger.condition), ("value", &trigger.value)] {
            let field_path = format!("{}.{}.expression", path, field);
            if let Some(expr) = parsed_or_report(param, &field_path, result) {
                check_variables(expr, &known, &field_path, result);
                check_windows(expr, &field_path, result);
            }
        }

        let point_path = format!("{}.point.expression", path);
        if let Some(expr) = parsed_or_report(&trigger.point, &point_path, result) {
            if !is_point_reference(expr) {
                result.error(
                    point_path,
                    "point must be a twin reference, UNDER(...) or OPTION of twin references",
                );
            }
        }
    }

    if rule.command_enabled && rule.triggers.is_empty() {
        result.warn("commandEnabled", "commandEnabled is set but the rule has no triggers");
    }
}

pub(super) fn validate_macro(global: &GlobalMacro, result: &mut ValidationResult) {
    if global.name.trim().is_empty() {
        result.error("name", "macro name must not be empty");
    }
    let param = RuleParameter::new(global.name.clone(), global.name.clone(), global.expression.clone());
    if let Some(expr) = parsed_or_report(&param, "expression", result) {
        if expr.variables().iter().any(|v| v == &global.name) {
            result.error("expression", format!("macro '{}' references itself", global.name));
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn known_names<'a>(rule: &'a Rule, macro_names: &[&'a str]) -> Vec<&'a str> {
    rule.parameters
        .iter()
        .map(|p| p.name.as_str())
        .chain(macro_names.iter().copied())
        .collect()
}

fn parsed_or_report<'p>(param: &'p RuleParameter, path: &str, result: &mut ValidationResult) -> Option<&'p Expression> {
    match param.parsed() {
        Ok(expr) => Some(expr),
        Err(e) => {
            result.error(path, format!("'{}': {}", param.expression, e));
            None
        }
    }
}

fn check_variables(expr: &Expression, known: &[&str], path: &str, result: &mut ValidationResult) {
    for reference in expr.references() {
        let Reference::Variable(name) = reference else {
            continue;
        };
        if known.contains(&name.as_str()) {
            continue;
        }
        let message = format!("unknown variable '{}'", name);
        match fuzzy_match(&name, known) {
            Some(suggestion) => result.error_with_suggestion(path, message, suggestion),
            None => result.error(path, message),
        }
    }
}

/// Time-window calls such as `AVERAGE(x, 5d)` need a usable duration.
fn check_windows(expr: &Expression, path: &str, result: &mut ValidationResult) {
    expr.walk(&mut |node| {
        if let Expression::Call(name, args) = node {
            if let Some(Err(e)) = TemporalCall::recognize(name, args) {
                result.error(path, format!("'{}': {}", node, e));
            }
        }
    });
}

fn is_point_reference(expr: &Expression) -> bool {
    match expr {
        Expression::Twin(_) => true,
        Expression::Call(name, args) if name == "OPTION" => {
            !args.is_empty() && args.iter().all(is_point_reference)
        }
        _ => false,
    }
}
