//! UI element checks: window length, percentage and trigger band.

use std::collections::HashSet;

use crate::schema::*;
use super::ValidationResult;

/// Longest accepted `OverHowManyHours`: one leap year.
pub(crate) const MAX_WINDOW_HOURS: f64 = 366.0 * 24.0;

pub(super) fn validate_elements(rule: &Rule, result: &mut ValidationResult) {
    let mut seen = HashSet::new();

    for (i, element) in rule.elements.iter().enumerate() {
        let path = format!("elements[{}].value", i);
        if !element.value.is_finite() {
            result.error(&path, format!("{:?} must be a finite number", element.kind));
            continue;
        }
        match element.kind {
            UIElementKind::OverHowManyHours if element.value < 0.0 => {
                result.error(&path, format!("OverHowManyHours must be >= 0, got {}", element.value));
            }
            UIElementKind::OverHowManyHours if element.value > MAX_WINDOW_HOURS => {
                result.error(
                    &path,
                    format!("OverHowManyHours must be at most {}, got {}", MAX_WINDOW_HOURS, element.value),
                );
            }
            UIElementKind::PercentageOfTime if !(0.0..=1.0).contains(&element.value) => {
                result.error(&path, format!("PercentageOfTime must be within 0..=1, got {}", element.value));
            }
            UIElementKind::PercentageOfTime if element.value == 0.0 => {
                result.warn(&path, "PercentageOfTime of 0 fires on any single true observation");
            }
            _ => {}
        }
        if !seen.insert(element.kind) {
            result.warn(format!("elements[{}]", i), format!("duplicate {:?} element; the last one wins", element.kind));
        }
    }

    let settings = rule.window_settings();
    if let (Some(min), Some(max)) = (settings.min_trigger, settings.max_trigger) {
        if min > max {
            result.error("elements", format!("MinTrigger ({}) must not exceed MaxTrigger ({})", min, max));
        }
    }
}
