//! Rule definition types: parameters, triggers and UI knobs.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use twinwatch_core::ModelId;
use twinwatch_expr::{parse, EvalError, Expression, ParseError};

use super::CommonMetadata;

/// Field id of the parameter whose value drives the rule's insight.
pub const RESULT_FIELD: &str = "result";

// ── Parameters ──────────────────────────────────────────────────────

/// A named expression. The text is parsed on first use and the tree cached.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleParameter {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub field_id: String,
    pub expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    #[serde(skip)]
    parsed: OnceLock<Result<Expression, ParseError>>,
}

impl RuleParameter {
    pub fn new(name: impl Into<String>, field_id: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_id: field_id.into(),
            expression: expression.into(),
            units: None,
            parsed: OnceLock::new(),
        }
    }

    /// Anonymous expression, as used inside triggers.
    pub fn expr(expression: impl Into<String>) -> Self {
        Self::new("", "", expression)
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    /// Parsed expression; parsing happens at most once.
    pub fn parsed(&self) -> Result<&Expression, ParseError> {
        self.parsed.get_or_init(|| parse(&self.expression)).as_ref().map_err(Clone::clone)
    }
}

impl PartialEq for RuleParameter {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.field_id == other.field_id
            && self.expression == other.expression
            && self.units == other.units
    }
}

// ── Triggers ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TriggerKind {
    #[default]
    TriggerCommand,
}

/// Direction of a command trigger. For numeric conditions it also selects
/// how the `MinTrigger`/`MaxTrigger` band is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandType {
    AtLeast,
    AtMost,
}

impl CommandType {
    /// Hysteresis test for a numeric condition value.
    ///
    /// `AtLeast` enters at `x >= max` and stays while `x >= min`; `AtMost`
    /// enters at `x <= min` and stays while `x <= max`. A missing bound
    /// falls back to the other one.
    pub fn holds(self, x: f64, latched: bool, min: Option<f64>, max: Option<f64>) -> Result<bool, EvalError> {
        let (enter, stay) = match self {
            CommandType::AtLeast => (max.or(min), min.or(max)),
            CommandType::AtMost => (min.or(max), max.or(min)),
        };
        let (Some(enter), Some(stay)) = (enter, stay) else {
            return Err(EvalError::MissingBand);
        };
        let bound = if latched { stay } else { enter };
        Ok(match self {
            CommandType::AtLeast => x >= bound,
            CommandType::AtMost => x <= bound,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleTrigger {
    #[serde(default)]
    pub kind: TriggerKind,
    pub command_type: CommandType,
    /// Unique within the rule; identifies the persisted command.
    pub name: String,
    /// Boolean or numeric expression deciding when the trigger fires.
    pub condition: RuleParameter,
    /// Must resolve to exactly one point twin.
    pub point: RuleParameter,
    /// Commanded value.
    pub value: RuleParameter,
}

// ── UI elements ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UIElementKind {
    OverHowManyHours,
    PercentageOfTime,
    MinTrigger,
    MaxTrigger,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleUIElement {
    pub kind: UIElementKind,
    pub value: f64,
}

/// Windowing and band settings resolved from a rule's UI elements.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSettings {
    pub window_hours: f64,
    pub percentage: f64,
    pub min_trigger: Option<f64>,
    pub max_trigger: Option<f64>,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            window_hours: 0.0,
            percentage: 1.0,
            min_trigger: None,
            max_trigger: None,
        }
    }
}

// ── Rule ────────────────────────────────────────────────────────────

/// Top-level rule definition parsed from YAML.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Rule {
    pub api_version: String,
    pub kind: String,
    pub metadata: CommonMetadata,
    /// Instances are generated for every twin of this model (or a subtype).
    pub primary_model_id: ModelId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(default)]
    pub parameters: Vec<RuleParameter>,
    #[serde(default)]
    pub triggers: Vec<RuleTrigger>,
    #[serde(default)]
    pub elements: Vec<RuleUIElement>,
    #[serde(default)]
    pub command_enabled: bool,
}

impl Rule {
    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    /// Last element of the given kind wins.
    pub fn element(&self, kind: UIElementKind) -> Option<f64> {
        self.elements.iter().rev().find(|e| e.kind == kind).map(|e| e.value)
    }

    pub fn window_settings(&self) -> WindowSettings {
        let defaults = WindowSettings::default();
        WindowSettings {
            window_hours: self.element(UIElementKind::OverHowManyHours).unwrap_or(defaults.window_hours),
            percentage: self.element(UIElementKind::PercentageOfTime).unwrap_or(defaults.percentage),
            min_trigger: self.element(UIElementKind::MinTrigger),
            max_trigger: self.element(UIElementKind::MaxTrigger),
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&RuleParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}
