//! Global macros: named expressions shared by every rule.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;
use twinwatch_expr::Expression;

use super::{CommonMetadata, RuleParameter};

/// Macro name to parsed body, as consumed by the binder.
pub type MacroTable = BTreeMap<String, Expression>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GlobalMacro {
    pub api_version: String,
    pub kind: String,
    pub metadata: CommonMetadata,
    /// Name rule expressions use to reference this macro.
    pub name: String,
    pub expression: String,
}

impl GlobalMacro {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            api_version: "v1".to_string(),
            kind: "GlobalMacro".to_string(),
            metadata: CommonMetadata::named(name.replace('_', "-").to_lowercase(), name.clone()),
            name,
            expression: expression.into(),
        }
    }
}

/// Parse enabled macros into a table. Unparseable macros are logged and left out.
pub fn macro_table<'a>(macros: impl IntoIterator<Item = &'a GlobalMacro>) -> MacroTable {
    let mut table = MacroTable::new();
    for global in macros {
        if !global.metadata.enabled {
            continue;
        }
        let param = RuleParameter::new(global.name.clone(), global.name.clone(), global.expression.clone());
        match param.parsed() {
            Ok(expr) => {
                table.insert(global.name.clone(), expr.clone());
            }
            Err(e) => warn!(macro_name = %global.name, error = %e, "skipping unparseable macro"),
        }
    }
    table
}
