//! The `kind:` discriminator of a rule document.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleKind {
    Rule,
    GlobalMacro,
}

impl RuleKind {
    pub const ALL: [RuleKind; 2] = [RuleKind::Rule, RuleKind::GlobalMacro];

    pub fn as_str(self) -> &'static str {
        match self {
            RuleKind::Rule => "Rule",
            RuleKind::GlobalMacro => "GlobalMacro",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|k| k.as_str() == s).ok_or_else(|| {
            let known: Vec<&str> = Self::ALL.iter().map(|k| k.as_str()).collect();
            format!("unknown rule kind: '{}' (expected one of {})", s, known.join(", "))
        })
    }
}
