//! Diagnostics produced while generating instances and processing samples,
//! plus an in-memory per-rule log to keep the recent ones queryable.
//!
//! The log caps entries per rule (default 500) with FIFO eviction and is
//! guarded by a `std::sync::RwLock`, so rayon workers can record into it.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use twinwatch_core::TwinId;

/// Stage that produced a diagnostic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    Parse,
    Bind,
    Evaluation,
    Contract,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::Parse => write!(f, "parse"),
            DiagnosticKind::Bind => write!(f, "bind"),
            DiagnosticKind::Evaluation => write!(f, "evaluation"),
            DiagnosticKind::Contract => write!(f, "contract"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub rule_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twin_id: Option<TwinId>,
    /// Parameter or trigger name the problem is attached to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Sample timestamp, for evaluation failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(rule_id: impl Into<String>, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            twin_id: None,
            subject: None,
            timestamp: None,
            kind,
            message: message.into(),
        }
    }

    pub fn for_twin(mut self, twin_id: impl Into<TwinId>) -> Self {
        self.twin_id = Some(twin_id.into());
        self
    }

    pub fn about(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.rule_id)?;
        if let Some(twin) = &self.twin_id {
            write!(f, "/{}", twin)?;
        }
        if let Some(subject) = &self.subject {
            write!(f, " ({})", subject)?;
        }
        if let Some(ts) = &self.timestamp {
            write!(f, " @ {}", ts.to_rfc3339())?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Query parameters for filtering logged diagnostics.
#[derive(Debug, Default, Deserialize)]
pub struct DiagnosticQuery {
    pub kind: Option<DiagnosticKind>,
    /// Maximum number of entries to return (default 100).
    pub limit: Option<u32>,
    /// Only entries whose sample timestamp is at or after this instant.
    pub since: Option<DateTime<Utc>>,
}

/// In-memory per-rule diagnostic log with FIFO eviction.
pub struct DiagnosticLog {
    entries: Arc<RwLock<HashMap<String, VecDeque<Diagnostic>>>>,
    max_entries_per_rule: usize,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::with_max_entries(500)
    }

    pub fn with_max_entries(max: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            max_entries_per_rule: max,
        }
    }

    pub fn record(&self, diagnostic: Diagnostic) {
        let mut guard = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let deque = guard.entry(diagnostic.rule_id.clone()).or_default();
        deque.push_back(diagnostic);
        while deque.len() > self.max_entries_per_rule {
            deque.pop_front();
        }
    }

    pub fn record_all(&self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for d in diagnostics {
            self.record(d);
        }
    }

    /// Entries for a rule, newest first.
    pub fn query(&self, rule_id: &str, params: &DiagnosticQuery) -> Vec<Diagnostic> {
        let guard = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let Some(deque) = guard.get(rule_id) else {
            return Vec::new();
        };
        let limit = params.limit.unwrap_or(100) as usize;

        deque
            .iter()
            .rev()
            .filter(|d| params.kind.map_or(true, |k| d.kind == k))
            .filter(|d| match (params.since, d.timestamp) {
                (Some(since), Some(ts)) => ts >= since,
                (Some(_), None) => false,
                (None, _) => true,
            })
            .take(limit)
            .cloned()
            .collect()
    }

    /// Number of stored entries per rule.
    pub fn counts(&self) -> HashMap<String, usize> {
        let guard = self.entries.read().unwrap_or_else(|e| e.into_inner());
        guard.iter().map(|(k, v)| (k.clone(), v.len())).collect()
    }

    pub fn clear(&self, rule_id: &str) {
        let mut guard = self.entries.write().unwrap_or_else(|e| e.into_inner());
        guard.remove(rule_id);
    }
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn eval_diag(rule: &str, minute: u32) -> Diagnostic {
        Diagnostic::new(rule, DiagnosticKind::Evaluation, format!("failed at {}", minute))
            .at(Utc.with_ymd_and_hms(2022, 8, 25, 0, minute, 0).unwrap())
    }

    #[test]
    fn newest_first_with_limit() {
        let log = DiagnosticLog::new();
        for m in 0..10 {
            log.record(eval_diag("r1", m));
        }
        let entries = log.query("r1", &DiagnosticQuery { limit: Some(3), ..Default::default() });
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].message, "failed at 9");
    }

    #[test]
    fn kind_and_since_filters() {
        let log = DiagnosticLog::new();
        log.record(Diagnostic::new("r1", DiagnosticKind::Bind, "ambiguous").for_twin("AHU-1"));
        log.record(eval_diag("r1", 5));
        log.record(eval_diag("r1", 30));

        let binds = log.query("r1", &DiagnosticQuery { kind: Some(DiagnosticKind::Bind), ..Default::default() });
        assert_eq!(binds.len(), 1);
        assert_eq!(binds[0].twin_id.as_deref(), Some("AHU-1"));

        let since = Utc.with_ymd_and_hms(2022, 8, 25, 0, 10, 0).unwrap();
        let recent = log.query("r1", &DiagnosticQuery { since: Some(since), ..Default::default() });
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].message, "failed at 30");
    }

    #[test]
    fn fifo_eviction_per_rule() {
        let log = DiagnosticLog::with_max_entries(3);
        for m in 0..4 {
            log.record(eval_diag("r1", m));
        }
        log.record(eval_diag("r2", 0));
        let entries = log.query("r1", &DiagnosticQuery::default());
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].message, "failed at 1");
        assert_eq!(log.counts().get("r2"), Some(&1));
        log.clear("r1");
        assert!(log.query("r1", &DiagnosticQuery::default()).is_empty());
    }

    #[test]
    fn display_includes_context() {
        let d = Diagnostic::new("rule-a", DiagnosticKind::Bind, "no point").for_twin("AHU-1").about("fan");
        assert_eq!(d.to_string(), "[bind] rule-a/AHU-1 (fan): no point");
    }
}
