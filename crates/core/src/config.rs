use std::env;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_parse<T: FromStr>(profile: &str, key: &str, default: T) -> T {
    match profiled_env_opt(profile, key) {
        Some(raw) => match raw.parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(key = %key, value = %raw, "unparseable config value, using default");
                default
            }
        },
        None => default,
    }
}

// ── Percentage policy ─────────────────────────────────────────

/// How `PercentageOfTime` measures the share of a window during which a
/// condition held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PercentagePolicy {
    /// Fraction of observations in the window that were true.
    #[default]
    SampleCount,
    /// Fraction of wall-clock window time spent true, each observation
    /// holding until the next one.
    Duration,
}

impl fmt::Display for PercentagePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PercentagePolicy::SampleCount => write!(f, "samples"),
            PercentagePolicy::Duration => write!(f, "duration"),
        }
    }
}

impl FromStr for PercentagePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "samples" | "sample_count" | "count" => Ok(PercentagePolicy::SampleCount),
            "duration" | "time" => Ok(PercentagePolicy::Duration),
            other => Err(format!("unknown percentage policy: '{}'", other)),
        }
    }
}

// ── Engine config ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Active profile name (empty = default).
    pub profile: String,
    /// Cap on occurrences/points retained per command and insight (oldest dropped).
    pub max_occurrences: usize,
    /// Relationship hops searched when resolving `[model]` references.
    pub max_search_depth: usize,
    /// Maximum number of alternatives a single expression may bind to.
    pub max_expansions: usize,
    pub percentage_policy: PercentagePolicy,
    /// Worker threads for batch evaluation (0 = rayon default).
    pub worker_threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            profile: String::new(),
            max_occurrences: 1000,
            max_search_depth: 2,
            max_expansions: 16,
            percentage_policy: PercentagePolicy::SampleCount,
            worker_threads: 0,
        }
    }
}

impl EngineConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `TWINWATCH_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("TWINWATCH_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        let defaults = Self::default();
        Self {
            profile: p.to_string(),
            max_occurrences: profiled_env_parse(p, "TWINWATCH_MAX_OCCURRENCES", defaults.max_occurrences),
            max_search_depth: profiled_env_parse(p, "TWINWATCH_MAX_SEARCH_DEPTH", defaults.max_search_depth),
            max_expansions: profiled_env_parse(p, "TWINWATCH_MAX_EXPANSIONS", defaults.max_expansions),
            percentage_policy: profiled_env_parse(p, "TWINWATCH_PERCENTAGE_POLICY", defaults.percentage_policy),
            worker_threads: profiled_env_parse(p, "TWINWATCH_WORKER_THREADS", defaults.worker_threads),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Engine config loaded (profile: {}):", self.profile_label());
        tracing::info!("  occurrences: max={}", self.max_occurrences);
        tracing::info!("  binding:     depth={}, expansions={}", self.max_search_depth, self.max_expansions);
        tracing::info!("  windowing:   percentage_policy={}", self.percentage_policy);
        tracing::info!("  workers:     threads={}", self.worker_threads);
    }
}
