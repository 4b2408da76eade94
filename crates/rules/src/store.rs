//! Persistence and telemetry seams.
//!
//! [`StateStore`] keeps actor state, commands and insights between runs;
//! [`SampleSource`] supplies ordered telemetry. Both have in-memory
//! implementations. [`JsonFileStateStore`] snapshots the in-memory store to
//! a single JSON file so a host can resume across process restarts.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use twinwatch_core::{TimeRange, TimedSample, TwinId};

use crate::actor::{ActorState, Command, Insight};
use crate::error::StoreError;

pub type Result<T> = std::result::Result<T, StoreError>;

pub trait StateStore: Send + Sync {
    fn load_state(&self, instance_id: &str) -> Result<Option<ActorState>>;
    fn save_state(&self, state: &ActorState) -> Result<()>;
    fn delete_state(&self, instance_id: &str) -> Result<()>;
    /// Instance ids with persisted state, sorted.
    fn state_ids(&self) -> Result<Vec<String>>;

    fn load_command(&self, instance_id: &str, trigger_name: &str) -> Result<Option<Command>>;
    fn save_command(&self, command: &Command) -> Result<()>;
    /// Returns whether a command was removed.
    fn delete_command(&self, instance_id: &str, trigger_name: &str) -> Result<bool>;
    /// All commands ordered by `(instance id, trigger name)`.
    fn list_commands(&self) -> Result<Vec<Command>>;

    fn save_insight(&self, insight: &Insight) -> Result<()>;
    fn delete_insight(&self, instance_id: &str) -> Result<()>;
    /// All insights ordered by id.
    fn list_insights(&self) -> Result<Vec<Insight>>;
}

// ── In-memory store ─────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StoreSnapshot {
    states: BTreeMap<String, ActorState>,
    /// Keyed by instance id, then trigger name.
    commands: BTreeMap<String, BTreeMap<String, Command>>,
    insights: BTreeMap<String, Insight>,
}

/// `RwLock`-guarded maps; the default store.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    inner: RwLock<StoreSnapshot>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            inner: RwLock::new(snapshot),
        }
    }

    fn snapshot(&self) -> StoreSnapshot {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl StateStore for InMemoryStateStore {
    fn load_state(&self, instance_id: &str) -> Result<Option<ActorState>> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Ok(guard.states.get(instance_id).cloned())
    }

    fn save_state(&self, state: &ActorState) -> Result<()> {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard.states.insert(state.instance_id.clone(), state.clone());
        Ok(())
    }

    fn delete_state(&self, instance_id: &str) -> Result<()> {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard.states.remove(instance_id);
        Ok(())
    }

    fn state_ids(&self) -> Result<Vec<String>> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Ok(guard.states.keys().cloned().collect())
    }

    fn load_command(&self, instance_id: &str, trigger_name: &str) -> Result<Option<Command>> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Ok(guard.commands.get(instance_id).and_then(|m| m.get(trigger_name)).cloned())
    }

    fn save_command(&self, command: &Command) -> Result<()> {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard
            .commands
            .entry(command.rule_instance_id.clone())
            .or_default()
            .insert(command.trigger_name.clone(), command.clone());
        Ok(())
    }

    fn delete_command(&self, instance_id: &str, trigger_name: &str) -> Result<bool> {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let Some(per_instance) = guard.commands.get_mut(instance_id) else {
            return Ok(false);
        };
        let removed = per_instance.remove(trigger_name).is_some();
        if per_instance.is_empty() {
            guard.commands.remove(instance_id);
        }
        Ok(removed)
    }

    fn list_commands(&self) -> Result<Vec<Command>> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Ok(guard.commands.values().flat_map(|m| m.values().cloned()).collect())
    }

    fn save_insight(&self, insight: &Insight) -> Result<()> {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard.insights.insert(insight.id.clone(), insight.clone());
        Ok(())
    }

    fn delete_insight(&self, instance_id: &str) -> Result<()> {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard.insights.remove(instance_id);
        Ok(())
    }

    fn list_insights(&self) -> Result<Vec<Insight>> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Ok(guard.insights.values().cloned().collect())
    }
}

// ── JSON file store ─────────────────────────────────────────────────

/// In-memory store written through to one JSON file after every change.
pub struct JsonFileStateStore {
    path: PathBuf,
    memory: InMemoryStateStore,
}

impl JsonFileStateStore {
    /// Open `path`, loading its contents when the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let snapshot = if path.exists() {
            let json = fs::read_to_string(&path)?;
            serde_json::from_str(&json)?
        } else {
            StoreSnapshot::default()
        };
        info!(
            path = %path.display(),
            states = snapshot.states.len(),
            commands = snapshot.commands.values().map(BTreeMap::len).sum::<usize>(),
            "opened state file"
        );
        Ok(Self {
            path,
            memory: InMemoryStateStore::from_snapshot(snapshot),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write to a temp file, then rename over the target.
    fn flush(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.memory.snapshot())?;
        let tmp = self.path.with_extension("json.tmp");
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "flushed state file");
        Ok(())
    }
}

impl StateStore for JsonFileStateStore {
    fn load_state(&self, instance_id: &str) -> Result<Option<ActorState>> {
        self.memory.load_state(instance_id)
    }

    fn save_state(&self, state: &ActorState) -> Result<()> {
        self.memory.save_state(state)?;
        self.flush()
    }

    fn delete_state(&self, instance_id: &str) -> Result<()> {
        self.memory.delete_state(instance_id)?;
        self.flush()
    }

    fn state_ids(&self) -> Result<Vec<String>> {
        self.memory.state_ids()
    }

    fn load_command(&self, instance_id: &str, trigger_name: &str) -> Result<Option<Command>> {
        self.memory.load_command(instance_id, trigger_name)
    }

    fn save_command(&self, command: &Command) -> Result<()> {
        self.memory.save_command(command)?;
        self.flush()
    }

    fn delete_command(&self, instance_id: &str, trigger_name: &str) -> Result<bool> {
        let removed = self.memory.delete_command(instance_id, trigger_name)?;
        if removed {
            self.flush()?;
        }
        Ok(removed)
    }

    fn list_commands(&self) -> Result<Vec<Command>> {
        self.memory.list_commands()
    }

    fn save_insight(&self, insight: &Insight) -> Result<()> {
        self.memory.save_insight(insight)?;
        self.flush()
    }

    fn delete_insight(&self, instance_id: &str) -> Result<()> {
        self.memory.delete_insight(instance_id)?;
        self.flush()
    }

    fn list_insights(&self) -> Result<Vec<Insight>> {
        self.memory.list_insights()
    }
}

// ── Samples ─────────────────────────────────────────────────────────

pub trait SampleSource: Send + Sync {
    /// Samples for `points` within `range`, ordered by timestamp.
    fn samples(&self, points: &BTreeSet<TwinId>, range: &TimeRange) -> Result<Vec<TimedSample>>;
}

/// Sorted in-memory sample list.
#[derive(Debug, Default, Clone)]
pub struct InMemorySampleSource {
    samples: Vec<TimedSample>,
}

impl InMemorySampleSource {
    /// Samples are stably sorted by timestamp, so equal timestamps keep
    /// their input order.
    pub fn new(mut samples: Vec<TimedSample>) -> Self {
        samples.sort_by_key(|s| s.timestamp);
        Self { samples }
    }

    /// Parse a JSON array of `{point_id, timestamp, value}` objects.
    pub fn from_json(json: &str) -> Result<Self> {
        let samples: Vec<TimedSample> = serde_json::from_str(json)?;
        Ok(Self::new(samples))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn push(&mut self, sample: TimedSample) {
        let index = self.samples.partition_point(|s| s.timestamp <= sample.timestamp);
        self.samples.insert(index, sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Earliest and latest timestamps, if any samples exist.
    pub fn span(&self) -> Option<TimeRange> {
        let first = self.samples.first()?.timestamp;
        let last = self.samples.last()?.timestamp;
        TimeRange::new(first, last).ok()
    }
}

impl SampleSource for InMemorySampleSource {
    fn samples(&self, points: &BTreeSet<TwinId>, range: &TimeRange) -> Result<Vec<TimedSample>> {
        let start = self.samples.partition_point(|s| s.timestamp < range.start);
        Ok(self.samples[start..]
            .iter()
            .take_while(|s| s.timestamp <= range.end)
            .filter(|s| points.contains(&s.point_id))
            .cloned()
            .collect())
    }
}
