//! Engine orchestration: owns the current rule instances and drives the
//! actor over them against a [`StateStore`].
//!
//! Every instance timeline has a single writer. `run` holds a per-instance
//! lock from loading the prior state until the new state is saved, and
//! `regenerate` takes the same lock before pruning an instance's records.
//! `run_batch` evaluates distinct instances in parallel on rayon.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};
use twinwatch_core::{EngineConfig, TimeRange, TimedSample};
use twinwatch_graph::TwinGraph;

use crate::actor::{self, CancelToken, Command, Insight, ProcessOutput};
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticLog};
use crate::error::EngineError;
use crate::generator::generate_all;
use crate::instance::RuleInstance;
use crate::schema::{MacroTable, Rule};
use crate::store::{SampleSource, StateStore};

pub type Result<T> = std::result::Result<T, EngineError>;

/// What a [`RuleEngine::regenerate`] call changed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Regeneration {
    /// Instance count after regeneration.
    pub instances: usize,
    pub diagnostics: Vec<Diagnostic>,
    /// `(instance id, trigger name)` of every deleted command.
    pub removed_commands: Vec<(String, String)>,
    /// Instances whose state was deleted because they no longer exist.
    pub removed_instances: Vec<String>,
}

/// One instance's result in a batch run.
#[derive(Debug)]
pub struct BatchOutcome {
    pub instance_id: String,
    pub result: Result<ProcessOutput>,
}

pub struct RuleEngine {
    config: EngineConfig,
    store: Arc<dyn StateStore>,
    diagnostics: Arc<DiagnosticLog>,
    instances: RwLock<BTreeMap<String, Arc<RuleInstance>>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Dedicated pool when `worker_threads` is set; otherwise the global one.
    pool: Option<rayon::ThreadPool>,
}

impl RuleEngine {
    pub fn new(config: EngineConfig, store: Arc<dyn StateStore>) -> Result<Self> {
        let pool = match config.worker_threads {
            0 => None,
            n => Some(rayon::ThreadPoolBuilder::new().num_threads(n).build()?),
        };
        Ok(Self {
            config,
            store,
            diagnostics: Arc::new(DiagnosticLog::new()),
            instances: RwLock::new(BTreeMap::new()),
            locks: Mutex::new(HashMap::new()),
            pool,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub fn diagnostics(&self) -> &Arc<DiagnosticLog> {
        &self.diagnostics
    }

    /// Current instances, sorted by id.
    pub fn instances(&self) -> Vec<Arc<RuleInstance>> {
        let guard = self.instances.read().unwrap_or_else(|e| e.into_inner());
        guard.values().cloned().collect()
    }

    pub fn instance(&self, instance_id: &str) -> Option<Arc<RuleInstance>> {
        let guard = self.instances.read().unwrap_or_else(|e| e.into_inner());
        guard.get(instance_id).cloned()
    }

    pub fn commands(&self) -> Result<Vec<Command>> {
        Ok(self.store.list_commands()?)
    }

    pub fn insights(&self) -> Result<Vec<Insight>> {
        Ok(self.store.list_insights()?)
    }

    // ── Regeneration ────────────────────────────────────────────────

    /// Replace every instance with a fresh generation from `rules`.
    ///
    /// Commands whose instance or trigger no longer exists are deleted
    /// regardless of state. Stored state of a vanished instance is deleted;
    /// stored state of a surviving instance loses its removed triggers.
    pub fn regenerate(&self, rules: &[Rule], graph: &dyn TwinGraph, macros: &MacroTable) -> Result<Regeneration> {
        let generation = self.install(|| generate_all(rules, graph, macros, &self.config));
        self.diagnostics.record_all(generation.diagnostics.iter().cloned());

        let fresh: BTreeMap<String, Arc<RuleInstance>> = generation
            .instances
            .into_iter()
            .map(|i| (i.id.clone(), Arc::new(i)))
            .collect();

        let mut summary = Regeneration {
            instances: fresh.len(),
            diagnostics: generation.diagnostics,
            ..Regeneration::default()
        };

        for command in self.store.list_commands()? {
            let keep = fresh
                .get(&command.rule_instance_id)
                .is_some_and(|i| i.trigger(&command.trigger_name).is_some());
            if keep {
                continue;
            }
            let lock = self.lock_for(&command.rule_instance_id);
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            if self.store.delete_command(&command.rule_instance_id, &command.trigger_name)? {
                debug!(
                    instance_id = %command.rule_instance_id,
                    trigger = %command.trigger_name,
                    "deleted command of removed trigger"
                );
                summary
                    .removed_commands
                    .push((command.rule_instance_id.clone(), command.trigger_name.clone()));
            }
        }

        for instance_id in self.store.state_ids()? {
            let lock = self.lock_for(&instance_id);
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            match fresh.get(&instance_id) {
                None => {
                    self.store.delete_state(&instance_id)?;
                    self.store.delete_insight(&instance_id)?;
                    summary.removed_instances.push(instance_id);
                }
                Some(instance) => self.prune_state(instance)?,
            }
        }

        let mut guard = self.instances.write().unwrap_or_else(|e| e.into_inner());
        *guard = fresh;
        drop(guard);

        info!(
            instances = summary.instances,
            excluded = summary.diagnostics.len(),
            removed_commands = summary.removed_commands.len(),
            removed_instances = summary.removed_instances.len(),
            "regenerated rule instances"
        );
        Ok(summary)
    }

    /// Drop trigger and insight state the regenerated instance no longer has.
    fn prune_state(&self, instance: &RuleInstance) -> Result<()> {
        let Some(mut state) = self.store.load_state(&instance.id)? else {
            return Ok(());
        };
        let keep: Vec<&str> = instance.triggers.iter().map(|t| t.name.as_str()).collect();
        let removed = state.retain_triggers(&keep);
        let drop_insight = instance.result_parameter().is_none() && state.insight.is_some();
        if drop_insight {
            state.insight = None;
            self.store.delete_insight(&instance.id)?;
        }
        if !removed.is_empty() || drop_insight {
            debug!(instance_id = %instance.id, removed = ?removed, "pruned stored state");
            self.store.save_state(&state)?;
        }
        Ok(())
    }

    // ── Running ─────────────────────────────────────────────────────

    /// Process `samples` for one instance, continuing from its stored state,
    /// and persist the result.
    pub fn run(
        &self,
        instance_id: &str,
        samples: &[TimedSample],
        range: &TimeRange,
        cancel: &CancelToken,
    ) -> Result<ProcessOutput> {
        let instance = self
            .instance(instance_id)
            .ok_or_else(|| EngineError::UnknownInstance(instance_id.to_string()))?;
        self.run_instance(&instance, samples, range, cancel)
    }

    /// Run every instance over `range` with samples from `source`.
    /// Outcomes are ordered by instance id; one failure does not stop the rest.
    pub fn run_batch(&self, source: &dyn SampleSource, range: &TimeRange, cancel: &CancelToken) -> Vec<BatchOutcome> {
        let instances = self.instances();
        let outcomes: Vec<BatchOutcome> = self.install(|| {
            instances
                .par_iter()
                .map(|instance| {
                    let result = source
                        .samples(&instance.point_ids(), range)
                        .map_err(EngineError::from)
                        .and_then(|samples| self.run_instance(instance, &samples, range, cancel));
                    BatchOutcome {
                        instance_id: instance.id.clone(),
                        result,
                    }
                })
                .collect()
        });

        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        let cancelled = outcomes
            .iter()
            .any(|o| o.result.as_ref().is_ok_and(|out| out.cancelled));
        info!(
            instances = outcomes.len(),
            failed,
            cancelled,
            start = %range.start,
            end = %range.end,
            "batch run finished"
        );
        outcomes
    }

    fn run_instance(
        &self,
        instance: &RuleInstance,
        samples: &[TimedSample],
        range: &TimeRange,
        cancel: &CancelToken,
    ) -> Result<ProcessOutput> {
        let lock = self.lock_for(&instance.id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let prior = self.store.load_state(&instance.id)?;
        let output = match actor::process(instance, prior.as_ref(), samples, range, &self.config, cancel) {
            Ok(output) => output,
            Err(e) => {
                self.diagnostics.record(
                    Diagnostic::new(instance.rule_id.clone(), DiagnosticKind::Contract, e.to_string())
                        .for_twin(instance.twin_id.clone()),
                );
                return Err(e.into());
            }
        };

        // The watermark is saved last: a failed command or insight write
        // leaves the old state, so the next run reproduces them.
        for command in &output.commands {
            self.store.save_command(command)?;
        }
        for insight in &output.insights {
            self.store.save_insight(insight)?;
        }
        self.store.save_state(&output.state)?;
        self.diagnostics.record_all(output.diagnostics.iter().cloned());

        if output.cancelled {
            warn!(instance_id = %instance.id, watermark = ?output.state.watermark, "run cancelled");
        }
        Ok(output)
    }

    fn lock_for(&self, instance_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(instance_id.to_string()).or_default().clone()
    }

    fn install<T: Send>(&self, f: impl FnOnce() -> T + Send) -> T {
        match &self.pool {
            Some(pool) => pool.install(f),
            None => f(),
        }
    }
}
