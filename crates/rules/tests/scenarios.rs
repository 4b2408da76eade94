//! End-to-end scenarios over the sample dataset in `data/`: rules and a
//! macro loaded from YAML, a graph document and a telemetry file.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Duration, Utc};
use proptest::collection::vec;
use proptest::prelude::*;

use twinwatch_core::{EngineConfig, TimeRange, TimedSample};
use twinwatch_graph::{GraphDocument, GraphSnapshot};
use twinwatch_rules::actor::{process, ActorState, CancelToken, Command};
use twinwatch_rules::diagnostics::{DiagnosticKind, DiagnosticQuery};
use twinwatch_rules::engine::RuleEngine;
use twinwatch_rules::generator::generate_all;
use twinwatch_rules::instance::RuleInstance;
use twinwatch_rules::loader::RuleLoader;
use twinwatch_rules::schema::{MacroTable, Rule, RuleUIElement, UIElementKind};
use twinwatch_rules::store::{InMemorySampleSource, InMemoryStateStore};

const RULE_ID: &str = "zone-air-temp-high";
const VAV_101: &str = "VAV-101_zone-air-temp-high";
const VAV_102: &str = "VAV-102_zone-air-temp-high";
const ZAT_101: &str = "f9463069-6db6-465d-b3e1-96969ac30c0a";
const SP_101: &str = "3b1c5e7a-9d2f-4c68-8a10-5f2e7c9b4d03";

/// Integration tests run from the crate directory.
fn data_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../data")
}

struct Fixture {
    rules: Vec<Rule>,
    macros: MacroTable,
    graph: GraphSnapshot,
}

fn fixture() -> Fixture {
    let loader = RuleLoader::new(data_dir().join("rules"));
    let results = loader.load_all().unwrap();
    assert!(results.iter().all(|r| r.is_loaded()), "{:?}", results);
    let graph = GraphDocument::from_path(&data_dir().join("graph.json"))
        .unwrap()
        .into_snapshot();
    Fixture {
        rules: loader.rules(),
        macros: loader.macros(),
        graph,
    }
}

fn ts(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

fn range(start: &str, end: &str) -> TimeRange {
    TimeRange::new(ts(start), ts(end)).unwrap()
}

fn engine(f: &Fixture) -> RuleEngine {
    let engine = RuleEngine::new(EngineConfig::default(), Arc::new(InMemoryStateStore::new())).unwrap();
    engine.regenerate(&f.rules, &f.graph, &f.macros).unwrap();
    engine
}

fn run_all(engine: &RuleEngine, source: &InMemorySampleSource, range: &TimeRange) {
    for outcome in engine.run_batch(source, range, &CancelToken::new()) {
        if let Err(e) = outcome.result {
            panic!("{} failed: {}", outcome.instance_id, e);
        }
    }
}

fn commands_of(engine: &RuleEngine, instance_id: &str) -> Vec<Command> {
    engine
        .commands()
        .unwrap()
        .into_iter()
        .filter(|c| c.rule_instance_id == instance_id)
        .collect()
}

// ── Scenarios ───────────────────────────────────────────────────────

#[test]
fn fixture_loads_with_macro() {
    let f = fixture();
    assert_eq!(f.rules.len(), 1);
    assert!(f.macros.contains_key("comfort_margin"));
}

#[test]
fn trigger_interval_spans_first_to_last_true_sample() {
    let f = fixture();
    let engine = engine(&f);
    let t0 = ts("2022-08-25T00:00:00Z");
    let at = |h: i64| t0 + Duration::hours(h);

    let k = 5;
    let mut samples = vec![TimedSample::new(SP_101, at(0), 22.0)];
    samples.extend((0..k).map(|h| TimedSample::new(ZAT_101, at(h), 25.0)));
    samples.push(TimedSample::new(ZAT_101, at(k), 23.0));

    engine
        .run(VAV_101, &samples, &TimeRange::new(at(0), at(k)).unwrap(), &CancelToken::new())
        .unwrap();

    let commands = commands_of(&engine, VAV_101);
    assert_eq!(commands.len(), 1);
    let c = &commands[0];
    assert!(!c.is_triggered);
    assert_eq!(c.start_time, at(0));
    assert_eq!(c.end_time, Some(at(k - 1)));
    assert_eq!(c.occurrences.len(), k as usize);
    assert_eq!(c.value, 22.0);
}

#[test]
fn fixture_timeline_resumes_across_runs() {
    let f = fixture();
    let engine = engine(&f);
    let source = InMemorySampleSource::from_path(&data_dir().join("samples.json")).unwrap();

    run_all(&engine, &source, &range("2022-08-25T00:00:00Z", "2022-08-25T23:00:00Z"));
    let first = commands_of(&engine, VAV_101);
    assert_eq!(first.len(), 1);
    let c = &first[0];
    assert_eq!(c.point_id, ZAT_101);
    assert!(c.is_triggered);
    assert!(c.start_time > ts("2022-08-25T22:00:00Z"));
    assert_eq!(c.end_time, None);

    let second_range = range("2022-08-25T23:00:00Z", "2022-08-26T12:00:00Z");
    run_all(&engine, &source, &second_range);
    let second = commands_of(&engine, VAV_101);
    assert_eq!(second.len(), 1);
    let c = &second[0];
    assert!(!c.is_triggered);
    let end = c.end_time.expect("closed interval has an end");
    assert_eq!(c.start_time, end);
    assert!(second_range.contains(c.start_time));
    assert!(second_range.contains(end));

    run_all(&engine, &source, &range("2022-08-26T12:00:00Z", "2022-08-27T00:00:00Z"));
    let third = commands_of(&engine, VAV_101);
    assert!(!third[0].is_triggered);
    assert_eq!(third[0].start_time, c.start_time);
    assert_eq!(third[0].end_time, c.end_time);

    let insight = engine
        .insights()
        .unwrap()
        .into_iter()
        .find(|i| i.id == VAV_101)
        .unwrap();
    assert_eq!(insight.faulted_count, 2);
    assert!(!insight.is_faulty);
}

#[test]
fn removing_triggers_deletes_commands() {
    let f = fixture();
    let engine = engine(&f);
    let source = InMemorySampleSource::from_path(&data_dir().join("samples.json")).unwrap();
    run_all(&engine, &source, &range("2022-08-25T00:00:00Z", "2022-08-26T12:00:00Z"));
    assert_eq!(commands_of(&engine, VAV_101).len(), 1);
    assert_eq!(commands_of(&engine, VAV_102).len(), 1);

    let mut rules = f.rules.clone();
    rules[0].triggers.clear();
    let summary = engine.regenerate(&rules, &f.graph, &f.macros).unwrap();

    assert!(engine.commands().unwrap().is_empty());
    assert_eq!(summary.removed_commands.len(), 2);
    let state = engine.store().load_state(VAV_101).unwrap().unwrap();
    assert!(state.triggers.is_empty());
}

#[test]
fn ambiguous_twin_is_excluded_and_reported() {
    let f = fixture();
    let engine = RuleEngine::new(EngineConfig::default(), Arc::new(InMemoryStateStore::new())).unwrap();
    let summary = engine.regenerate(&f.rules, &f.graph, &f.macros).unwrap();

    let ids: Vec<String> = engine.instances().iter().map(|i| i.id.clone()).collect();
    assert_eq!(ids, vec![VAV_101.to_string(), VAV_102.to_string()]);

    assert_eq!(summary.diagnostics.len(), 1);
    let d = &summary.diagnostics[0];
    assert_eq!(d.kind, DiagnosticKind::Bind);
    assert_eq!(d.twin_id.as_deref(), Some("VAV-103"));
    assert_eq!(d.subject.as_deref(), Some("zat"));
    assert!(d.message.contains("a4c81f22-0b6e-4d39-b7f5-2e9d3c1a8f64"), "{}", d.message);
    assert!(d.message.contains("c09d3b7e-5a14-4e82-9c6f-81b2d4e7a015"), "{}", d.message);

    let logged = engine.diagnostics().query(
        RULE_ID,
        &DiagnosticQuery {
            kind: Some(DiagnosticKind::Bind),
            ..Default::default()
        },
    );
    assert_eq!(logged.len(), 1);
}

#[test]
fn optional_setpoint_falls_back_to_default() {
    let f = fixture();
    let engine = engine(&f);
    let vav_102 = engine.instance(VAV_102).unwrap();
    let sp = vav_102.parameters.iter().find(|p| p.name == "sp").unwrap();
    assert!(sp.points.is_empty());
    assert_eq!(sp.expression.to_string(), "22");

    let vav_101 = engine.instance(VAV_101).unwrap();
    let sp = vav_101.parameters.iter().find(|p| p.name == "sp").unwrap();
    assert_eq!(sp.points, vec![SP_101.to_string()]);
}

#[test]
fn generation_is_deterministic() {
    let f = fixture();
    let config = EngineConfig::default();
    let a = generate_all(&f.rules, &f.graph, &f.macros, &config);
    let b = generate_all(&f.rules, &f.graph, &f.macros, &config);
    assert_eq!(a, b);

    let trigger = &a.instances[0].triggers[0];
    assert_eq!(trigger.point_id, ZAT_101);
    assert!(!trigger.path.is_empty());
    assert_eq!(a.instances[0].graph_version, 3);
}

// ── Properties ──────────────────────────────────────────────────────

/// VAV-101 with a 3 hour window that must be true half the time.
fn windowed_instance() -> &'static RuleInstance {
    static INSTANCE: OnceLock<RuleInstance> = OnceLock::new();
    INSTANCE.get_or_init(|| {
        let f = fixture();
        let mut rule = f.rules[0].clone();
        rule.elements = vec![
            RuleUIElement {
                kind: UIElementKind::OverHowManyHours,
                value: 3.0,
            },
            RuleUIElement {
                kind: UIElementKind::PercentageOfTime,
                value: 0.5,
            },
        ];
        generate_all(&[rule], &f.graph, &f.macros, &EngineConfig::default())
            .instances
            .into_iter()
            .find(|i| i.id == VAV_101)
            .unwrap()
    })
}

fn hour(h: usize) -> DateTime<Utc> {
    ts("2022-08-25T00:00:00Z") + Duration::hours(h as i64)
}

/// One reading per hour; `true` is a zone three degrees over setpoint.
fn hourly(bits: &[bool]) -> Vec<TimedSample> {
    let mut samples = vec![TimedSample::new(SP_101, hour(0), 22.0)];
    samples.extend(
        bits.iter()
            .enumerate()
            .map(|(h, hot)| TimedSample::new(ZAT_101, hour(h), if *hot { 25.0 } else { 23.0 })),
    );
    samples
}

fn step(prior: Option<&ActorState>, samples: &[TimedSample], start: usize, end: usize) -> twinwatch_rules::ProcessOutput {
    process(
        windowed_instance(),
        prior,
        samples,
        &TimeRange::new(hour(start), hour(end)).unwrap(),
        &EngineConfig::default(),
        &CancelToken::new(),
    )
    .unwrap()
}

proptest! {
    #[test]
    fn split_runs_match_one_run(bits in vec(any::<bool>(), 1..40), split in 0usize..40) {
        let samples = hourly(&bits);
        let last = bits.len() - 1;
        let cut = split.min(last);

        let whole = step(None, &samples, 0, last);
        let first = step(None, &samples, 0, cut);
        let second = step(Some(&first.state), &samples, cut, last);

        prop_assert_eq!(&second.state, &whole.state);
        prop_assert_eq!(&second.commands, &whole.commands);
        prop_assert_eq!(&second.insights, &whole.insights);
    }

    #[test]
    fn start_moves_only_on_retrigger_and_end_freezes(bits in vec(any::<bool>(), 1..40)) {
        let samples = hourly(&bits);
        let mut state: Option<ActorState> = None;
        let mut previous: Option<Command> = None;

        for h in 0..bits.len() {
            let out = step(state.as_ref(), &samples, h, h);
            let current = out.commands.first().cloned();
            if let (Some(p), Some(c)) = (&previous, &current) {
                prop_assert!(c.start_time >= p.start_time);
                match (p.is_triggered, c.is_triggered) {
                    (true, true) => prop_assert_eq!(c.start_time, p.start_time),
                    (true, false) => {
                        prop_assert_eq!(c.start_time, p.start_time);
                        prop_assert_eq!(c.end_time, Some(p.last_true));
                    }
                    (false, false) => {
                        prop_assert_eq!(c.start_time, p.start_time);
                        prop_assert_eq!(c.end_time, p.end_time);
                    }
                    (false, true) => {
                        prop_assert_eq!(c.start_time, hour(h));
                        prop_assert_eq!(c.end_time, None);
                    }
                }
            }
            state = Some(out.state);
            if current.is_some() {
                previous = current;
            }
        }
    }
}
