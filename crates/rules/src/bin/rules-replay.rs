//! rules-replay: offline host for the rules engine.
//!
//! Loads a rules directory, a JSON graph document and a JSON sample file,
//! generates rule instances, replays the samples through them and prints the
//! resulting commands, insights and diagnostics as JSON on stdout. With
//! `--state-file` the actor state survives between invocations, so a later
//! call with a later range continues where the previous one stopped.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use twinwatch_core::{load_dotenv, EngineConfig, TimeRange};
use twinwatch_graph::GraphDocument;
use twinwatch_rules::actor::{CancelToken, Command, Insight};
use twinwatch_rules::diagnostics::Diagnostic;
use twinwatch_rules::engine::RuleEngine;
use twinwatch_rules::loader::{LoadStatus, RuleLoader};
use twinwatch_rules::store::{InMemorySampleSource, InMemoryStateStore, JsonFileStateStore, StateStore};

// ── CLI ─────────────────────────────────────────────────────────────

/// Replay telemetry through twin-graph rules.
#[derive(Parser, Debug)]
#[command(name = "rules-replay", version, about)]
struct Cli {
    /// Directory of rule and macro YAML documents.
    #[arg(long, env = "TWINWATCH_RULES_DIR", default_value = "data/rules")]
    rules_dir: PathBuf,

    /// Graph document (JSON).
    #[arg(long, env = "TWINWATCH_GRAPH")]
    graph: PathBuf,

    /// Samples (JSON array of `{point_id, timestamp, value}`).
    #[arg(long, env = "TWINWATCH_SAMPLES")]
    samples: PathBuf,

    /// Range start (RFC 3339). Defaults to the earliest sample.
    #[arg(long)]
    start: Option<DateTime<Utc>>,

    /// Range end (RFC 3339). Defaults to the latest sample.
    #[arg(long)]
    end: Option<DateTime<Utc>>,

    /// Split the range into consecutive runs of this many hours.
    #[arg(long)]
    chunk_hours: Option<u32>,

    /// Persist actor state, commands and insights to this JSON file.
    #[arg(long, env = "TWINWATCH_STATE_FILE")]
    state_file: Option<PathBuf>,

    /// Pretty-print the JSON report.
    #[arg(long)]
    pretty: bool,
}

#[derive(Serialize)]
struct Report {
    instances: usize,
    commands: Vec<Command>,
    insights: Vec<Insight>,
    diagnostics: Vec<Diagnostic>,
}

// ── main ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    load_dotenv();
    let cli = Cli::parse();
    let config = EngineConfig::from_env();
    config.log_summary();

    let loader = RuleLoader::new(cli.rules_dir.clone());
    let results = loader
        .load_all()
        .with_context(|| format!("failed to scan {}", cli.rules_dir.display()))?;
    for result in &results {
        if let LoadStatus::Failed { error } = &result.status {
            warn!(path = %result.path.display(), error = %error, "rule document rejected");
        }
    }

    let graph = GraphDocument::from_path(&cli.graph)?.into_snapshot();
    let source = InMemorySampleSource::from_path(&cli.samples)
        .with_context(|| format!("failed to read samples from {}", cli.samples.display()))?;

    let span = source.span();
    let (start, end) = match (cli.start.or(span.map(|s| s.start)), cli.end.or(span.map(|s| s.end))) {
        (Some(start), Some(end)) => (start, end),
        _ => bail!("no samples to infer the range from; pass --start and --end"),
    };
    let range = TimeRange::new(start, end)?;

    let store: Arc<dyn StateStore> = match &cli.state_file {
        Some(path) => Arc::new(JsonFileStateStore::open(path)?),
        None => Arc::new(InMemoryStateStore::new()),
    };

    let engine = RuleEngine::new(config, store)?;
    let regeneration = engine.regenerate(&loader.rules(), &graph, &loader.macros())?;
    let mut diagnostics = regeneration.diagnostics;

    let cancel = CancelToken::new();
    for chunk in chunks(range, cli.chunk_hours) {
        for outcome in engine.run_batch(&source, &chunk, &cancel) {
            match outcome.result {
                Ok(output) => diagnostics.extend(output.diagnostics),
                Err(e) => warn!(instance_id = %outcome.instance_id, error = %e, "instance run failed"),
            }
        }
    }

    let report = Report {
        instances: regeneration.instances,
        commands: engine.commands()?,
        insights: engine.insights()?,
        diagnostics,
    };
    info!(
        instances = report.instances,
        commands = report.commands.len(),
        insights = report.insights.len(),
        diagnostics = report.diagnostics.len(),
        "replay finished"
    );

    let json = if cli.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{}", json);
    Ok(())
}

/// Consecutive inclusive ranges covering `range`. Adjacent ranges share a
/// boundary; the actor's watermark keeps the shared instant from being
/// processed twice.
fn chunks(range: TimeRange, hours: Option<u32>) -> Vec<TimeRange> {
    let Some(hours) = hours.filter(|h| *h > 0) else {
        return vec![range];
    };
    let step = Duration::hours(i64::from(hours));
    let mut out = Vec::new();
    let mut start = range.start;
    while start < range.end {
        let end = (start + step).min(range.end);
        out.push(TimeRange { start, end });
        start = end;
    }
    if out.is_empty() {
        out.push(range);
    }
    out
}
