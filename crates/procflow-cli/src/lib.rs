//! Procflow CLI library - testable pieces of the `procflow` binary
//!
//! Logging setup, sink selection and the helpers that turn training logs
//! and configuration sections into runtime components.

pub mod config;

use anyhow::{Context, Result};
use config::{Config, LoggingConfig, MetricsConfig};
use procflow_core::{Dfg, Event, Pdfa, ReferenceModel, TemporalProfile};
use procflow_runtime::event_file::read_event_log;
use procflow_runtime::{
    ConsoleSink, EventLogSource, FileSink, Metrics, MetricsServer, ObjectTypeRouter,
    ReferenceBuilder, Sink, Stream,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Install the global subscriber described by the `logging` section.
///
/// Logs go to stderr so stdout stays free for emitted models.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let level: Level = config
        .level
        .parse()
        .map_err(|_| anyhow::anyhow!("Unknown log level '{}'", config.level))?;

    match config.format.as_str() {
        "json" => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(std::io::stderr)
                .json()
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        "text" => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        other => anyhow::bail!("Unknown log format '{}' (expected text or json)", other),
    }
    Ok(())
}

/// JSON lines to `output` when given, stdout otherwise.
pub fn output_sink<T>(name: &str, output: Option<&Path>) -> Result<Box<dyn Sink<T>>>
where
    T: Serialize + Send + Sync + 'static,
{
    match output {
        Some(path) => {
            let sink = FileSink::create(name, path)
                .with_context(|| format!("Failed to create output file {}", path.display()))?;
            Ok(Box::new(sink))
        }
        None => Ok(Box::new(ConsoleSink::new(name))),
    }
}

/// Learn a reference model from a complete training log.
pub async fn learn_reference(path: &Path, max_path_depth: usize) -> Result<ReferenceModel> {
    let models = Stream::from_source(EventLogSource::new(path))
        .pipe(ReferenceBuilder::new(max_path_depth))
        .collect()
        .await
        .with_context(|| format!("Failed to learn reference model from {}", path.display()))?;
    let model = models.into_iter().last().unwrap_or_default();
    info!(relations = model.len(), "Reference model ready");
    Ok(model)
}

/// Directly-follows counts of a finite log, one trace per case in
/// timestamp order.
pub fn discover_dfg(events: &[Event]) -> Dfg {
    let mut traces: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for event in events {
        traces
            .entry(event.case_id.as_ref())
            .or_default()
            .push(event.activity.as_ref());
    }
    let traces: Vec<Vec<&str>> = traces.into_values().collect();
    Dfg::from_traces(&traces)
}

/// Automaton whose transition probabilities are the relative
/// directly-follows frequencies of `events`.
pub fn learn_pdfa(events: &[Event]) -> Pdfa {
    let dfg = discover_dfg(events);
    Pdfa::from_counts(dfg.edges().map(|((from, to), count)| (from.as_str(), to.as_str(), count)))
}

/// Load a serialized automaton.
pub fn load_pdfa(path: &Path) -> Result<Pdfa> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid automaton in {}", path.display()))
}

/// Learn an automaton from a training log.
pub fn learn_pdfa_from(path: &Path) -> Result<Pdfa> {
    let events = read_event_log(path)?;
    Ok(learn_pdfa(&events))
}

pub fn learn_temporal_profile(path: &Path) -> Result<TemporalProfile> {
    let events = read_event_log(path)?;
    let profile = TemporalProfile::discover(&events)?;
    info!(pairs = profile.len(), "Temporal profile ready");
    Ok(profile)
}

/// Dynamic router, or a static one when `control_flow` lists types.
pub fn build_router(config: &Config) -> Result<ObjectTypeRouter> {
    let router_config = config.object_centric.to_router_config(&config.miner);
    let router = if config.object_centric.control_flow.is_empty() {
        ObjectTypeRouter::new(router_config)?
    } else {
        ObjectTypeRouter::for_types(router_config, config.object_centric.control_flow.clone())?
    };
    Ok(router)
}

/// Start the metrics endpoint when enabled.
pub async fn start_metrics(config: &MetricsConfig) -> Result<Option<Metrics>> {
    if !config.enabled {
        return Ok(None);
    }
    let metrics = Metrics::new()?;
    let addr = format!("127.0.0.1:{}", config.port);
    let server = MetricsServer::bind(metrics.clone(), &addr)
        .await
        .with_context(|| format!("Failed to bind metrics endpoint on {}", addr))?;
    tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!(error = %e, "Metrics server stopped");
        }
    });
    Ok(Some(metrics))
}

/// Flat JSON record readable back by the JSON-lines log reader.
pub fn flat_record(event: &Event) -> Value {
    let mut record = Map::new();
    record.insert("case_id".to_string(), Value::from(event.case_id.as_ref()));
    record.insert("activity".to_string(), Value::from(event.activity.as_ref()));
    record.insert(
        "timestamp".to_string(),
        Value::from(event.timestamp.to_rfc3339()),
    );
    for (key, value) in &event.attributes {
        record.insert(
            key.clone(),
            serde_json::to_value(value).unwrap_or(Value::Null),
        );
    }
    Value::Object(record)
}
