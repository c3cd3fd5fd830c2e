//! Procflow CLI - streaming process mining from the command line

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use procflow_core::{Event, ObjectCentricEvent, Pdfa};
use procflow_runtime::simulator::{TemplateConfig, TraceTemplateSource};
use procflow_runtime::{
    BehavioralChecker, EventLogSource, Filter, HeuristicsMiner, MapFn, Metered, Metrics,
    ObjectTypeRouter, OcMerge, OcdfgUpdate, OcelSource, RouterMessage, SoftConformance, Stream,
    TemporalChecker, TemporalDiagnostic,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use procflow_cli::config::Config;
use procflow_cli::{
    build_router, flat_record, init_logging, learn_pdfa_from, learn_reference,
    learn_temporal_profile, load_pdfa, output_sink, start_metrics,
};

#[derive(Parser)]
#[command(name = "procflow")]
#[command(author = "Procflow Contributors")]
#[command(version)]
#[command(about = "Procflow - streaming process discovery and conformance checking", long_about = None)]
struct Cli {
    /// Path to configuration file (YAML or TOML)
    #[arg(short, long, global = true, env = "PROCFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long, global = true, env = "PROCFLOW_LOG")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mine heuristics nets from a flat event log
    Mine {
        /// Event log (.jsonl or .csv)
        input: PathBuf,

        /// Write models as JSON lines instead of printing them
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Fixed entry budget instead of the configured error bound
        #[arg(long)]
        budget: Option<usize>,

        /// Emit a net every N events
        #[arg(long)]
        update_every: Option<u64>,
    },

    /// Mine an object-centric DFG from an OCEL log
    OcMine {
        /// OCEL log (JSON document or JSON lines)
        input: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Mine only these object types
        #[arg(long, value_delimiter = ',')]
        types: Vec<String>,
    },

    /// Behavioral conformance against a model learned from a training log
    Conform {
        /// Training log defining the reference behavior
        #[arg(short, long)]
        reference: PathBuf,

        /// Event log to check
        input: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Soft conformance against a probabilistic automaton
    SoftConform {
        /// Training log the automaton is learned from
        #[arg(short, long, conflicts_with = "pdfa", required_unless_present = "pdfa")]
        reference: Option<PathBuf>,

        /// Serialized automaton (JSON)
        #[arg(long)]
        pdfa: Option<PathBuf>,

        input: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Temporal conformance against a profile learned from a training log
    TemporalConform {
        #[arg(short, long)]
        reference: PathBuf,

        input: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only report events with at least one deviation
        #[arg(long)]
        deviations_only: bool,
    },

    /// Generate a flat event log from trace templates
    Simulate {
        /// Space-separated activity sequences, one per template
        #[arg(short, long, required = true)]
        template: Vec<String>,

        /// Cases generated per template
        #[arg(short, long, default_value = "10")]
        repetitions: usize,

        /// Shuffle the cases with this seed
        #[arg(long)]
        seed: Option<u64>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Mine heuristics nets from an MQTT topic tree
    #[cfg(feature = "mqtt")]
    MqttMine {
        /// Broker host
        #[arg(long, default_value = "localhost")]
        broker: String,

        #[arg(long, default_value = "1883")]
        port: u16,

        /// Topics are read as `<base>/<process>/<case>/<activity>`
        #[arg(long)]
        base_topic: String,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print an example configuration
    ConfigGen {
        #[arg(short, long, value_enum, default_value = "yaml")]
        format: ConfigFormat,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ConfigFormat {
    Yaml,
    Toml,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    init_logging(&config.logging)?;

    match cli.command {
        Commands::Mine {
            input,
            output,
            budget,
            update_every,
        } => {
            if budget.is_some() {
                config.miner.budget = budget;
            }
            if let Some(update_every) = update_every {
                config.miner.update_every = update_every;
            }
            let metrics = start_metrics(&config.metrics).await?;
            let miner = HeuristicsMiner::new(config.miner.to_miner_config())?;
            let events = Stream::from_source(EventLogSource::new(&input));
            let nets = match metrics {
                Some(metrics) => {
                    events.pipe(Metered::new(miner, metrics, "mine", "heuristics_net"))
                }
                None => events.pipe(miner),
            };
            deliver(nets, "heuristics-nets", output.as_deref()).await?;
        }

        Commands::OcMine {
            input,
            output,
            types,
        } => {
            if !types.is_empty() {
                config.object_centric.control_flow = types;
            }
            let metrics = start_metrics(&config.metrics).await?;
            let router = build_router(&config)?;
            let events = Stream::from_source(OcelSource::new(&input));
            let updates = run_oc_mining(events, router, metrics);
            deliver(updates, "ocdfg", output.as_deref()).await?;
        }

        Commands::Conform {
            reference,
            input,
            output,
        } => {
            let model = learn_reference(&reference, config.conformance.max_path_depth).await?;
            let checker = BehavioralChecker::new(model, config.conformance.max_cases)?;
            let statuses = Stream::from_source(EventLogSource::new(&input)).pipe(checker);
            deliver(statuses, "conformance", output.as_deref()).await?;
        }

        Commands::SoftConform {
            reference,
            pdfa,
            input,
            output,
        } => {
            let automaton: Pdfa = match (pdfa, reference) {
                (Some(path), _) => load_pdfa(&path)?,
                (None, Some(path)) => learn_pdfa_from(&path)?,
                (None, None) => anyhow::bail!("Either --reference or --pdfa must be provided"),
            };
            let tracker = SoftConformance::new(&automaton, config.soft_conformance)?;
            let reports = Stream::from_source(EventLogSource::new(&input)).pipe(tracker);
            deliver(reports, "soft-conformance", output.as_deref()).await?;
        }

        Commands::TemporalConform {
            reference,
            input,
            output,
            deviations_only,
        } => {
            let profile = learn_temporal_profile(&reference)?;
            let checker = TemporalChecker::new(profile, config.temporal)?;
            let diagnostics = Stream::from_source(EventLogSource::new(&input)).pipe(checker);
            let diagnostics = if deviations_only {
                diagnostics.pipe(Filter::new(|d: &TemporalDiagnostic| !d.is_conforming()))
            } else {
                diagnostics
            };
            deliver(diagnostics, "temporal-conformance", output.as_deref()).await?;
        }

        Commands::Simulate {
            template,
            repetitions,
            seed,
            output,
        } => {
            let mut templates = TemplateConfig::new(template).with_repetitions(repetitions);
            if let Some(seed) = seed {
                templates = templates.shuffled(seed);
            }
            let records = Stream::from_source(TraceTemplateSource::new(templates))
                .pipe(MapFn::new(|event: Event| flat_record(&event)));
            deliver(records, "simulated-log", output.as_deref()).await?;
        }

        #[cfg(feature = "mqtt")]
        Commands::MqttMine {
            broker,
            port,
            base_topic,
            output,
        } => {
            use procflow_runtime::connector::{MqttConfig, MqttSource};

            let source = MqttSource::new(
                "mqtt",
                MqttConfig::new(&broker, &base_topic).with_port(port),
            );
            let metrics = start_metrics(&config.metrics).await?;
            let miner = HeuristicsMiner::new(config.miner.to_miner_config())?;
            let events = Stream::from_source(source);
            let nets = match metrics {
                Some(metrics) => {
                    events.pipe(Metered::new(miner, metrics, "mqtt", "heuristics_net"))
                }
                None => events.pipe(miner),
            };
            deliver(nets, "heuristics-nets", output.as_deref()).await?;
        }

        Commands::ConfigGen { format } => match format {
            ConfigFormat::Yaml => print!("{}", Config::example_yaml()),
            ConfigFormat::Toml => print!("{}", Config::example_toml()),
        },
    }

    Ok(())
}

/// Router, merger and, when enabled, the metric taps between them.
fn run_oc_mining(
    events: Stream<ObjectCentricEvent>,
    router: ObjectTypeRouter,
    metrics: Option<Metrics>,
) -> Stream<OcdfgUpdate> {
    let ingest = metrics.clone();
    let messages = metrics.clone();
    events
        .pipe(MapFn::new(move |event: ObjectCentricEvent| {
            if let Some(metrics) = &ingest {
                metrics.record_events("oc-mine", 1);
            }
            event
        }))
        .pipe(router)
        .pipe(MapFn::new(move |message: RouterMessage| {
            if let Some(metrics) = &messages {
                metrics.observe_message(&message);
            }
            message
        }))
        .pipe(OcMerge::new())
        .pipe(MapFn::new(move |update: OcdfgUpdate| {
            if let Some(metrics) = &metrics {
                metrics.observe_update(&update);
            }
            update
        }))
}

async fn deliver<T>(stream: Stream<T>, name: &str, output: Option<&Path>) -> Result<()>
where
    T: Serialize + Send + Sync + 'static,
{
    let sink = output_sink::<T>(name, output)?;
    stream.run(sink.as_ref()).await?;
    if let Some(path) = output {
        info!(path = %path.display(), "Results written");
    }
    Ok(())
}
