//! Procflow Runtime - streaming miners and conformance checkers
//!
//! Pipelines are chains of tokio tasks connected by bounded channels. A
//! [`Source`] feeds a [`Stream`], each [`Stream::pipe`] stage drives one
//! [`Mapper`], and a [`Sink`] receives the results:
//!
//! ```rust,no_run
//! use procflow_runtime::{ConsoleSink, HeuristicsMiner, MinerConfig, Stream};
//! use procflow_runtime::simulator::{TemplateConfig, TraceTemplateSource};
//!
//! # async fn demo() -> procflow_core::Result<()> {
//! let source = TraceTemplateSource::new(TemplateConfig::new(["A B C", "A C"]).with_repetitions(10));
//! Stream::from_source(source)
//!     .pipe(HeuristicsMiner::new(MinerConfig::default())?)
//!     .run(&ConsoleSink::new("models"))
//!     .await
//! # }
//! ```

pub mod aer;
pub mod conformance;
pub mod connector;
pub mod event_file;
pub mod heuristics;
pub mod lossy;
pub mod case_cache;
pub mod mapper;
pub mod merge;
pub mod metrics;
pub mod router;
pub mod simulator;
pub mod sink;
pub mod stream;

pub use aer::AerMiner;
pub use conformance::{
    BehavioralChecker, ConformanceStatus, ReferenceBuilder, SoftConfig, SoftConformance,
    SoftReport, TemporalChecker, TemporalConfig, TemporalDiagnostic,
};
pub use event_file::{EventLogSource, OcelSource};
pub use heuristics::{HeuristicsMiner, MinerConfig};
pub use lossy::{BucketClock, Capacity, LossyCounter, LossyTable};
pub use case_cache::CaseCache;
pub use mapper::{Filter, MapFn, Mapper, MapperExt};
pub use merge::{MessageDecoder, OcMerge, OcdfgUpdate};
pub use metrics::{Metered, Metrics, MetricsServer};
pub use router::{Command, ObjectTypeRouter, RouterConfig, RouterMessage};
pub use sink::{CollectSink, ConsoleSink, FileSink, MultiSink, Sink};
pub use stream::{Source, Stream, StreamSender, Subscription};
