//! Prometheus metrics for procflow pipelines

use crate::mapper::Mapper;
use crate::merge::OcdfgUpdate;
use crate::router::{Command, RouterMessage};
use procflow_core::{MiningError, Result};
use prometheus::{CounterVec, Gauge, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{error, info};

fn metrics_error(e: prometheus::Error) -> MiningError {
    MiningError::config(format!("metrics registration failed: {}", e))
}

/// Metrics collection for procflow pipelines
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    pub events_ingested: CounterVec,
    pub models_emitted: CounterVec,
    pub evictions: CounterVec,
    pub active_object_types: Gauge,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let events_ingested = CounterVec::new(
            Opts::new("procflow_events_ingested_total", "Events ingested per pipeline"),
            &["pipeline"],
        )
        .map_err(metrics_error)?;

        let models_emitted = CounterVec::new(
            Opts::new("procflow_models_emitted_total", "Models emitted per kind"),
            &["kind"],
        )
        .map_err(metrics_error)?;

        let evictions = CounterVec::new(
            Opts::new("procflow_evictions_total", "Entries evicted by bounded state"),
            &["component"],
        )
        .map_err(metrics_error)?;

        let active_object_types = Gauge::new(
            "procflow_active_object_types",
            "Object types in the latest merged model",
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(events_ingested.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(models_emitted.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(evictions.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(active_object_types.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry: Arc::new(registry),
            events_ingested,
            models_emitted,
            evictions,
            active_object_types,
        })
    }

    pub fn record_events(&self, pipeline: &str, count: usize) {
        self.events_ingested
            .with_label_values(&[pipeline])
            .inc_by(count as f64);
    }

    pub fn record_models(&self, kind: &str, count: usize) {
        self.models_emitted
            .with_label_values(&[kind])
            .inc_by(count as f64);
    }

    pub fn record_eviction(&self, component: &str) {
        self.evictions.with_label_values(&[component]).inc();
    }

    /// Count a router message: models by kind, deregistrations as evictions.
    pub fn observe_message(&self, message: &RouterMessage) {
        match message {
            RouterMessage::Dfg { .. } => self.record_models("dfg", 1),
            RouterMessage::Aer { .. } => self.record_models("aer", 1),
            RouterMessage::Command {
                command: Command::Deregister,
                ..
            } => self.record_eviction("object_type"),
            RouterMessage::Command { .. } => {}
        }
    }

    pub fn observe_update(&self, update: &OcdfgUpdate) {
        self.record_models("ocdfg", 1);
        self.active_object_types
            .set(update.ocdfg.object_types.len() as f64);
    }

    /// Text exposition of every registered metric.
    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        match encoder.encode_to_string(&families) {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "Failed to encode metrics");
                String::new()
            }
        }
    }
}

/// Pass-through mapper counting what flows through `inner`.
pub struct Metered<M> {
    inner: M,
    metrics: Metrics,
    pipeline: String,
    kind: String,
}

impl<M> Metered<M> {
    /// Inputs are counted under `pipeline`, outputs as models of `kind`.
    pub fn new(inner: M, metrics: Metrics, pipeline: &str, kind: &str) -> Self {
        Self {
            inner,
            metrics,
            pipeline: pipeline.to_string(),
            kind: kind.to_string(),
        }
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }
}

impl<In, M: Mapper<In>> Mapper<In> for Metered<M> {
    type Output = M::Output;

    fn on_next(&mut self, item: In) -> Result<Vec<M::Output>> {
        self.metrics.record_events(&self.pipeline, 1);
        let out = self.inner.on_next(item)?;
        if !out.is_empty() {
            self.metrics.record_models(&self.kind, out.len());
        }
        Ok(out)
    }

    fn on_complete(&mut self) -> Result<Vec<M::Output>> {
        let out = self.inner.on_complete()?;
        if !out.is_empty() {
            self.metrics.record_models(&self.kind, out.len());
        }
        Ok(out)
    }
}

/// Serves `/metrics` in text format over a bare TCP listener.
pub struct MetricsServer {
    metrics: Metrics,
    listener: TcpListener,
}

impl MetricsServer {
    pub async fn bind(metrics: Metrics, addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { metrics, listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Answer every connection with the current metrics until the task is
    /// dropped.
    pub async fn run(self) -> Result<()> {
        info!(addr = %self.local_addr()?, "Metrics server listening");

        loop {
            let (mut socket, _addr) = self.listener.accept().await?;

            // The request line is not inspected; drain what has arrived.
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;

            let body = self.metrics.gather();
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );

            if let Err(e) = socket.write_all(response.as_bytes()).await {
                error!(error = %e, "Failed to write metrics response");
            }
        }
    }
}
