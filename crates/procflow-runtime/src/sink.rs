//! Sink implementations for emitted models and conformance results

use async_trait::async_trait;
use procflow_core::{MiningError, Result};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::error;

/// Consumer of a stream's values.
///
/// A sink is closed exactly once, after completion or after `on_error`.
#[async_trait]
pub trait Sink<T: Send + Sync>: Send + Sync {
    /// Name of this sink
    fn name(&self) -> &str;

    async fn send(&self, item: &T) -> Result<()>;

    /// The stream failed; no further values follow.
    async fn on_error(&self, err: &MiningError) -> Result<()> {
        error!(sink = self.name(), kind = err.kind().as_str(), "{}", err);
        Ok(())
    }

    /// Flush any buffered data
    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()>;
}

/// Console sink - prints one JSON document per value to stdout
pub struct ConsoleSink {
    name: String,
    pretty: bool,
}

impl ConsoleSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pretty: false,
        }
    }

    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }
}

#[async_trait]
impl<T> Sink<T> for ConsoleSink
where
    T: Serialize + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, item: &T) -> Result<()> {
        let line = if self.pretty {
            serde_json::to_string_pretty(item)?
        } else {
            serde_json::to_string(item)?
        };
        println!("{}", line);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// File sink - writes JSON lines to a file
pub struct FileSink {
    name: String,
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl FileSink {
    /// Create (or truncate) the file at `path`.
    pub fn create(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .map_err(|e| MiningError::io(format!("{}: {}", path.display(), e)))?;
        Ok(Self::with_file(name, path, file))
    }

    /// Append to the file at `path`, creating it if needed.
    pub fn append(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| MiningError::io(format!("{}: {}", path.display(), e)))?;
        Ok(Self::with_file(name, path, file))
    }

    fn with_file(name: impl Into<String>, path: PathBuf, file: File) -> Self {
        Self {
            name: name.into(),
            path,
            file: Arc::new(Mutex::new(file)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl<T> Sink<T> for FileSink
where
    T: Serialize + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, item: &T) -> Result<()> {
        let json = serde_json::to_string(item)?;
        let mut file = self.file.lock().await;
        writeln!(file, "{}", json)?;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let mut file = self.file.lock().await;
        file.flush()?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        <Self as Sink<T>>::flush(self).await
    }
}

struct Collected<T> {
    items: Vec<T>,
    error: Option<MiningError>,
    closes: usize,
}

/// Keeps every value in memory. Clones share the same buffer.
pub struct CollectSink<T> {
    name: String,
    state: Arc<Mutex<Collected<T>>>,
}

impl<T> Clone for CollectSink<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Clone> CollectSink<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(Collected {
                items: Vec::new(),
                error: None,
                closes: 0,
            })),
        }
    }

    pub async fn items(&self) -> Vec<T> {
        self.state.lock().await.items.clone()
    }

    pub async fn last(&self) -> Option<T> {
        self.state.lock().await.items.last().cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.items.len()
    }

    pub async fn error(&self) -> Option<MiningError> {
        self.state.lock().await.error.clone()
    }

    pub async fn close_count(&self) -> usize {
        self.state.lock().await.closes
    }
}

#[async_trait]
impl<T> Sink<T> for CollectSink<T>
where
    T: Clone + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, item: &T) -> Result<()> {
        self.state.lock().await.items.push(item.clone());
        Ok(())
    }

    async fn on_error(&self, err: &MiningError) -> Result<()> {
        self.state.lock().await.error = Some(err.clone());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().await.closes += 1;
        Ok(())
    }
}

/// Multi-sink that broadcasts to multiple sinks
pub struct MultiSink<T> {
    name: String,
    sinks: Vec<Box<dyn Sink<T>>>,
}

impl<T: Send + Sync> MultiSink<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sinks: Vec::new(),
        }
    }

    pub fn add(mut self, sink: Box<dyn Sink<T>>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl<T: Send + Sync> Sink<T> for MultiSink<T> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, item: &T) -> Result<()> {
        for sink in &self.sinks {
            if let Err(e) = sink.send(item).await {
                error!("Sink {} error: {}", sink.name(), e);
            }
        }
        Ok(())
    }

    async fn on_error(&self, err: &MiningError) -> Result<()> {
        for sink in &self.sinks {
            sink.on_error(err).await?;
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        for sink in &self.sinks {
            sink.flush().await?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        for sink in &self.sinks {
            sink.close().await?;
        }
        Ok(())
    }
}
