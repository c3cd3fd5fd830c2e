//! Push-based typed streams on top of tokio channels.
//!
//! Every stage runs on its own task and hands its outputs downstream through
//! a bounded `mpsc` channel, so a slow consumer back-pressures its producers.
//! Items are `Result<T>`: the first error is forwarded once and ends the
//! stream.

use crate::mapper::Mapper;
use crate::sink::Sink;
use async_trait::async_trait;
use procflow_core::{MiningError, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Default capacity of the channel between two stages.
pub const DEFAULT_CAPACITY: usize = 1024;

/// The consumer side went away.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("stream '{0}' was closed by its consumer")]
pub struct StreamClosed(pub String);

impl From<StreamClosed> for MiningError {
    fn from(e: StreamClosed) -> Self {
        MiningError::io(e.to_string())
    }
}

/// Producer handle of a stream.
pub struct StreamSender<T> {
    pub name: String,
    sender: mpsc::Sender<Result<T>>,
}

impl<T> Clone for StreamSender<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            sender: self.sender.clone(),
        }
    }
}

impl<T: Send> StreamSender<T> {
    pub async fn send(&self, item: T) -> std::result::Result<(), StreamClosed> {
        self.sender
            .send(Ok(item))
            .await
            .map_err(|_| StreamClosed(self.name.clone()))
    }

    /// Forward a terminal error. The stream ends after the consumer sees it.
    pub async fn send_error(&self, error: MiningError) -> std::result::Result<(), StreamClosed> {
        self.sender
            .send(Err(error))
            .await
            .map_err(|_| StreamClosed(self.name.clone()))
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Produces values into a stream. Runs on its own task.
#[async_trait]
pub trait Source<T: Send>: Send {
    fn name(&self) -> &str;

    /// Emit every value, then return. Returning an error ends the stream
    /// with that error.
    async fn run(&mut self, sender: &StreamSender<T>) -> Result<()>;
}

/// Consumer side of a stream.
pub struct Stream<T> {
    pub name: String,
    receiver: mpsc::Receiver<Result<T>>,
    failed: bool,
}

/// Create a connected sender and stream.
pub fn channel<T>(name: impl Into<String>, capacity: usize) -> (StreamSender<T>, Stream<T>) {
    let name = name.into();
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        StreamSender {
            name: name.clone(),
            sender: tx,
        },
        Stream {
            name,
            receiver: rx,
            failed: false,
        },
    )
}

impl<T: Send + 'static> Stream<T> {
    /// Run `source` on a background task.
    pub fn from_source<S>(source: S) -> Self
    where
        S: Source<T> + 'static,
    {
        let (tx, stream) = channel(source.name().to_string(), DEFAULT_CAPACITY);
        let mut source = source;
        tokio::spawn(async move {
            match source.run(&tx).await {
                Ok(()) => debug!(source = %tx.name, "Source completed"),
                Err(_) if tx.is_closed() => {
                    debug!(source = %tx.name, "Source stopped after consumer closed")
                }
                Err(e) => {
                    error!(source = %tx.name, error = %e, "Source failed");
                    let _ = tx.send_error(e).await;
                }
            }
        });
        stream
    }

    /// A finite stream over the given values.
    pub fn from_iter<I>(name: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = T> + Send + 'static,
        I::IntoIter: Send,
    {
        let (tx, stream) = channel(name, DEFAULT_CAPACITY);
        tokio::spawn(async move {
            for item in items {
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });
        stream
    }

    /// Receive the next item; `None` once the stream has completed or
    /// delivered its error.
    pub async fn next(&mut self) -> Option<Result<T>> {
        if self.failed {
            return None;
        }
        let item = self.receiver.recv().await?;
        if item.is_err() {
            self.failed = true;
            self.receiver.close();
        }
        Some(item)
    }

    /// Apply `mapper` on a new stage task.
    pub fn pipe<M>(self, mapper: M) -> Stream<M::Output>
    where
        M: Mapper<T> + 'static,
        M::Output: 'static,
    {
        let (tx, out) = channel(format!("{}.pipe", self.name), DEFAULT_CAPACITY);
        let mut input = self;
        let mut mapper = mapper;
        tokio::spawn(async move {
            while let Some(item) = input.next().await {
                let outputs = match item {
                    Ok(value) => mapper.on_next(value),
                    Err(e) => Err(e),
                };
                match outputs {
                    Ok(values) => {
                        for value in values {
                            if tx.send(value).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(stream = %tx.name, error = %e, "Stage terminated");
                        let _ = tx.send_error(e).await;
                        return;
                    }
                }
            }
            match mapper.on_complete() {
                Ok(values) => {
                    for value in values {
                        if tx.send(value).await.is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send_error(e).await;
                }
            }
        });
        out
    }

    /// Interleave several streams. Order is kept within each input only.
    /// The first error from any input ends the merged stream.
    pub fn merge(name: impl Into<String>, streams: Vec<Stream<T>>) -> Stream<T> {
        let (tx, out) = channel(name, DEFAULT_CAPACITY);
        for mut input in streams {
            let tx = tx.clone();
            tokio::spawn(async move {
                while let Some(item) = input.next().await {
                    let sent = match item {
                        Ok(value) => tx.send(value).await,
                        Err(e) => tx.send_error(e).await,
                    };
                    if sent.is_err() {
                        break;
                    }
                }
            });
        }
        out
    }

    /// Drain every value, stopping at the first error.
    pub async fn collect(mut self) -> Result<Vec<T>> {
        let mut values = Vec::new();
        while let Some(item) = self.next().await {
            values.push(item?);
        }
        Ok(values)
    }

    /// Deliver the stream to `sink` and return once it has completed.
    ///
    /// On error, whether from upstream or from the sink itself, the sink
    /// receives `on_error` followed by `close`, and the error is returned.
    pub async fn run<S>(mut self, sink: &S) -> Result<()>
    where
        S: Sink<T> + ?Sized,
        T: Sync,
    {
        while let Some(item) = self.next().await {
            let delivered = match item {
                Ok(value) => sink.send(&value).await,
                Err(e) => Err(e),
            };
            if let Err(e) = delivered {
                return abort::<T, _>(sink, e).await;
            }
        }
        sink.close().await
    }

    /// Deliver the stream to `sink` from a background task.
    pub fn subscribe<S>(self, sink: S) -> Subscription
    where
        S: Sink<T> + 'static,
        T: Sync,
    {
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
        let mut stream = self;
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = &mut cancel_rx => {
                        debug!(stream = %stream.name, "Subscription disposed");
                        drop(stream);
                        return sink.close().await;
                    }
                    item = stream.next() => {
                        let delivered = match item {
                            Some(Ok(value)) => sink.send(&value).await,
                            Some(Err(e)) => Err(e),
                            None => return sink.close().await,
                        };
                        if let Err(e) = delivered {
                            return abort::<T, _>(&sink, e).await;
                        }
                    }
                }
            }
        });
        Subscription {
            cancel: Some(cancel_tx),
            handle,
        }
    }
}

/// Report `err` to `sink`, close it and return the error.
async fn abort<T, S>(sink: &S, err: MiningError) -> Result<()>
where
    T: Send + Sync,
    S: Sink<T> + ?Sized,
{
    sink.on_error(&err).await?;
    sink.close().await?;
    Err(err)
}

/// Handle of a background subscription.
pub struct Subscription {
    cancel: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<()>>,
}

impl Subscription {
    /// Stop delivery, close the sink and release the upstream stages.
    pub async fn dispose(mut self) -> Result<()> {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        self.join_handle().await
    }

    /// Wait for the stream to complete on its own.
    pub async fn join(self) -> Result<()> {
        self.join_handle().await
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    async fn join_handle(self) -> Result<()> {
        // Keep the cancel sender alive until the task ends.
        let _cancel = self.cancel;
        self.handle
            .await
            .map_err(|e| MiningError::io(format!("subscription task failed: {}", e)))?
    }
}
