//! Lossy counting (Manku & Motwani) with an error-bounded and a
//! budget-bounded variant.
//!
//! The stream is cut into buckets of `w = ⌈1/ε⌉` observations; the current
//! bucket is `b = ⌈N/w⌉`. A new element enters with `Δ = b − 1` and at
//! every bucket boundary each entry with `count + Δ ≤ b` is dropped. A
//! surviving estimate undercounts by at most `ε·N`.
//!
//! In budget mode the table never holds more than `B` entries: before an
//! insertion that would exceed it, the bucket is advanced and swept until
//! room is made.

use procflow_core::error::check_epsilon;
use procflow_core::{FxIndexMap, MiningError, Result};
use rustc_hash::FxBuildHasher;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::hash::Hash;
use tracing::debug;

/// How an estimator bounds its memory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capacity {
    /// Maximum approximation error `ε ∈ (0, 1)`.
    Epsilon(f64),
    /// Maximum number of entries.
    Budget(usize),
}

impl Capacity {
    pub fn validate(&self) -> Result<()> {
        match *self {
            Capacity::Epsilon(epsilon) => check_epsilon("epsilon", epsilon).map(|_| ()),
            Capacity::Budget(0) => Err(MiningError::config("budget must be at least 1")),
            Capacity::Budget(_) => Ok(()),
        }
    }
}

impl Default for Capacity {
    fn default() -> Self {
        Capacity::Epsilon(0.01)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    ErrorBounded { width: u64 },
    Budget { budget: usize },
}

/// Observation counter and bucket id shared by one or more tables.
#[derive(Debug, Clone)]
pub struct BucketClock {
    mode: Mode,
    observed: u64,
    bucket: u64,
}

impl BucketClock {
    pub fn new(capacity: Capacity) -> Result<Self> {
        capacity.validate()?;
        let mode = match capacity {
            Capacity::Epsilon(epsilon) => Mode::ErrorBounded {
                width: (1.0 / epsilon).ceil() as u64,
            },
            Capacity::Budget(budget) => Mode::Budget { budget },
        };
        Ok(Self {
            mode,
            observed: 0,
            bucket: 0,
        })
    }

    /// Count one observation and return the current bucket.
    pub fn tick(&mut self) -> u64 {
        self.observed += 1;
        if let Mode::ErrorBounded { width } = self.mode {
            self.bucket = self.observed.div_ceil(width);
        }
        self.bucket
    }

    /// `Δ` for an entry inserted now.
    pub fn insertion_delta(&self) -> u64 {
        self.bucket.saturating_sub(1)
    }

    /// Error-bounded mode only: the last tick closed a bucket.
    pub fn at_boundary(&self) -> bool {
        match self.mode {
            Mode::ErrorBounded { width } => self.observed > 0 && self.observed % width == 0,
            Mode::Budget { .. } => false,
        }
    }

    /// Budget mode only: move to the next bucket ahead of a forced sweep.
    pub fn advance(&mut self) -> u64 {
        self.bucket += 1;
        self.bucket
    }

    pub fn bucket(&self) -> u64 {
        self.bucket
    }

    pub fn observed(&self) -> u64 {
        self.observed
    }

    pub fn width(&self) -> Option<u64> {
        match self.mode {
            Mode::ErrorBounded { width } => Some(width),
            Mode::Budget { .. } => None,
        }
    }

    pub fn budget(&self) -> Option<usize> {
        match self.mode {
            Mode::Budget { budget } => Some(budget),
            Mode::ErrorBounded { .. } => None,
        }
    }
}

/// Estimated count `f`, insertion bucket `Δ` and a payload.
#[derive(Debug, Clone, PartialEq)]
pub struct LossyEntry<V> {
    pub value: V,
    pub count: u64,
    pub delta: u64,
}

/// Entries under lossy-counting discipline, in insertion order.
#[derive(Debug, Clone)]
pub struct LossyTable<K, V> {
    entries: FxIndexMap<K, LossyEntry<V>>,
}

impl<K, V> Default for LossyTable<K, V> {
    fn default() -> Self {
        Self {
            entries: FxIndexMap::with_hasher(FxBuildHasher),
        }
    }
}

impl<K: Hash + Eq + Clone, V> LossyTable<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&LossyEntry<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key)
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut LossyEntry<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get_mut(key)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.contains_key(key)
    }

    /// Insert a fresh entry with count 1.
    pub fn insert(&mut self, key: K, value: V, delta: u64) {
        self.entries.insert(
            key,
            LossyEntry {
                value,
                count: 1,
                delta,
            },
        );
    }

    /// Drop every entry with `count + Δ ≤ bucket`, keeping the order of the
    /// rest. Returns the dropped keys.
    pub fn sweep(&mut self, bucket: u64) -> Vec<K> {
        let mut evicted = Vec::new();
        self.entries.retain(|key, entry| {
            let keep = entry.count + entry.delta > bucket;
            if !keep {
                evicted.push(key.clone());
            }
            keep
        });
        evicted
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &LossyEntry<V>)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Frequency estimator over a stream of keys.
#[derive(Debug, Clone)]
pub struct LossyCounter<K> {
    clock: BucketClock,
    table: LossyTable<K, ()>,
}

impl<K: Hash + Eq + Clone> LossyCounter<K> {
    pub fn new(capacity: Capacity) -> Result<Self> {
        Ok(Self {
            clock: BucketClock::new(capacity)?,
            table: LossyTable::new(),
        })
    }

    pub fn with_epsilon(epsilon: f64) -> Result<Self> {
        Self::new(Capacity::Epsilon(epsilon))
    }

    pub fn with_budget(budget: usize) -> Result<Self> {
        Self::new(Capacity::Budget(budget))
    }

    /// Count one occurrence of `key`; returns the keys evicted by this
    /// observation, in insertion order.
    pub fn observe(&mut self, key: K) -> Vec<K> {
        self.tick();
        let mut evicted = self.count(key);
        evicted.extend(self.sweep_if_due());
        evicted
    }

    /// Open a new observation. Keys counted until the next tick all belong
    /// to it, so `N` counts observations rather than keys.
    pub fn tick(&mut self) -> u64 {
        self.clock.tick()
    }

    /// Count `key` within the current observation. In budget mode returns
    /// the keys evicted to make room for it.
    pub fn count(&mut self, key: K) -> Vec<K> {
        let mut evicted = Vec::new();
        if let Some(entry) = self.table.get_mut(&key) {
            entry.count += 1;
            return evicted;
        }
        if let Some(budget) = self.clock.budget() {
            while self.table.len() >= budget {
                self.clock.advance();
                evicted.extend(self.table.sweep(self.clock.bucket()));
            }
            self.log_sweep(&evicted);
        }
        self.table.insert(key, (), self.clock.insertion_delta());
        evicted
    }

    /// Sweep when the current observation closed a bucket.
    pub fn sweep_if_due(&mut self) -> Vec<K> {
        if !self.clock.at_boundary() {
            return Vec::new();
        }
        let evicted = self.table.sweep(self.clock.bucket());
        self.log_sweep(&evicted);
        evicted
    }

    fn log_sweep(&self, evicted: &[K]) {
        if !evicted.is_empty() {
            debug!(
                bucket = self.clock.bucket(),
                evicted = evicted.len(),
                remaining = self.table.len(),
                "Lossy counter sweep"
            );
        }
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.table.contains(key)
    }

    /// Estimated count; 0 for unknown keys.
    pub fn estimate<Q>(&self, key: &Q) -> u64
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.table.get(key).map_or(0, |e| e.count)
    }

    /// Estimate divided by the number of observations.
    pub fn relative_frequency<Q>(&self, key: &Q) -> f64
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.clock.observed() {
            0 => 0.0,
            n => self.estimate(key) as f64 / n as f64,
        }
    }

    pub fn entry<Q>(&self, key: &Q) -> Option<&LossyEntry<()>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.table.get(key)
    }

    /// `(key, estimate)` in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, u64)> {
        self.table.iter().map(|(k, e)| (k, e.count))
    }

    pub fn observed(&self) -> u64 {
        self.clock.observed()
    }

    pub fn bucket(&self) -> u64 {
        self.clock.bucket()
    }

    pub fn width(&self) -> Option<u64> {
        self.clock.width()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
