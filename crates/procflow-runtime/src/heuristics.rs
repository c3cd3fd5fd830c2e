//! Streaming Heuristics Miner.
//!
//! Two lossy tables share one bucket clock:
//!
//! - `C`: case id → last activity and time
//! - `R`: `(a, b)` → directly-follows count and mean delay
//!
//! Both are swept together at every bucket boundary (ε mode) or when their
//! combined size would exceed the budget (budget mode). Every
//! `update_every` events the miner emits a [`HeuristicsNet`] derived from
//! `R` with the timing projected out.

use crate::lossy::{BucketClock, Capacity, LossyTable};
use crate::mapper::Mapper;
use chrono::{DateTime, Utc};
use procflow_core::error::check_unit_interval;
use procflow_core::{
    ActivityPair, CaseEvent, Dfg, HeuristicsNet, HeuristicsThresholds, MiningError, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Parameters of one miner instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinerConfig {
    pub capacity: Capacity,
    pub dependency_threshold: f64,
    pub and_threshold: f64,
    pub update_every: u64,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            capacity: Capacity::Epsilon(0.01),
            dependency_threshold: 0.5,
            and_threshold: 0.65,
            update_every: 1,
        }
    }
}

impl MinerConfig {
    pub fn validate(&self) -> Result<()> {
        self.capacity.validate()?;
        check_unit_interval("dependency_threshold", self.dependency_threshold)?;
        check_unit_interval("and_threshold", self.and_threshold)?;
        if self.update_every == 0 {
            return Err(MiningError::config("update_every must be at least 1"));
        }
        Ok(())
    }

    pub fn thresholds(&self) -> HeuristicsThresholds {
        HeuristicsThresholds {
            dependency: self.dependency_threshold,
            and: self.and_threshold,
        }
    }
}

#[derive(Debug, Clone)]
struct CaseState {
    last_activity: Arc<str>,
    last_time: DateTime<Utc>,
}

pub struct HeuristicsMiner {
    config: MinerConfig,
    clock: BucketClock,
    cases: LossyTable<Arc<str>, CaseState>,
    /// Mean delay in seconds per relation.
    relations: LossyTable<ActivityPair, f64>,
}

impl HeuristicsMiner {
    pub fn new(config: MinerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            clock: BucketClock::new(config.capacity)?,
            config,
            cases: LossyTable::new(),
            relations: LossyTable::new(),
        })
    }

    pub fn config(&self) -> &MinerConfig {
        &self.config
    }

    /// Number of events processed so far.
    pub fn observed(&self) -> u64 {
        self.clock.observed()
    }

    pub fn bucket(&self) -> u64 {
        self.clock.bucket()
    }

    pub fn tracked_cases(&self) -> usize {
        self.cases.len()
    }

    pub fn tracked_relations(&self) -> usize {
        self.relations.len()
    }

    /// Current directly-follows counts.
    pub fn dfg(&self) -> Dfg {
        self.relations
            .iter()
            .map(|(pair, entry)| (pair.clone(), entry.count))
            .collect()
    }

    /// Mean delay in seconds between the activities of each relation.
    pub fn performance(&self) -> BTreeMap<ActivityPair, f64> {
        self.relations
            .iter()
            .map(|(pair, entry)| (pair.clone(), entry.value))
            .collect()
    }

    pub fn net(&self) -> HeuristicsNet {
        HeuristicsNet::from_dfg(&self.dfg(), self.config.thresholds(), self.observed())
    }

    /// Make room for one new entry under a budget.
    fn reserve(&mut self) {
        let Some(budget) = self.clock.budget() else {
            return;
        };
        while self.cases.len() + self.relations.len() >= budget {
            self.clock.advance();
            self.sweep();
        }
    }

    fn sweep(&mut self) {
        let bucket = self.clock.bucket();
        let cases = self.cases.sweep(bucket).len();
        let relations = self.relations.sweep(bucket).len();
        debug!(
            bucket,
            evicted_cases = cases,
            evicted_relations = relations,
            "Heuristics miner sweep"
        );
    }

    /// Feed one event; returns a net when one is due.
    pub fn observe<E: CaseEvent + ?Sized>(&mut self, event: &E) -> Result<Option<HeuristicsNet>> {
        let (case_id, activity) = event.require_case_and_activity()?;
        let timestamp = event.timestamp();
        self.clock.tick();

        let previous = self.cases.get(case_id).map(|entry| entry.value.clone());
        if let Some(CaseState {
            last_activity,
            last_time,
        }) = previous
        {
            let delay = (timestamp - last_time).num_milliseconds() as f64 / 1000.0;
            let pair = (last_activity.to_string(), activity.to_string());
            if let Some(entry) = self.relations.get_mut(&pair) {
                entry.count += 1;
                entry.value += (delay - entry.value) / entry.count as f64;
            } else {
                self.reserve();
                let delta = self.clock.insertion_delta();
                self.relations.insert(pair, delay, delta);
            }
        }

        let state = CaseState {
            last_activity: Arc::from(activity),
            last_time: timestamp,
        };
        if let Some(entry) = self.cases.get_mut(case_id) {
            entry.count += 1;
            entry.value = state;
        } else {
            self.reserve();
            let delta = self.clock.insertion_delta();
            self.cases.insert(Arc::from(case_id), state, delta);
        }

        if self.clock.at_boundary() {
            self.sweep();
        }

        if self.clock.observed() % self.config.update_every == 0 {
            Ok(Some(self.net()))
        } else {
            Ok(None)
        }
    }
}

impl<E: CaseEvent + Send> Mapper<E> for HeuristicsMiner {
    type Output = HeuristicsNet;

    fn on_next(&mut self, event: E) -> Result<Vec<HeuristicsNet>> {
        Ok(self.observe(&event)?.into_iter().collect())
    }
}
