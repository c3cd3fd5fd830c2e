//! Soft conformance: replaying cases on a normalized PDFA.
//!
//! Every case keeps the product and negative log of the transition
//! probabilities it took, plus their running mean. The soft conformance of
//! a case is that mean divided by the best transition score the normalized
//! automaton can give, `α + (1 − α)/|nodes|`.

use crate::case_cache::CaseCache;
use crate::mapper::Mapper;
use procflow_core::{CaseEvent, MiningError, Pdfa, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftConfig {
    /// Weight factor `α ∈ (0, 1]` used to normalize the automaton.
    pub alpha: f64,
    pub max_cases_to_store: usize,
    /// Emit the full report every this many events.
    pub results_refresh_rate: u64,
}

impl Default for SoftConfig {
    fn default() -> Self {
        Self {
            alpha: 0.9,
            max_cases_to_store: 10_000,
            results_refresh_rate: 1,
        }
    }
}

/// Replay state of one case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftStatus {
    pub last_activity: String,
    /// Probability of the last transition; `None` before the second event.
    pub last_probability: Option<f64>,
    pub probability: f64,
    /// `Σ −ln p`; infinite once the case took an impossible transition.
    pub log_probability: f64,
    pub mean_probability: f64,
    pub transitions: u64,
    /// `mean / best`; `None` before the second event.
    pub soft_conformance: Option<f64>,
}

impl SoftStatus {
    fn start(activity: &str) -> Self {
        Self {
            last_activity: activity.to_string(),
            last_probability: None,
            probability: 1.0,
            log_probability: 0.0,
            mean_probability: 0.0,
            transitions: 0,
            soft_conformance: None,
        }
    }

    fn step(&mut self, activity: &str, p: f64, best: f64) {
        self.transitions += 1;
        self.last_probability = Some(p);
        self.probability *= p;
        self.log_probability += if p > 0.0 { -p.ln() } else { f64::INFINITY };
        self.mean_probability += (p - self.mean_probability) / self.transitions as f64;
        self.soft_conformance = Some(self.mean_probability / best);
        self.last_activity = activity.to_string();
    }
}

/// Snapshot of every tracked case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftReport {
    pub processed: u64,
    pub cases: BTreeMap<String, SoftStatus>,
}

pub struct SoftConformance {
    pdfa: Pdfa,
    best: f64,
    config: SoftConfig,
    cases: CaseCache<SoftStatus>,
    processed: u64,
}

impl SoftConformance {
    /// Normalize `pdfa` with `config.alpha` and start tracking.
    pub fn new(pdfa: &Pdfa, config: SoftConfig) -> Result<Self> {
        if config.results_refresh_rate == 0 {
            return Err(MiningError::config("results_refresh_rate must be at least 1"));
        }
        let pdfa = pdfa.normalize(config.alpha)?;
        Ok(Self {
            best: pdfa.best_score(),
            cases: CaseCache::new(config.max_cases_to_store)?,
            pdfa,
            config,
            processed: 0,
        })
    }

    /// The normalized automaton.
    pub fn pdfa(&self) -> &Pdfa {
        &self.pdfa
    }

    pub fn status(&self, case_id: &str) -> Option<&SoftStatus> {
        self.cases.peek(case_id)
    }

    pub fn report(&self) -> SoftReport {
        SoftReport {
            processed: self.processed,
            cases: self
                .cases
                .iter()
                .map(|(case, status)| (case.to_string(), status.clone()))
                .collect(),
        }
    }

    pub fn observe<E: CaseEvent + ?Sized>(&mut self, event: &E) -> Result<Option<SoftReport>> {
        let (case_id, activity) = event.require_case_and_activity()?;
        self.processed += 1;

        match self.cases.get_mut(case_id) {
            Some(status) => {
                let p = self.pdfa.probability(&status.last_activity, activity);
                status.step(activity, p, self.best);
            }
            None => {
                if let Some((evicted, _)) = self.cases.insert(case_id, SoftStatus::start(activity)) {
                    debug!(case_id = %evicted, "Soft conformance state evicted");
                }
            }
        }

        if self.processed % self.config.results_refresh_rate == 0 {
            Ok(Some(self.report()))
        } else {
            Ok(None)
        }
    }
}

impl<E: CaseEvent + Send> Mapper<E> for SoftConformance {
    type Output = SoftReport;

    fn on_next(&mut self, event: E) -> Result<Vec<SoftReport>> {
        Ok(self.observe(&event)?.into_iter().collect())
    }
}
