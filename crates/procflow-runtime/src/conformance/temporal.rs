//! Streaming temporal-profile conformance.

use crate::case_cache::CaseCache;
use crate::mapper::Mapper;
use chrono::{DateTime, Utc};
use procflow_core::temporal::TemporalDeviation;
use procflow_core::{CaseEvent, MiningError, Result, TemporalProfile};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalConfig {
    /// Allowed distance from the mean, in standard deviations.
    pub zeta: f64,
    pub max_cases: usize,
    /// Earlier events per case compared with each new one.
    pub max_history: usize,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            zeta: 6.0,
            max_cases: 10_000,
            max_history: 64,
        }
    }
}

/// Deviations found for one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalDiagnostic {
    pub case_id: String,
    pub activity: String,
    pub timestamp: DateTime<Utc>,
    pub event_index: u64,
    pub deviations: Vec<TemporalDeviation>,
}

impl TemporalDiagnostic {
    pub fn is_conforming(&self) -> bool {
        self.deviations.is_empty()
    }
}

pub struct TemporalChecker {
    profile: TemporalProfile,
    config: TemporalConfig,
    history: CaseCache<VecDeque<(Arc<str>, DateTime<Utc>)>>,
    processed: u64,
}

impl TemporalChecker {
    pub fn new(profile: TemporalProfile, config: TemporalConfig) -> Result<Self> {
        if !(config.zeta.is_finite() && config.zeta >= 0.0) {
            return Err(MiningError::config(format!(
                "zeta must be a non-negative number, got {}",
                config.zeta
            )));
        }
        if config.max_history == 0 {
            return Err(MiningError::config("max_history must be at least 1"));
        }
        Ok(Self {
            profile,
            history: CaseCache::new(config.max_cases)?,
            config,
            processed: 0,
        })
    }

    pub fn profile(&self) -> &TemporalProfile {
        &self.profile
    }

    /// Compare the event with every remembered earlier event of its case.
    pub fn observe<E: CaseEvent + ?Sized>(&mut self, event: &E) -> Result<TemporalDiagnostic> {
        let (case_id, activity) = event.require_case_and_activity()?;
        let timestamp = event.timestamp();
        self.processed += 1;

        let mut deviations = Vec::new();
        match self.history.get_mut(case_id) {
            Some(history) => {
                for (earlier, at) in history.iter() {
                    let elapsed = (timestamp - *at).num_milliseconds() as f64 / 1000.0;
                    if let Some(deviation) =
                        self.profile
                            .deviation(earlier, activity, elapsed, self.config.zeta)
                    {
                        deviations.push(deviation);
                    }
                }
                if history.len() >= self.config.max_history {
                    history.pop_front();
                }
                history.push_back((Arc::from(activity), timestamp));
            }
            None => {
                let history = VecDeque::from([(Arc::from(activity), timestamp)]);
                if let Some((evicted, _)) = self.history.insert(case_id, history) {
                    debug!(case_id = %evicted, "Temporal history evicted");
                }
            }
        }

        Ok(TemporalDiagnostic {
            case_id: case_id.to_string(),
            activity: activity.to_string(),
            timestamp,
            event_index: self.processed,
            deviations,
        })
    }
}

impl<E: CaseEvent + Send> Mapper<E> for TemporalChecker {
    type Output = TemporalDiagnostic;

    fn on_next(&mut self, event: E) -> Result<Vec<TemporalDiagnostic>> {
        Ok(vec![self.observe(&event)?])
    }
}
