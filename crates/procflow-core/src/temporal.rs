//! Temporal profiles: elapsed-time statistics between activity pairs.
//!
//! For every pair `(a, b)` where `b` eventually follows `a` in a case, the
//! profile keeps the mean and standard deviation of the time between them.
//! An observed delay deviates when `|Δ − mean| > ζ·std`.

use crate::dfg::ActivityPair;
use crate::error::Result;
use crate::event::CaseEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Running count, mean and variance of delays in seconds (Welford).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PairStatistics {
    pub count: u64,
    pub mean: f64,
    m2: f64,
}

impl PairStatistics {
    pub fn observe(&mut self, seconds: f64) {
        self.count += 1;
        let delta = seconds - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (seconds - self.mean);
    }

    /// Sample standard deviation; 0 below two observations.
    pub fn std_dev(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        (self.m2 / (self.count - 1) as f64).sqrt()
    }
}

/// A delay outside `mean ± ζ·std`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalDeviation {
    pub source: String,
    pub target: String,
    pub observed: f64,
    pub mean: f64,
    pub std_dev: f64,
    /// `|observed − mean| / std`; infinite when the profile has no spread.
    pub zeta: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemporalProfile {
    #[serde(with = "crate::serde_pairs")]
    pub pairs: BTreeMap<ActivityPair, PairStatistics>,
}

pub(crate) fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

impl TemporalProfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every eventually-follows pair of one trace.
    pub fn observe_trace<S: AsRef<str>>(&mut self, trace: &[(S, DateTime<Utc>)]) {
        for (i, (a, ta)) in trace.iter().enumerate() {
            for (b, tb) in &trace[i + 1..] {
                self.pairs
                    .entry((a.as_ref().to_string(), b.as_ref().to_string()))
                    .or_default()
                    .observe(seconds_between(*ta, *tb));
            }
        }
    }

    /// Discover a profile from a finite log. Events are grouped by case in
    /// input order and sorted by timestamp within the case.
    pub fn discover<E: CaseEvent>(events: &[E]) -> Result<Self> {
        let mut traces: BTreeMap<&str, Vec<(&str, DateTime<Utc>)>> = BTreeMap::new();
        for event in events {
            let (case_id, activity) = event.require_case_and_activity()?;
            traces
                .entry(case_id)
                .or_default()
                .push((activity, event.timestamp()));
        }
        let mut profile = TemporalProfile::new();
        for trace in traces.values_mut() {
            trace.sort_by_key(|(_, ts)| *ts);
            profile.observe_trace(trace);
        }
        Ok(profile)
    }

    pub fn get(&self, source: &str, target: &str) -> Option<&PairStatistics> {
        self.pairs.get(&(source.to_string(), target.to_string()))
    }

    /// Check one observed delay against the profile.
    pub fn deviation(
        &self,
        source: &str,
        target: &str,
        observed: f64,
        zeta: f64,
    ) -> Option<TemporalDeviation> {
        let stats = self.get(source, target)?;
        let std_dev = stats.std_dev();
        let distance = (observed - stats.mean).abs();
        if distance <= zeta * std_dev {
            return None;
        }
        Some(TemporalDeviation {
            source: source.to_string(),
            target: target.to_string(),
            observed,
            mean: stats.mean,
            std_dev,
            zeta: if std_dev > 0.0 {
                distance / std_dev
            } else {
                f64::INFINITY
            },
        })
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
