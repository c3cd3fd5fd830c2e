//! Behavioral conformance checking against `(B, P, F)`.

use crate::case_cache::CaseCache;
use crate::mapper::Mapper;
use indexmap::IndexSet;
use procflow_core::{ActivityPair, CaseEvent, ReferenceModel, ReferenceModelBuilder, Result};
use rustc_hash::{FxBuildHasher, FxHashMap};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Completeness and confidence after an illegal relation.
pub const UNDEFINED: f64 = -1.0;

/// Result for one event of a case, emitted from the second event on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConformanceStatus {
    pub case_id: String,
    /// 1-based index of the event in the checked stream.
    pub event_index: u64,
    pub conformance: f64,
    /// In `[0, 1]`, or [`UNDEFINED`].
    pub completeness: f64,
    /// In `[0, 1]`, or [`UNDEFINED`].
    pub confidence: f64,
}

impl ConformanceStatus {
    /// Whether the relation closing this event is in `B`.
    pub fn is_legal(&self) -> bool {
        self.completeness != UNDEFINED
    }
}

#[derive(Debug)]
struct CaseState {
    last_activity: Arc<str>,
    observed: IndexSet<ActivityPair, FxBuildHasher>,
    incorrect: u64,
}

pub struct BehavioralChecker {
    model: ReferenceModel,
    cases: CaseCache<CaseState>,
    processed: u64,
}

impl BehavioralChecker {
    pub fn new(model: ReferenceModel, max_cases: usize) -> Result<Self> {
        Ok(Self {
            model,
            cases: CaseCache::new(max_cases)?,
            processed: 0,
        })
    }

    pub fn model(&self) -> &ReferenceModel {
        &self.model
    }

    pub fn tracked_cases(&self) -> usize {
        self.cases.len()
    }

    pub fn observe<E: CaseEvent + ?Sized>(&mut self, event: &E) -> Result<Option<ConformanceStatus>> {
        let (case_id, activity) = event.require_case_and_activity()?;
        self.processed += 1;

        let Some(state) = self.cases.get_mut(case_id) else {
            let fresh = CaseState {
                last_activity: Arc::from(activity),
                observed: IndexSet::with_hasher(FxBuildHasher),
                incorrect: 0,
            };
            if let Some((evicted, _)) = self.cases.insert(case_id, fresh) {
                debug!(case_id = %evicted, "Conformance state evicted");
            }
            return Ok(None);
        };

        let pair = (state.last_activity.to_string(), activity.to_string());
        let legal = self.model.relations.contains(&pair);
        if legal {
            state.observed.insert(pair.clone());
        } else {
            state.incorrect += 1;
        }

        let observed = state.observed.len() as u64;
        let conformance = observed as f64 / (observed + state.incorrect) as f64;
        let (completeness, confidence) = if legal {
            (
                completeness(&self.model, &pair, observed),
                confidence(&self.model, &pair),
            )
        } else {
            (UNDEFINED, UNDEFINED)
        };
        state.last_activity = Arc::from(activity);

        Ok(Some(ConformanceStatus {
            case_id: case_id.to_string(),
            event_index: self.processed,
            conformance,
            completeness,
            confidence,
        }))
    }
}

/// 1 inside `P[pair]`, otherwise the share of the minimum walked so far.
/// A relation without bounds (unreachable from a start) counts as complete.
fn completeness(model: &ReferenceModel, pair: &ActivityPair, observed: u64) -> f64 {
    match model.path_bounds.get(pair) {
        Some(bounds) if bounds.contains(observed as u32) => 1.0,
        Some(bounds) => (observed as f64 / (bounds.min as f64 + 1.0)).min(1.0),
        None => 1.0,
    }
}

/// `1 − F[pair] / F_max`; 0 when no end is reachable.
fn confidence(model: &ReferenceModel, pair: &ActivityPair) -> f64 {
    let Some(distance) = model.distance_to_end.get(pair).copied().flatten() else {
        return 0.0;
    };
    if model.max_distance_to_end == 0 {
        return 1.0;
    }
    (1.0 - distance as f64 / model.max_distance_to_end as f64).clamp(0.0, 1.0)
}

impl<E: CaseEvent + Send> Mapper<E> for BehavioralChecker {
    type Output = ConformanceStatus;

    fn on_next(&mut self, event: E) -> Result<Vec<ConformanceStatus>> {
        Ok(self.observe(&event)?.into_iter().collect())
    }
}

/// Learns a reference model from a training stream and emits it once the
/// stream completes. Each case's first activity is a start, its last one
/// an end.
pub struct ReferenceBuilder {
    builder: ReferenceModelBuilder,
    last: FxHashMap<Arc<str>, Arc<str>>,
}

impl ReferenceBuilder {
    pub fn new(max_path_depth: usize) -> Self {
        Self {
            builder: ReferenceModelBuilder::new(max_path_depth),
            last: FxHashMap::default(),
        }
    }

    pub fn observe<E: CaseEvent + ?Sized>(&mut self, event: &E) -> Result<()> {
        let (case_id, activity) = event.require_case_and_activity()?;
        match self.last.get_mut(case_id) {
            Some(last) => {
                self.builder.add_relation(last.as_ref(), activity);
                *last = Arc::from(activity);
            }
            None => {
                self.builder.add_start(activity);
                self.last.insert(Arc::from(case_id), Arc::from(activity));
            }
        }
        Ok(())
    }

    pub fn build(&mut self) -> ReferenceModel {
        for activity in self.last.values() {
            self.builder.add_end(activity);
        }
        let model = self.builder.build();
        debug!(
            cases = self.last.len(),
            relations = model.len(),
            "Reference model built"
        );
        model
    }
}

impl<E: CaseEvent + Send> Mapper<E> for ReferenceBuilder {
    type Output = ReferenceModel;

    fn on_next(&mut self, event: E) -> Result<Vec<ReferenceModel>> {
        self.observe(&event)?;
        Ok(Vec::new())
    }

    fn on_complete(&mut self) -> Result<Vec<ReferenceModel>> {
        Ok(vec![self.build()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procflow_core::{Event, PathBounds};
    use std::collections::{BTreeMap, BTreeSet};

    fn pair(a: &str, b: &str) -> ActivityPair {
        (a.to_string(), b.to_string())
    }

    fn reference() -> ReferenceModel {
        ReferenceModel::from_parts(
            BTreeSet::from([pair("A", "B"), pair("B", "C")]),
            BTreeMap::from([
                (pair("A", "B"), PathBounds::new(1, 1)),
                (pair("B", "C"), PathBounds::new(2, 2)),
            ]),
            BTreeMap::from([(pair("A", "B"), Some(1)), (pair("B", "C"), Some(0))]),
        )
    }

    fn replay(checker: &mut BehavioralChecker, case: &str, trace: &str) -> Vec<Option<ConformanceStatus>> {
        trace
            .split_whitespace()
            .map(|a| checker.observe(&Event::new(case, a)).unwrap())
            .collect()
    }

    #[test]
    fn test_single_case_replay() {
        let mut checker = BehavioralChecker::new(reference(), 100).unwrap();
        let results = replay(&mut checker, "c1", "A B C X C");

        assert!(results[0].is_none());
        let statuses: Vec<ConformanceStatus> = results.into_iter().flatten().collect();
        let observed: Vec<(f64, f64, f64)> = statuses
            .iter()
            .map(|s| (s.conformance, s.completeness, s.confidence))
            .collect();
        assert_eq!(
            observed,
            vec![
                (1.0, 1.0, 0.0),
                (1.0, 1.0, 1.0),
                (2.0 / 3.0, UNDEFINED, UNDEFINED),
                (0.5, UNDEFINED, UNDEFINED),
            ]
        );
        assert_eq!(statuses[3].event_index, 5);
        assert!(!statuses[2].is_legal());
    }

    #[test]
    fn test_completeness_below_minimum() {
        let model = ReferenceModel::from_parts(
            BTreeSet::from([pair("B", "C")]),
            BTreeMap::from([(pair("B", "C"), PathBounds::new(3, 4))]),
            BTreeMap::from([(pair("B", "C"), Some(0))]),
        );
        let mut checker = BehavioralChecker::new(model, 10).unwrap();
        let status = replay(&mut checker, "c1", "B C").pop().flatten().unwrap();
        assert_eq!(status.completeness, 0.25);
        assert_eq!(status.confidence, 1.0);
    }

    #[test]
    fn test_repeated_relation_counted_once() {
        let model = ReferenceModel::from_parts(
            BTreeSet::from([pair("A", "A")]),
            BTreeMap::new(),
            BTreeMap::from([(pair("A", "A"), None)]),
        );
        let mut checker = BehavioralChecker::new(model, 10).unwrap();
        let status = replay(&mut checker, "c1", "A A A A").pop().flatten().unwrap();
        assert_eq!(status.conformance, 1.0);
        assert_eq!(status.completeness, 1.0);
        assert_eq!(status.confidence, 0.0);
    }

    #[test]
    fn test_cases_are_independent() {
        let mut checker = BehavioralChecker::new(reference(), 10).unwrap();
        checker.observe(&Event::new("c1", "A")).unwrap();
        assert!(checker.observe(&Event::new("c2", "B")).unwrap().is_none());
        let status = checker.observe(&Event::new("c1", "B")).unwrap().unwrap();
        assert_eq!(status.case_id, "c1");
        assert_eq!(status.conformance, 1.0);
    }

    #[test]
    fn test_evicted_case_starts_over() {
        let mut checker = BehavioralChecker::new(reference(), 1).unwrap();
        checker.observe(&Event::new("c1", "A")).unwrap();
        checker.observe(&Event::new("c2", "A")).unwrap();
        assert_eq!(checker.tracked_cases(), 1);
        assert!(checker.observe(&Event::new("c1", "B")).unwrap().is_none());
    }

    #[test]
    fn test_missing_case_id_rejected() {
        let mut checker = BehavioralChecker::new(reference(), 10).unwrap();
        assert!(checker.observe(&Event::new("", "A")).is_err());
    }

    #[test]
    fn test_builder_from_stream() {
        let mut builder = ReferenceBuilder::new(5);
        for (case, trace) in [("c1", "A B C"), ("c2", "A C")] {
            for activity in trace.split_whitespace() {
                builder.on_next(Event::new(case, activity)).unwrap();
            }
        }
        let models = Mapper::<Event>::on_complete(&mut builder).unwrap();
        let model = &models[0];

        assert_eq!(model.len(), 3);
        assert!(model.contains("A", "C"));
        assert_eq!(model.path_bounds("B", "C"), Some(PathBounds::new(2, 2)));
        assert_eq!(model.distance_to_end("A", "B"), Some(1));
        assert_eq!(model.distance_to_end("B", "C"), Some(0));
    }
}
