//! Object-centric directly-follows graph (OCDFG)

use crate::dfg::{ActivityPair, Dfg};
use crate::event::ObjectCentricEvent;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One DFG per object type, with per-type start and end activities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ocdfg {
    pub activities: BTreeSet<String>,
    pub object_types: BTreeSet<String>,
    #[serde(with = "crate::serde_pairs::nested")]
    pub edges: BTreeMap<String, BTreeMap<ActivityPair, u64>>,
    pub start_activities: BTreeMap<String, BTreeSet<String>>,
    pub end_activities: BTreeMap<String, BTreeSet<String>>,
}

impl Ocdfg {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the DFG of one object type and recompute its
    /// start and end activities.
    ///
    /// Start activities are `sources \ targets` and end activities
    /// `targets \ sources`, so an activity on a self-loop is in neither.
    pub fn insert_type(&mut self, object_type: &str, dfg: &Dfg) {
        let mut sources = BTreeSet::new();
        let mut targets = BTreeSet::new();
        let mut edges = BTreeMap::new();
        for ((a, b), frequency) in dfg.edges() {
            sources.insert(a.clone());
            targets.insert(b.clone());
            self.activities.insert(a.clone());
            self.activities.insert(b.clone());
            edges.insert((a.clone(), b.clone()), frequency);
        }
        let start = sources.difference(&targets).cloned().collect();
        let end = targets.difference(&sources).cloned().collect();

        self.object_types.insert(object_type.to_string());
        self.edges.insert(object_type.to_string(), edges);
        self.start_activities.insert(object_type.to_string(), start);
        self.end_activities.insert(object_type.to_string(), end);
    }

    pub fn type_dfg(&self, object_type: &str) -> Option<Dfg> {
        self.edges
            .get(object_type)
            .map(|edges| edges.iter().map(|(k, v)| (k.clone(), *v)).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.object_types.is_empty()
    }

    /// Exact offline discovery: per object, consecutive events (by timestamp,
    /// stable on input order) form directly-follows edges of the object's type.
    pub fn discover(events: &[ObjectCentricEvent]) -> Self {
        let mut ordered: Vec<&ObjectCentricEvent> = events.iter().collect();
        ordered.sort_by_key(|e| e.timestamp);

        let mut last: BTreeMap<(&str, &str), &str> = BTreeMap::new();
        let mut per_type: BTreeMap<String, Dfg> = BTreeMap::new();
        for event in ordered {
            for (object_type, ids) in &event.omap {
                let dfg = per_type.entry(object_type.clone()).or_default();
                for id in ids {
                    let key = (object_type.as_str(), id.as_str());
                    if let Some(prev) = last.insert(key, event.activity.as_ref()) {
                        dfg.add(prev, &event.activity, 1);
                    }
                }
            }
        }

        let mut ocdfg = Ocdfg::new();
        for (object_type, dfg) in per_type {
            ocdfg.insert_type(&object_type, &dfg);
        }
        ocdfg
    }

    /// Every edge endpoint is an activity, and no activity is both start and
    /// end of the same type.
    pub fn is_consistent(&self) -> bool {
        let endpoints_ok = self.edges.values().all(|edges| {
            edges
                .keys()
                .all(|(a, b)| self.activities.contains(a) && self.activities.contains(b))
        });
        let disjoint = self.start_activities.iter().all(|(t, start)| {
            self.end_activities
                .get(t)
                .map_or(true, |end| start.is_disjoint(end))
        });
        endpoints_ok && disjoint
    }
}
