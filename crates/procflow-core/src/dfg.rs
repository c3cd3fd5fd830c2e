//! Directly-follows graphs and the heuristics nets derived from them.
//!
//! A [`Dfg`] maps `(from, to)` activity pairs to frequencies. A
//! [`HeuristicsNet`] enriches it with the dependency measure
//!
//! ```text
//! dep(a,b) = (|a→b| − |b→a|) / (|a→b| + |b→a| + 1)   if b→a exists
//!          = |a→b| / (|a→b| + 1)                      otherwise
//! ```
//!
//! and, for two successors `b`, `c` of the same `a`, the AND measure
//!
//! ```text
//! and(b,c|a) = (|b→c| + |c→b|) / (|a→b| + |a→c| + 1)
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// `(from, to)` activity pair.
pub type ActivityPair = (String, String);

/// Directly-follows graph: `(from, to) -> frequency`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dfg {
    #[serde(with = "crate::serde_pairs")]
    edges: BTreeMap<ActivityPair, u64>,
}

impl Dfg {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from complete traces; consecutive activities form edges.
    pub fn from_traces<T, S>(traces: &[T]) -> Self
    where
        T: AsRef<[S]>,
        S: AsRef<str>,
    {
        let mut dfg = Dfg::new();
        for trace in traces {
            for window in trace.as_ref().windows(2) {
                dfg.add(window[0].as_ref(), window[1].as_ref(), 1);
            }
        }
        dfg
    }

    /// Add `frequency` to an edge, creating it if absent.
    pub fn add(&mut self, from: &str, to: &str, frequency: u64) {
        *self
            .edges
            .entry((from.to_string(), to.to_string()))
            .or_insert(0) += frequency;
    }

    /// Overwrite an edge frequency.
    pub fn set(&mut self, from: &str, to: &str, frequency: u64) {
        self.edges
            .insert((from.to_string(), to.to_string()), frequency);
    }

    pub fn frequency(&self, from: &str, to: &str) -> u64 {
        // BTreeMap lookups need an owned tuple key.
        self.edges
            .get(&(from.to_string(), to.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn contains(&self, from: &str, to: &str) -> bool {
        self.edges.contains_key(&(from.to_string(), to.to_string()))
    }

    pub fn edges(&self) -> impl Iterator<Item = (&ActivityPair, u64)> {
        self.edges.iter().map(|(k, v)| (k, *v))
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn activities(&self) -> BTreeSet<String> {
        self.edges
            .keys()
            .flat_map(|(a, b)| [a.clone(), b.clone()])
            .collect()
    }

    /// Successors of `activity` in edge order.
    pub fn successors<'a>(&'a self, activity: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.edges
            .keys()
            .filter(move |(a, _)| a == activity)
            .map(|(_, b)| b.as_str())
    }

    /// Activities without incoming edges.
    pub fn start_activities(&self) -> BTreeSet<String> {
        let targets: BTreeSet<&String> = self.edges.keys().map(|(_, b)| b).collect();
        self.activities()
            .into_iter()
            .filter(|a| !targets.contains(a))
            .collect()
    }

    /// Activities without outgoing edges.
    pub fn end_activities(&self) -> BTreeSet<String> {
        let sources: BTreeSet<&String> = self.edges.keys().map(|(a, _)| a).collect();
        self.activities()
            .into_iter()
            .filter(|a| !sources.contains(a))
            .collect()
    }

    /// Dependency measure `dep(a, b)`. Self-loops use the length-one loop
    /// form `|a→a| / (|a→a| + 1)`.
    pub fn dependency(&self, a: &str, b: &str) -> f64 {
        let ab = self.frequency(a, b) as f64;
        if a == b || !self.contains(b, a) {
            return ab / (ab + 1.0);
        }
        let ba = self.frequency(b, a) as f64;
        (ab - ba) / (ab + ba + 1.0)
    }

    /// AND measure of successors `b` and `c` of `a`.
    pub fn and_measure(&self, a: &str, b: &str, c: &str) -> f64 {
        let parallel = (self.frequency(b, c) + self.frequency(c, b)) as f64;
        let split = (self.frequency(a, b) + self.frequency(a, c)) as f64;
        parallel / (split + 1.0)
    }
}

impl FromIterator<(ActivityPair, u64)> for Dfg {
    fn from_iter<I: IntoIterator<Item = (ActivityPair, u64)>>(iter: I) -> Self {
        Self {
            edges: iter.into_iter().collect(),
        }
    }
}

/// Thresholds applied when deriving a heuristics net.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeuristicsThresholds {
    /// Edges with `dep < dependency` are dropped.
    pub dependency: f64,
    /// Sibling pairs with `and >= and` are labelled AND.
    pub and: f64,
}

impl Default for HeuristicsThresholds {
    fn default() -> Self {
        Self {
            dependency: 0.5,
            and: 0.65,
        }
    }
}

/// Label of a split between sibling successors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SplitKind {
    #[default]
    Xor,
    And,
}

/// An edge of the heuristics net.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeuristicsEdge {
    pub frequency: u64,
    pub dependency: f64,
    /// AND when the edge takes part in at least one AND sibling pair.
    pub split: SplitKind,
}

/// AND measure of a sibling pair `(left, right)` following `source`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitMeasure {
    pub source: String,
    pub left: String,
    pub right: String,
    pub measure: f64,
    pub kind: SplitKind,
}

/// A DFG annotated with dependency and AND/XOR measures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeuristicsNet {
    /// Every activity of the underlying DFG, filtered or not.
    pub activities: BTreeSet<String>,
    #[serde(with = "crate::serde_pairs")]
    pub edges: BTreeMap<ActivityPair, HeuristicsEdge>,
    pub splits: Vec<SplitMeasure>,
    pub start_activities: BTreeSet<String>,
    pub end_activities: BTreeSet<String>,
    pub thresholds: HeuristicsThresholds,
    /// Index of the event after which the net was emitted.
    pub emitted_at: u64,
}

impl HeuristicsNet {
    pub fn empty(thresholds: HeuristicsThresholds, emitted_at: u64) -> Self {
        Self {
            activities: BTreeSet::new(),
            edges: BTreeMap::new(),
            splits: Vec::new(),
            start_activities: BTreeSet::new(),
            end_activities: BTreeSet::new(),
            thresholds,
            emitted_at,
        }
    }

    /// Derive the net: measure every edge, drop those under the dependency
    /// threshold, then label sibling pairs of the surviving edges.
    pub fn from_dfg(dfg: &Dfg, thresholds: HeuristicsThresholds, emitted_at: u64) -> Self {
        let mut net = Self::empty(thresholds, emitted_at);
        net.activities = dfg.activities();

        for ((a, b), frequency) in dfg.edges() {
            let dependency = dfg.dependency(a, b);
            if dependency < thresholds.dependency {
                continue;
            }
            net.edges.insert(
                (a.clone(), b.clone()),
                HeuristicsEdge {
                    frequency,
                    dependency,
                    split: SplitKind::Xor,
                },
            );
        }

        let mut successors: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (a, b) in net.edges.keys() {
            if a != b {
                successors.entry(a.as_str()).or_default().push(b.as_str());
            }
        }

        let mut and_edges: BTreeSet<ActivityPair> = BTreeSet::new();
        for (source, targets) in &successors {
            for (i, left) in targets.iter().enumerate() {
                for right in &targets[i + 1..] {
                    let measure = dfg.and_measure(source, left, right);
                    let kind = if measure >= thresholds.and {
                        and_edges.insert((source.to_string(), left.to_string()));
                        and_edges.insert((source.to_string(), right.to_string()));
                        SplitKind::And
                    } else {
                        SplitKind::Xor
                    };
                    net.splits.push(SplitMeasure {
                        source: source.to_string(),
                        left: left.to_string(),
                        right: right.to_string(),
                        measure,
                        kind,
                    });
                }
            }
        }
        for pair in and_edges {
            if let Some(edge) = net.edges.get_mut(&pair) {
                edge.split = SplitKind::And;
            }
        }

        let kept = net.dfg();
        net.start_activities = kept.start_activities();
        net.end_activities = kept.end_activities();
        net
    }

    /// The filtered edges as a plain DFG.
    pub fn dfg(&self) -> Dfg {
        self.edges
            .iter()
            .map(|(pair, edge)| (pair.clone(), edge.frequency))
            .collect()
    }

    pub fn edge(&self, from: &str, to: &str) -> Option<&HeuristicsEdge> {
        self.edges.get(&(from.to_string(), to.to_string()))
    }

    pub fn contains_edge(&self, from: &str, to: &str) -> bool {
        self.edge(from, to).is_some()
    }

    pub fn split(&self, source: &str, left: &str, right: &str) -> Option<&SplitMeasure> {
        self.splits.iter().find(|s| {
            s.source == source
                && ((s.left == left && s.right == right) || (s.left == right && s.right == left))
        })
    }
}
