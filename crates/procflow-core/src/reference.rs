//! Behavioral reference model `(B, P, F)`.
//!
//! - `B` is the set of legal directly-follows relations.
//! - `P` maps a relation `(a, b)` to the shortest and longest number of
//!   relations a case has walked when it reaches `(a, b)` from a start
//!   activity, counting `(a, b)` itself.
//! - `F` maps `(a, b)` to the minimum number of relations still needed to
//!   reach an end activity from `b`; `None` when no end is reachable.
//!
//! Longest paths are simple paths explored iteratively up to
//! `max_path_depth` relations.

use crate::dfg::{ActivityPair, Dfg};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;

/// Default cap on longest-path exploration.
pub const DEFAULT_MAX_PATH_DEPTH: usize = 5;

/// `(P_min, P_max)` of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathBounds {
    pub min: u32,
    pub max: u32,
}

impl PathBounds {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, length: u32) -> bool {
        self.min <= length && length <= self.max
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceModel {
    pub relations: BTreeSet<ActivityPair>,
    #[serde(with = "crate::serde_pairs")]
    pub path_bounds: BTreeMap<ActivityPair, PathBounds>,
    #[serde(with = "crate::serde_pairs")]
    pub distance_to_end: BTreeMap<ActivityPair, Option<u32>>,
    /// Largest finite value of `F`.
    pub max_distance_to_end: u32,
}

impl ReferenceModel {
    /// Assemble a model from explicit `B`, `P` and `F`.
    pub fn from_parts(
        relations: BTreeSet<ActivityPair>,
        path_bounds: BTreeMap<ActivityPair, PathBounds>,
        distance_to_end: BTreeMap<ActivityPair, Option<u32>>,
    ) -> Self {
        let max_distance_to_end = distance_to_end.values().flatten().copied().max().unwrap_or(0);
        Self {
            relations,
            path_bounds,
            distance_to_end,
            max_distance_to_end,
        }
    }

    pub fn contains(&self, from: &str, to: &str) -> bool {
        self.relations
            .contains(&(from.to_string(), to.to_string()))
    }

    pub fn path_bounds(&self, from: &str, to: &str) -> Option<PathBounds> {
        self.path_bounds
            .get(&(from.to_string(), to.to_string()))
            .copied()
    }

    /// `F[(from, to)]`; `None` for unknown relations and unreachable ends.
    pub fn distance_to_end(&self, from: &str, to: &str) -> Option<u32> {
        self.distance_to_end
            .get(&(from.to_string(), to.to_string()))
            .copied()
            .flatten()
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}

/// Collects relations and start/end activities, then derives `P` and `F`.
#[derive(Debug, Clone)]
pub struct ReferenceModelBuilder {
    relations: BTreeSet<ActivityPair>,
    start: BTreeSet<String>,
    end: BTreeSet<String>,
    max_path_depth: usize,
}

impl Default for ReferenceModelBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PATH_DEPTH)
    }
}

impl ReferenceModelBuilder {
    pub fn new(max_path_depth: usize) -> Self {
        Self {
            relations: BTreeSet::new(),
            start: BTreeSet::new(),
            end: BTreeSet::new(),
            max_path_depth,
        }
    }

    pub fn add_relation(&mut self, from: &str, to: &str) -> &mut Self {
        self.relations.insert((from.to_string(), to.to_string()));
        self
    }

    pub fn add_start(&mut self, activity: &str) -> &mut Self {
        self.start.insert(activity.to_string());
        self
    }

    pub fn add_end(&mut self, activity: &str) -> &mut Self {
        self.end.insert(activity.to_string());
        self
    }

    /// Record a complete trace: its relations, first and last activity.
    pub fn observe_trace<S: AsRef<str>>(&mut self, trace: &[S]) -> &mut Self {
        if let (Some(first), Some(last)) = (trace.first(), trace.last()) {
            self.add_start(first.as_ref());
            self.add_end(last.as_ref());
        }
        for window in trace.windows(2) {
            self.add_relation(window[0].as_ref(), window[1].as_ref());
        }
        self
    }

    /// Seed from a DFG, using its source-only and sink-only activities as
    /// start and end.
    pub fn from_dfg(dfg: &Dfg, max_path_depth: usize) -> Self {
        let mut builder = Self::new(max_path_depth);
        for ((a, b), _) in dfg.edges() {
            builder.add_relation(a, b);
        }
        builder.start = dfg.start_activities();
        builder.end = dfg.end_activities();
        builder
    }

    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }

    pub fn build(&self) -> ReferenceModel {
        let graph = Adjacency::new(&self.relations);
        let from_start = graph.distances(&self.start, Direction::Forward);
        let to_end = graph.distances(&self.end, Direction::Backward);
        let longest = graph.longest_from(&self.start, self.max_path_depth);

        let mut path_bounds = BTreeMap::new();
        let mut distance_to_end = BTreeMap::new();
        for pair in &self.relations {
            let (a, b) = pair;
            if let Some(&shortest) = from_start.get(a.as_str()) {
                let min = shortest + 1;
                let max = longest
                    .get(a.as_str())
                    .map_or(min, |&l| (l + 1).max(min));
                path_bounds.insert(pair.clone(), PathBounds::new(min, max));
            }
            distance_to_end.insert(pair.clone(), to_end.get(b.as_str()).copied());
        }

        debug!(
            relations = self.relations.len(),
            reachable = path_bounds.len(),
            "Derived reference model"
        );
        ReferenceModel::from_parts(self.relations.clone(), path_bounds, distance_to_end)
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Forward,
    Backward,
}

struct Adjacency<'a> {
    forward: BTreeMap<&'a str, Vec<&'a str>>,
    backward: BTreeMap<&'a str, Vec<&'a str>>,
}

impl<'a> Adjacency<'a> {
    fn new(relations: &'a BTreeSet<ActivityPair>) -> Self {
        let mut forward: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        let mut backward: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (a, b) in relations {
            forward.entry(a.as_str()).or_default().push(b.as_str());
            backward.entry(b.as_str()).or_default().push(a.as_str());
        }
        Self { forward, backward }
    }

    fn neighbours(&self, node: &str, direction: Direction) -> &[&'a str] {
        let map = match direction {
            Direction::Forward => &self.forward,
            Direction::Backward => &self.backward,
        };
        map.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Multi-source BFS distances (in relations) from `sources`.
    fn distances(&self, sources: &'a BTreeSet<String>, direction: Direction) -> BTreeMap<&'a str, u32> {
        let mut dist: BTreeMap<&str, u32> = BTreeMap::new();
        let mut queue = VecDeque::new();
        for s in sources {
            dist.insert(s.as_str(), 0);
            queue.push_back(s.as_str());
        }
        while let Some(node) = queue.pop_front() {
            let d = dist.get(node).copied().unwrap_or(0);
            for &next in self.neighbours(node, direction) {
                if !dist.contains_key(next) {
                    dist.insert(next, d + 1);
                    queue.push_back(next);
                }
            }
        }
        dist
    }

    /// Longest simple path (in relations) from any start to each node,
    /// exploring at most `max_depth` relations deep.
    ///
    /// Each `(node, depth)` is expanded once across all sources, which keeps
    /// the search polynomial in `max_depth` and `|B|`. Where two paths meet
    /// a node at the same depth only the first is continued, so a result
    /// may fall short of the exact longest simple path.
    fn longest_from(&self, sources: &'a BTreeSet<String>, max_depth: usize) -> BTreeMap<&'a str, u32> {
        let mut longest: BTreeMap<&str, u32> = BTreeMap::new();
        let mut expanded: BTreeSet<(&str, usize)> = BTreeSet::new();
        for source in sources {
            if !expanded.insert((source.as_str(), 0)) {
                continue;
            }
            let mut path: Vec<&str> = vec![source.as_str()];
            // Each frame is the index of the next neighbour to try.
            let mut cursors: Vec<usize> = vec![0];
            longest.entry(source.as_str()).or_insert(0);

            while let Some(cursor) = cursors.last_mut() {
                let Some(&node) = path.last() else { break };
                let depth = path.len() - 1;
                let neighbours = self.neighbours(node, Direction::Forward);
                if depth >= max_depth || *cursor >= neighbours.len() {
                    cursors.pop();
                    path.pop();
                    continue;
                }
                let next = neighbours[*cursor];
                *cursor += 1;
                if path.contains(&next) {
                    continue;
                }
                let length = (depth + 1) as u32;
                let entry = longest.entry(next).or_insert(0);
                *entry = (*entry).max(length);
                if expanded.insert((next, depth + 1)) {
                    path.push(next);
                    cursors.push(0);
                }
            }
        }
        longest
    }
}
