//! Probabilistic deterministic finite automaton over activities.

use crate::error::{MiningError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Nodes are activities; `edges[s][t]` is the probability that `t`
/// directly follows `s`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pdfa {
    pub nodes: BTreeSet<String>,
    pub edges: BTreeMap<String, BTreeMap<String, f64>>,
    /// `α`; 1.0 until [`Pdfa::normalize`] is applied.
    pub weight_factor: f64,
}

impl Default for Pdfa {
    fn default() -> Self {
        Self {
            nodes: BTreeSet::new(),
            edges: BTreeMap::new(),
            weight_factor: 1.0,
        }
    }
}

impl Pdfa {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a transition probability, registering both endpoints as nodes.
    pub fn add_edge(&mut self, from: &str, to: &str, probability: f64) -> &mut Self {
        self.nodes.insert(from.to_string());
        self.nodes.insert(to.to_string());
        self.edges
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string(), probability);
        self
    }

    pub fn add_node(&mut self, node: &str) -> &mut Self {
        self.nodes.insert(node.to_string());
        self
    }

    /// Build from observed transition counts, each row scaled to sum 1.
    pub fn from_counts<'a, I>(counts: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str, u64)>,
    {
        let mut pdfa = Pdfa::new();
        for (from, to, count) in counts {
            let current = pdfa.probability(from, to);
            pdfa.add_edge(from, to, current + count as f64);
        }
        for row in pdfa.edges.values_mut() {
            let total: f64 = row.values().sum();
            if total > 0.0 {
                row.values_mut().for_each(|p| *p /= total);
            }
        }
        pdfa
    }

    /// Smooth every row towards uniform:
    /// `edges[s][t] = α·p(s,t) + (1 − α)/|nodes|` for all `s, t`.
    ///
    /// Rows are first rescaled to sum 1; a row without outgoing mass is
    /// taken as uniform. Every row of the result sums to 1.
    pub fn normalize(&self, alpha: f64) -> Result<Pdfa> {
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(MiningError::config(format!(
                "weight factor must be in (0, 1], got {}",
                alpha
            )));
        }
        if self.nodes.is_empty() {
            return Err(MiningError::config("cannot normalize a PDFA without nodes"));
        }
        for (row, targets) in &self.edges {
            if let Some((target, p)) = targets.iter().find(|(_, p)| !p.is_finite() || **p < 0.0) {
                return Err(MiningError::config(format!(
                    "invalid probability {} on edge {} -> {}",
                    p, row, target
                )));
            }
        }

        let n = self.nodes.len() as f64;
        let floor = (1.0 - alpha) / n;
        let mut edges = BTreeMap::new();
        for source in &self.nodes {
            let row = self.edges.get(source);
            let total: f64 = row.map_or(0.0, |r| r.values().sum());
            let normalized = self
                .nodes
                .iter()
                .map(|target| {
                    let p = match row {
                        Some(r) if total > 0.0 => r.get(target).copied().unwrap_or(0.0) / total,
                        _ => 1.0 / n,
                    };
                    (target.clone(), alpha * p + floor)
                })
                .collect::<BTreeMap<_, _>>();
            edges.insert(source.clone(), normalized);
        }

        Ok(Pdfa {
            nodes: self.nodes.clone(),
            edges,
            weight_factor: alpha,
        })
    }

    /// Stored probability of `from → to`, 0 when absent.
    pub fn probability(&self, from: &str, to: &str) -> f64 {
        self.edges
            .get(from)
            .and_then(|row| row.get(to))
            .copied()
            .unwrap_or(0.0)
    }

    /// Best transition score after normalization: `α + (1 − α)/|nodes|`.
    pub fn best_score(&self) -> f64 {
        if self.nodes.is_empty() {
            return self.weight_factor;
        }
        self.weight_factor + (1.0 - self.weight_factor) / self.nodes.len() as f64
    }

    pub fn row_sum(&self, source: &str) -> f64 {
        self.edges.get(source).map_or(0.0, |row| row.values().sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Pdfa {
        let mut pdfa = Pdfa::new();
        pdfa.add_edge("A", "B", 1.0).add_edge("B", "C", 1.0);
        pdfa
    }

    #[test]
    fn test_normalize_smooths_rows() {
        let normalized = chain().normalize(0.5).unwrap();
        assert!((normalized.probability("A", "B") - 2.0 / 3.0).abs() < 1e-9);
        assert!((normalized.probability("A", "C") - 1.0 / 6.0).abs() < 1e-9);
        for node in &normalized.nodes {
            assert!((normalized.row_sum(node) - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_empty_row_becomes_uniform() {
        let normalized = chain().normalize(0.5).unwrap();
        for target in ["A", "B", "C"] {
            assert!((normalized.probability("C", target) - 1.0 / 3.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_best_score() {
        let normalized = chain().normalize(0.5).unwrap();
        assert!((normalized.best_score() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_alpha_out_of_range() {
        assert!(chain().normalize(0.0).is_err());
        assert!(chain().normalize(1.5).is_err());
        assert!(chain().normalize(1.0).is_ok());
    }

    #[test]
    fn test_from_counts() {
        let pdfa = Pdfa::from_counts([("A", "B", 3), ("A", "C", 1)]);
        assert!((pdfa.probability("A", "B") - 0.75).abs() < 1e-12);
        assert_eq!(pdfa.nodes.len(), 3);
    }
}
