//! Activity-Entity-Relationship (AER) model

use crate::ocdfg::Ocdfg;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Cardinality of a relation between two object types at one activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Cardinality {
    #[serde(rename = "1..1")]
    OneToOne,
    #[serde(rename = "1..n")]
    OneToMany,
    #[serde(rename = "n..1")]
    ManyToOne,
    #[serde(rename = "n..n")]
    ManyToMany,
}

impl Cardinality {
    /// Infer from the object counts of the two types at a single event.
    /// `None` when either side has no objects.
    pub fn infer(left: usize, right: usize) -> Option<Self> {
        match (left, right) {
            (0, _) | (_, 0) => None,
            (1, 1) => Some(Cardinality::OneToOne),
            (1, _) => Some(Cardinality::OneToMany),
            (_, 1) => Some(Cardinality::ManyToOne),
            _ => Some(Cardinality::ManyToMany),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Cardinality::OneToOne => "1..1",
            Cardinality::OneToMany => "1..n",
            Cardinality::ManyToOne => "n..1",
            Cardinality::ManyToMany => "n..n",
        }
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lexicographically sorted pair of object types, `left <= right`.
pub type TypePair = (String, String);

/// Order two object types so the smaller one comes first.
pub fn sorted_pair(a: &str, b: &str) -> TypePair {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Per-activity object types and pairwise cardinalities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AerModel {
    pub activities: BTreeSet<String>,
    pub object_types: BTreeMap<String, BTreeSet<String>>,
    #[serde(with = "crate::serde_pairs::nested")]
    pub relations: BTreeMap<String, BTreeMap<TypePair, Cardinality>>,
}

impl AerModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn relation(&self, activity: &str, left: &str, right: &str) -> Option<Cardinality> {
        self.relations
            .get(activity)
            .and_then(|r| r.get(&sorted_pair(left, right)))
            .copied()
    }

    /// Restrict to the activities and object types present in `ocdfg`.
    pub fn pruned_to(&self, ocdfg: &Ocdfg) -> AerModel {
        let activities: BTreeSet<String> = self
            .activities
            .intersection(&ocdfg.activities)
            .cloned()
            .collect();

        let object_types = activities
            .iter()
            .filter_map(|a| {
                self.object_types.get(a).map(|types| {
                    let kept = types
                        .intersection(&ocdfg.object_types)
                        .cloned()
                        .collect::<BTreeSet<_>>();
                    (a.clone(), kept)
                })
            })
            .collect();

        let relations = activities
            .iter()
            .filter_map(|a| {
                self.relations.get(a).map(|pairs| {
                    let kept = pairs
                        .iter()
                        .filter(|((l, r), _)| {
                            ocdfg.object_types.contains(l) && ocdfg.object_types.contains(r)
                        })
                        .map(|(k, v)| (k.clone(), *v))
                        .collect::<BTreeMap<_, _>>();
                    (a.clone(), kept)
                })
            })
            .collect();

        AerModel {
            activities,
            object_types,
            relations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dfg::Dfg;

    #[test]
    fn test_infer_cardinality() {
        assert_eq!(Cardinality::infer(1, 1), Some(Cardinality::OneToOne));
        assert_eq!(Cardinality::infer(1, 3), Some(Cardinality::OneToMany));
        assert_eq!(Cardinality::infer(2, 1), Some(Cardinality::ManyToOne));
        assert_eq!(Cardinality::infer(2, 2), Some(Cardinality::ManyToMany));
        assert_eq!(Cardinality::infer(0, 2), None);
    }

    #[test]
    fn test_sorted_pair() {
        assert_eq!(
            sorted_pair("Order", "Item"),
            ("Item".to_string(), "Order".to_string())
        );
    }

    #[test]
    fn test_cardinality_serde_names() {
        let json = serde_json::to_string(&Cardinality::ManyToOne).unwrap();
        assert_eq!(json, "\"n..1\"");
    }

    #[test]
    fn test_pruned_to_ocdfg() {
        let mut aer = AerModel::new();
        for activity in ["Create", "Gift Wrap"] {
            aer.activities.insert(activity.to_string());
        }
        aer.object_types.insert(
            "Create".into(),
            BTreeSet::from(["Order".to_string(), "Gift".to_string()]),
        );
        aer.relations.insert(
            "Create".into(),
            BTreeMap::from([(sorted_pair("Order", "Gift"), Cardinality::OneToOne)]),
        );

        let mut ocdfg = Ocdfg::new();
        ocdfg.insert_type("Order", &Dfg::from_traces(&[vec!["Create", "Ship"]]));

        let pruned = aer.pruned_to(&ocdfg);
        assert_eq!(pruned.activities, BTreeSet::from(["Create".to_string()]));
        assert_eq!(
            pruned.object_types["Create"],
            BTreeSet::from(["Order".to_string()])
        );
        assert!(pruned.relations["Create"].is_empty());
    }
}
