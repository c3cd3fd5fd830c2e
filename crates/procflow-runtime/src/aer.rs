//! Streaming Activity-Entity-Relationship miner.
//!
//! For every activity the miner records the object types seen with it and,
//! for each sorted pair of co-occurring types, runs a lossy counter over the
//! observed cardinalities. The reported cardinality is the one with the
//! highest surviving count; ties go to the one inserted first.

use crate::lossy::LossyCounter;
use crate::mapper::Mapper;
use procflow_core::aer::TypePair;
use procflow_core::error::check_epsilon;
use procflow_core::{AerModel, Cardinality, MiningError, ObjectCentricEvent, Result};
use smallvec::SmallVec;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

pub struct AerMiner {
    epsilon: f64,
    update_every: u64,
    observed: u64,
    types_seen: BTreeMap<String, BTreeSet<String>>,
    counters: BTreeMap<String, BTreeMap<TypePair, LossyCounter<Cardinality>>>,
}

impl AerMiner {
    pub fn new(epsilon: f64, update_every: u64) -> Result<Self> {
        check_epsilon("aer_epsilon", epsilon)?;
        if update_every == 0 {
            return Err(MiningError::config("update_every must be at least 1"));
        }
        Ok(Self {
            epsilon,
            update_every,
            observed: 0,
            types_seen: BTreeMap::new(),
            counters: BTreeMap::new(),
        })
    }

    pub fn observed(&self) -> u64 {
        self.observed
    }

    pub fn observe(&mut self, event: &ObjectCentricEvent) -> Result<Option<AerModel>> {
        event.validate()?;
        self.observed += 1;

        let activity = event.activity.as_ref();
        let types: SmallVec<[(&str, usize); 4]> = event
            .omap
            .iter()
            .map(|(t, ids)| (t.as_str(), ids.len()))
            .collect();

        self.types_seen
            .entry(activity.to_string())
            .or_default()
            .extend(types.iter().map(|(t, _)| t.to_string()));

        let counters = self.counters.entry(activity.to_string()).or_default();
        // omap keys are sorted, so (left, right) is already a sorted pair.
        for (i, (left, left_count)) in types.iter().enumerate() {
            for (right, right_count) in &types[i + 1..] {
                let Some(cardinality) = Cardinality::infer(*left_count, *right_count) else {
                    continue;
                };
                let pair = (left.to_string(), right.to_string());
                let counter = match counters.entry(pair) {
                    Entry::Occupied(entry) => entry.into_mut(),
                    Entry::Vacant(entry) => entry.insert(LossyCounter::with_epsilon(self.epsilon)?),
                };
                counter.observe(cardinality);
            }
        }

        if self.observed % self.update_every == 0 {
            Ok(Some(self.model()))
        } else {
            Ok(None)
        }
    }

    pub fn model(&self) -> AerModel {
        let relations = self
            .counters
            .iter()
            .map(|(activity, pairs)| {
                let reported = pairs
                    .iter()
                    .filter_map(|(pair, counter)| {
                        dominant(counter).map(|cardinality| (pair.clone(), cardinality))
                    })
                    .collect();
                (activity.clone(), reported)
            })
            .collect();

        AerModel {
            activities: self.types_seen.keys().cloned().collect(),
            object_types: self.types_seen.clone(),
            relations,
        }
    }
}

/// Highest count, first inserted on ties.
fn dominant(counter: &LossyCounter<Cardinality>) -> Option<Cardinality> {
    let mut best: Option<(Cardinality, u64)> = None;
    for (cardinality, count) in counter.iter() {
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((*cardinality, count));
        }
    }
    best.map(|(cardinality, _)| cardinality)
}

impl Mapper<ObjectCentricEvent> for AerMiner {
    type Output = AerModel;

    fn on_next(&mut self, event: ObjectCentricEvent) -> Result<Vec<AerModel>> {
        Ok(self.observe(&event)?.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn add_item(orders: &[&str], items: &[&str]) -> ObjectCentricEvent {
        ObjectCentricEvent::new("e", "Add Item", Utc::now())
            .with_objects("Order", orders.iter().copied())
            .with_objects("Item", items.iter().copied())
    }

    #[test]
    fn test_cardinality_drift() {
        let mut miner = AerMiner::new(0.5, 1).unwrap();
        let mut latest = None;
        for _ in 0..10 {
            latest = miner.observe(&add_item(&["o1"], &["i1"])).unwrap();
        }
        for _ in 0..10 {
            latest = miner.observe(&add_item(&["o1", "o2"], &["i1", "i2"])).unwrap();
        }
        let model = latest.take().unwrap();
        assert_eq!(
            model.relation("Add Item", "Item", "Order"),
            Some(Cardinality::ManyToMany)
        );

        for _ in 0..30 {
            latest = miner.observe(&add_item(&["o1"], &["i1"])).unwrap();
        }
        assert_eq!(
            latest.unwrap().relation("Add Item", "Order", "Item"),
            Some(Cardinality::OneToOne)
        );
    }

    #[test]
    fn test_pair_is_sorted() {
        let mut miner = AerMiner::new(0.1, 1).unwrap();
        let model = miner
            .observe(&add_item(&["o1"], &["i1", "i2"]))
            .unwrap()
            .unwrap();
        let relations = &model.relations["Add Item"];
        let pair = ("Item".to_string(), "Order".to_string());
        assert_eq!(relations.get(&pair), Some(&Cardinality::ManyToOne));
        assert_eq!(relations.len(), 1);
    }

    #[test]
    fn test_types_seen_grow() {
        let mut miner = AerMiner::new(0.1, 1).unwrap();
        miner.observe(&add_item(&["o1"], &["i1"])).unwrap();
        let event = ObjectCentricEvent::new("e2", "Add Item", Utc::now())
            .with_objects("Customer", ["c1"]);
        let model = miner.observe(&event).unwrap().unwrap();
        let types: Vec<&str> = model.object_types["Add Item"].iter().map(String::as_str).collect();
        assert_eq!(types, vec!["Customer", "Item", "Order"]);
    }

    #[test]
    fn test_tie_goes_to_first_inserted() {
        let mut counter = LossyCounter::with_epsilon(0.01).unwrap();
        counter.observe(Cardinality::OneToMany);
        counter.observe(Cardinality::OneToOne);
        assert_eq!(dominant(&counter), Some(Cardinality::OneToMany));
        counter.observe(Cardinality::OneToOne);
        assert_eq!(dominant(&counter), Some(Cardinality::OneToOne));
    }

    #[test]
    fn test_rejects_invalid_event() {
        let mut miner = AerMiner::new(0.1, 1).unwrap();
        let empty = ObjectCentricEvent::new("e", "Add Item", Utc::now());
        assert!(miner.observe(&empty).is_err());
        assert_eq!(miner.observed(), 0);
    }

    #[test]
    fn test_invalid_config() {
        assert!(AerMiner::new(1.0, 1).is_err());
        assert!(AerMiner::new(0.1, 0).is_err());
    }
}
