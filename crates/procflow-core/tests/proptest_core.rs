//! Property-based tests for the procflow model types.
//!
//! Covers: heuristics-net structure, OCDFG discovery consistency, PDFA
//! normalization, reference-model bounds and cardinality inference.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use procflow_core::{
    Cardinality, Dfg, HeuristicsNet, HeuristicsThresholds, ObjectCentricEvent, Ocdfg, Pdfa,
    ReferenceModelBuilder,
};

fn activity(code: u8) -> String {
    ((b'A' + code) as char).to_string()
}

/// Directly-follows edges over a six-letter alphabet with small counts.
fn arb_dfg() -> impl Strategy<Value = Dfg> {
    prop::collection::vec((0u8..6, 0u8..6, 1u64..20), 0..25).prop_map(|edges| {
        let mut dfg = Dfg::new();
        for (a, b, f) in edges {
            dfg.add(&activity(a), &activity(b), f);
        }
        dfg
    })
}

fn arb_thresholds() -> impl Strategy<Value = HeuristicsThresholds> {
    (-1.0f64..=1.0, 0.0f64..=1.0).prop_map(|(dependency, and)| HeuristicsThresholds { dependency, and })
}

/// Object-centric events over two types with a handful of objects each.
fn arb_ocel() -> impl Strategy<Value = Vec<ObjectCentricEvent>> {
    let event = (
        0u8..5,
        prop::collection::btree_set(0u8..4, 1..3),
        prop::collection::btree_set(0u8..6, 0..3),
    );
    prop::collection::vec(event, 0..60).prop_map(|events| {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        events
            .into_iter()
            .enumerate()
            .map(|(i, (code, orders, items))| {
                let mut event = ObjectCentricEvent::new(
                    format!("e{}", i),
                    activity(code),
                    base + Duration::seconds(i as i64),
                )
                .with_objects("Order", orders.iter().map(|o| format!("o{}", o)));
                if !items.is_empty() {
                    event = event.with_objects("Item", items.iter().map(|i| format!("i{}", i)));
                }
                event
            })
            .collect()
    })
}

proptest! {
    /// Every kept edge joins two known activities and passes the dependency
    /// threshold.
    #[test]
    fn heuristics_net_edges_are_well_formed(dfg in arb_dfg(), thresholds in arb_thresholds()) {
        let net = HeuristicsNet::from_dfg(&dfg, thresholds, 7);
        prop_assert_eq!(net.emitted_at, 7);
        for ((a, b), edge) in &net.edges {
            prop_assert!(net.activities.contains(a));
            prop_assert!(net.activities.contains(b));
            prop_assert!(edge.dependency >= thresholds.dependency);
            prop_assert!((-1.0..=1.0).contains(&edge.dependency));
            prop_assert_eq!(edge.frequency, dfg.frequency(a, b));
        }
        for split in &net.splits {
            prop_assert!(net.contains_edge(&split.source, &split.left));
            prop_assert!(net.contains_edge(&split.source, &split.right));
        }
    }

    /// Discovered OCDFGs keep edge endpoints among the activities and
    /// start/end sets disjoint per type.
    #[test]
    fn discovered_ocdfg_is_consistent(events in arb_ocel()) {
        let ocdfg = Ocdfg::discover(&events);
        prop_assert!(ocdfg.is_consistent());
        for object_type in ocdfg.edges.keys() {
            prop_assert!(ocdfg.object_types.contains(object_type));
        }
        let total_edges: u64 = ocdfg.edges.values().flat_map(|e| e.values()).sum();
        let transitions: usize = events.iter().map(|e| e.omap.values().map(|ids| ids.len()).sum::<usize>()).sum();
        prop_assert!(total_edges as usize <= transitions);
    }

    /// Normalization keeps every probability in [0, 1] and every row at 1.
    #[test]
    fn pdfa_normalization(
        counts in prop::collection::vec((0u8..4, 0u8..4, 1u64..50), 1..12),
        alpha in 0.05f64..=1.0,
    ) {
        let named: Vec<(String, String, u64)> = counts
            .iter()
            .map(|(a, b, c)| (activity(*a), activity(*b), *c))
            .collect();
        let pdfa = Pdfa::from_counts(named.iter().map(|(a, b, c)| (a.as_str(), b.as_str(), *c)));
        let normalized = pdfa.normalize(alpha).unwrap();

        prop_assert!(normalized.best_score() <= 1.0 + 1e-12);
        for node in &normalized.nodes {
            prop_assert!((normalized.row_sum(node) - 1.0).abs() < 1e-9);
            for target in &normalized.nodes {
                let p = normalized.probability(node, target);
                prop_assert!((0.0..=1.0 + 1e-12).contains(&p));
                prop_assert!(p <= normalized.best_score() + 1e-12);
            }
        }
    }

    /// Path bounds are ordered and every relation's distance to an end is
    /// within the model maximum.
    #[test]
    fn reference_bounds_are_ordered(
        traces in prop::collection::vec(prop::collection::vec(0u8..5, 1..8), 1..10),
        depth in 1usize..10,
    ) {
        let mut builder = ReferenceModelBuilder::new(depth);
        for trace in &traces {
            let named: Vec<String> = trace.iter().map(|c| activity(*c)).collect();
            builder.observe_trace(&named);
        }
        let model = builder.build();
        for (a, b) in &model.relations {
            if let Some(bounds) = model.path_bounds(a, b) {
                prop_assert!(bounds.min <= bounds.max);
            }
            if let Some(distance) = model.distance_to_end(a, b) {
                prop_assert!(distance <= model.max_distance_to_end);
            }
        }
    }

    /// Cardinality depends only on which side has more than one object.
    #[test]
    fn cardinality_inference(left in 0usize..5, right in 0usize..5) {
        let inferred = Cardinality::infer(left, right);
        match (left, right) {
            (0, _) | (_, 0) => prop_assert_eq!(inferred, None),
            (1, 1) => prop_assert_eq!(inferred, Some(Cardinality::OneToOne)),
            (1, _) => prop_assert_eq!(inferred, Some(Cardinality::OneToMany)),
            (_, 1) => prop_assert_eq!(inferred, Some(Cardinality::ManyToOne)),
            _ => prop_assert_eq!(inferred, Some(Cardinality::ManyToMany)),
        }
    }
}

#[test]
fn heuristics_net_json_shape() {
    let dfg = Dfg::from_traces(&[vec!["A", "B", "C"], vec!["A", "C"]]);
    let net = HeuristicsNet::from_dfg(&dfg, HeuristicsThresholds::default(), 5);
    let json = serde_json::to_value(&net).unwrap();

    assert_eq!(json["emitted_at"], 5);
    assert!(json["edges"].is_array());
    let back: HeuristicsNet = serde_json::from_value(json).unwrap();
    assert_eq!(back, net);
}
