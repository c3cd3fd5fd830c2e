//! Place/transition nets, as far as reference-model derivation needs them.

use crate::error::{MiningError, Result};
use crate::reference::{ReferenceModel, ReferenceModelBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// A transition; `label: None` marks a silent (tau) transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PetriNet {
    pub places: BTreeSet<String>,
    pub transitions: BTreeMap<String, Transition>,
    /// Flow relation: place → transition or transition → place.
    pub arcs: BTreeSet<(String, String)>,
    pub initial_marking: BTreeSet<String>,
    pub final_marking: BTreeSet<String>,
}

impl PetriNet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_place(&mut self, id: &str) -> &mut Self {
        self.places.insert(id.to_string());
        self
    }

    pub fn add_transition(&mut self, id: &str, label: Option<&str>) -> &mut Self {
        self.transitions.insert(
            id.to_string(),
            Transition {
                label: label.map(str::to_string),
            },
        );
        self
    }

    pub fn add_arc(&mut self, source: &str, target: &str) -> &mut Self {
        self.arcs.insert((source.to_string(), target.to_string()));
        self
    }

    pub fn mark_initial(&mut self, place: &str) -> &mut Self {
        self.initial_marking.insert(place.to_string());
        self
    }

    pub fn mark_final(&mut self, place: &str) -> &mut Self {
        self.final_marking.insert(place.to_string());
        self
    }

    /// Check that arcs connect a place and a transition and that markings
    /// name known places.
    pub fn validate(&self) -> Result<()> {
        for (source, target) in &self.arcs {
            let place_to_transition =
                self.places.contains(source) && self.transitions.contains_key(target);
            let transition_to_place =
                self.transitions.contains_key(source) && self.places.contains(target);
            if !place_to_transition && !transition_to_place {
                return Err(MiningError::config(format!(
                    "arc {} -> {} must connect a place and a transition",
                    source, target
                )));
            }
        }
        if let Some(place) = self
            .initial_marking
            .iter()
            .chain(&self.final_marking)
            .find(|p| !self.places.contains(*p))
        {
            return Err(MiningError::config(format!(
                "marking references unknown place '{}'",
                place
            )));
        }
        Ok(())
    }

    fn postset(&self, node: &str) -> Vec<&str> {
        self.arcs
            .iter()
            .filter(|(s, _)| s == node)
            .map(|(_, t)| t.as_str())
            .collect()
    }

    /// Visible labels reachable from `places` by firing only silent
    /// transitions in between. Also reports whether a final place is
    /// reachable the same way.
    fn visible_closure(&self, places: impl IntoIterator<Item = String>) -> (BTreeSet<String>, bool) {
        let mut labels = BTreeSet::new();
        let mut reaches_final = false;
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut fired: BTreeSet<&str> = BTreeSet::new();
        let mut queue: VecDeque<String> = places.into_iter().collect();

        while let Some(place) = queue.pop_front() {
            if !seen.insert(place.clone()) {
                continue;
            }
            if self.final_marking.contains(&place) {
                reaches_final = true;
            }
            for transition_id in self.postset(&place) {
                let Some(transition) = self.transitions.get(transition_id) else {
                    continue;
                };
                match &transition.label {
                    Some(label) => {
                        labels.insert(label.clone());
                    }
                    None => {
                        if fired.insert(transition_id) {
                            queue.extend(self.postset(transition_id).into_iter().map(str::to_string));
                        }
                    }
                }
            }
        }
        (labels, reaches_final)
    }

    /// Directly-follows relations and start/end activities of the net's
    /// visible behavior.
    pub fn to_reference_builder(&self, max_path_depth: usize) -> Result<ReferenceModelBuilder> {
        self.validate()?;
        let mut builder = ReferenceModelBuilder::new(max_path_depth);

        let (start, _) = self.visible_closure(self.initial_marking.iter().cloned());
        for activity in &start {
            builder.add_start(activity);
        }

        for transition_id in self.transitions.keys() {
            let Some(label) = self.transitions[transition_id].label.as_deref() else {
                continue;
            };
            let (successors, reaches_final) =
                self.visible_closure(self.postset(transition_id).into_iter().map(str::to_string));
            for next in &successors {
                builder.add_relation(label, next);
            }
            if reaches_final {
                builder.add_end(label);
            }
        }
        Ok(builder)
    }

    pub fn reference_model(&self, max_path_depth: usize) -> Result<ReferenceModel> {
        Ok(self.to_reference_builder(max_path_depth)?.build())
    }
}
