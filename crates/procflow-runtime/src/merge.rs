//! OC-merge: folds router messages into one object-centric DFG.

use crate::mapper::Mapper;
use crate::router::{Command, RouterMessage};
use procflow_core::{AerModel, HeuristicsNet, MiningError, Ocdfg, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Merged view emitted after every state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcdfgUpdate {
    pub ocdfg: Ocdfg,
    /// Latest AER model restricted to the OCDFG; `None` until one arrives.
    pub aer: Option<AerModel>,
}

/// Keeps the latest net per type, the set of active types and the latest
/// AER model, and rebuilds the merged OCDFG whenever one of them changes.
#[derive(Debug, Default)]
pub struct OcMerge {
    repo: BTreeMap<String, HeuristicsNet>,
    active: BTreeSet<String>,
    latest_aer: Option<AerModel>,
}

impl OcMerge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_types(&self) -> impl Iterator<Item = &str> {
        self.active.iter().map(String::as_str)
    }

    pub fn is_active(&self, object_type: &str) -> bool {
        self.active.contains(object_type)
    }

    pub fn net(&self, object_type: &str) -> Option<&HeuristicsNet> {
        self.repo.get(object_type)
    }

    /// Apply one message; returns the rebuilt view if anything changed.
    pub fn apply(&mut self, message: RouterMessage) -> Option<OcdfgUpdate> {
        let changed = match message {
            RouterMessage::Dfg { object_type, model } => {
                self.repo.insert(object_type, model);
                true
            }
            RouterMessage::Aer { model } => {
                self.latest_aer = Some(model);
                true
            }
            RouterMessage::Command {
                command,
                object_type,
            } => {
                debug!(object_type = %object_type, command = %command, "Merge command");
                match command {
                    Command::Active => self.active.insert(object_type),
                    Command::Inactive => self.active.remove(&object_type),
                    Command::Deregister => {
                        let was_active = self.active.remove(&object_type);
                        self.repo.remove(&object_type).is_some() || was_active
                    }
                }
            }
        };
        changed.then(|| self.snapshot())
    }

    /// The merged OCDFG over active types, with the AER pruned to it.
    pub fn snapshot(&self) -> OcdfgUpdate {
        let mut ocdfg = Ocdfg::new();
        for object_type in &self.active {
            if let Some(net) = self.repo.get(object_type) {
                ocdfg.insert_type(object_type, &net.dfg());
            }
        }
        let aer = self.latest_aer.as_ref().map(|aer| aer.pruned_to(&ocdfg));
        OcdfgUpdate { ocdfg, aer }
    }
}

impl Mapper<RouterMessage> for OcMerge {
    type Output = OcdfgUpdate;

    fn on_next(&mut self, message: RouterMessage) -> Result<Vec<OcdfgUpdate>> {
        Ok(self.apply(message).into_iter().collect())
    }
}

/// Decode a raw JSON message.
pub fn decode_message(value: serde_json::Value) -> Result<RouterMessage> {
    serde_json::from_value(value)
        .map_err(|e| MiningError::protocol(format!("unrecognized message: {}", e)))
}

/// Turns raw JSON values into router messages, logging and dropping any
/// value of unknown shape.
#[derive(Debug, Default)]
pub struct MessageDecoder {
    dropped: u64,
}

impl MessageDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Mapper<serde_json::Value> for MessageDecoder {
    type Output = RouterMessage;

    fn on_next(&mut self, value: serde_json::Value) -> Result<Vec<RouterMessage>> {
        match decode_message(value) {
            Ok(message) => Ok(vec![message]),
            Err(e) if e.is_recoverable() => {
                self.dropped += 1;
                warn!(dropped = self.dropped, "{}", e);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procflow_core::{Cardinality, Dfg, HeuristicsThresholds};
    use serde_json::json;

    fn net(traces: &[Vec<&str>]) -> HeuristicsNet {
        let thresholds = HeuristicsThresholds {
            dependency: 0.0,
            and: 0.8,
        };
        HeuristicsNet::from_dfg(&Dfg::from_traces(traces), thresholds, 0)
    }

    fn dfg(object_type: &str, traces: &[Vec<&str>]) -> RouterMessage {
        RouterMessage::Dfg {
            object_type: object_type.to_string(),
            model: net(traces),
        }
    }

    #[test]
    fn test_only_active_types_are_merged() {
        let mut merge = OcMerge::new();
        merge.apply(dfg("Order", &[vec!["Place", "Pay", "Ship"]]));
        merge.apply(dfg("Item", &[vec!["Pick", "Pack"]]));
        let update = merge
            .apply(RouterMessage::command(Command::Active, "Order"))
            .unwrap();

        assert_eq!(update.ocdfg.object_types.len(), 1);
        assert!(update.ocdfg.object_types.contains("Order"));
        assert_eq!(update.ocdfg.start_activities["Order"].len(), 1);
        assert!(update.ocdfg.end_activities["Order"].contains("Ship"));
        assert!(update.ocdfg.is_consistent());
    }

    #[test]
    fn test_inactive_removes_from_view() {
        let mut merge = OcMerge::new();
        merge.apply(dfg("Order", &[vec!["Place", "Pay"]]));
        merge.apply(RouterMessage::command(Command::Active, "Order"));
        let update = merge
            .apply(RouterMessage::command(Command::Inactive, "Order"))
            .unwrap();
        assert!(update.ocdfg.is_empty());
        assert!(merge.net("Order").is_some());

        // Already inactive: nothing changes.
        assert!(merge
            .apply(RouterMessage::command(Command::Inactive, "Order"))
            .is_none());
    }

    #[test]
    fn test_deregister_drops_net() {
        let mut merge = OcMerge::new();
        merge.apply(dfg("Gift", &[vec!["Wrap", "Send"]]));
        merge.apply(RouterMessage::command(Command::Active, "Gift"));
        merge.apply(RouterMessage::command(Command::Deregister, "Gift"));
        assert!(merge.net("Gift").is_none());
        assert!(!merge.is_active("Gift"));

        // A later ACTIVE without a fresh net contributes nothing.
        let update = merge
            .apply(RouterMessage::command(Command::Active, "Gift"))
            .unwrap();
        assert!(update.ocdfg.is_empty());
    }

    #[test]
    fn test_aer_is_pruned() {
        let mut merge = OcMerge::new();
        let mut aer = AerModel::new();
        for activity in ["Place", "Wrap"] {
            aer.activities.insert(activity.to_string());
        }
        aer.object_types.insert(
            "Place".to_string(),
            ["Order", "Gift"].iter().map(|s| s.to_string()).collect(),
        );
        aer.relations.insert(
            "Place".to_string(),
            BTreeMap::from([(
                ("Gift".to_string(), "Order".to_string()),
                Cardinality::OneToOne,
            )]),
        );

        merge.apply(RouterMessage::Aer { model: aer });
        merge.apply(dfg("Order", &[vec!["Place", "Pay"]]));
        let update = merge
            .apply(RouterMessage::command(Command::Active, "Order"))
            .unwrap();
        let pruned = update.aer.unwrap();

        assert_eq!(
            pruned.activities.iter().collect::<Vec<_>>(),
            vec!["Place"]
        );
        assert_eq!(
            pruned.object_types["Place"].iter().collect::<Vec<_>>(),
            vec!["Order"]
        );
        assert!(pruned.relations["Place"].is_empty());
    }

    #[test]
    fn test_decoder_drops_unknown_shapes() {
        let mut decoder = MessageDecoder::new();
        let known = json!({"type": "command", "command": "ACTIVE", "object_type": "Order"});
        assert_eq!(
            decoder.on_next(known).unwrap(),
            vec![RouterMessage::command(Command::Active, "Order")]
        );
        assert!(decoder.on_next(json!({"type": "telemetry"})).unwrap().is_empty());
        assert!(decoder
            .on_next(json!({"type": "command", "command": "PAUSE", "object_type": "Order"}))
            .unwrap()
            .is_empty());
        assert_eq!(decoder.dropped(), 2);
    }

    #[test]
    fn test_decode_error_kind() {
        let err = decode_message(json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, MiningError::Protocol(_)));
    }
}
