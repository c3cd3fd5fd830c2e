//! Object-type router.
//!
//! Demultiplexes a stream of object-centric events by object type. Each
//! type that is allowed gets its own miner, kept alive while a lossy counter
//! over types still tracks it. The router's output interleaves the per-type
//! nets with lifecycle commands and the shared AER model:
//!
//! ```text
//! UNKNOWN -> LIVE -> (ACTIVE <-> INACTIVE) -> DEREGISTERED
//! ```
//!
//! A deregistered type that shows up again starts over as a fresh miner.

use crate::aer::AerMiner;
use crate::heuristics::{HeuristicsMiner, MinerConfig};
use crate::lossy::LossyCounter;
use crate::mapper::Mapper;
use procflow_core::error::{check_epsilon, check_unit_interval};
use procflow_core::{
    AerModel, FxIndexMap, HeuristicsNet, MiningError, ObjectCentricEvent, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Lifecycle command for one object type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Command {
    Active,
    Inactive,
    Deregister,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Active => "ACTIVE",
            Command::Inactive => "INACTIVE",
            Command::Deregister => "DEREGISTER",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message emitted by the router and consumed by the merger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RouterMessage {
    Dfg {
        object_type: String,
        model: HeuristicsNet,
    },
    Aer {
        model: AerModel,
    },
    Command {
        command: Command,
        object_type: String,
    },
}

impl RouterMessage {
    pub fn command(command: Command, object_type: impl Into<String>) -> Self {
        RouterMessage::Command {
            command,
            object_type: object_type.into(),
        }
    }

    pub fn object_type(&self) -> Option<&str> {
        match self {
            RouterMessage::Dfg { object_type, .. } | RouterMessage::Command { object_type, .. } => {
                Some(object_type)
            }
            RouterMessage::Aer { .. } => None,
        }
    }
}

/// A per-type miner: flattened events in, heuristics nets out.
pub type BoxedMiner = Box<dyn Mapper<ObjectCentricEvent, Output = HeuristicsNet>>;

/// Builds a fresh miner each time a type goes live.
pub type MinerFactory = Arc<dyn Fn() -> Result<BoxedMiner> + Send + Sync>;

/// Factory producing [`HeuristicsMiner`]s with `config`.
pub fn heuristics_factory(config: MinerConfig) -> MinerFactory {
    Arc::new(move || -> Result<BoxedMiner> { Ok(Box::new(HeuristicsMiner::new(config)?)) })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Error bound of the lossy counter over object types.
    pub object_epsilon: f64,
    /// Relative frequency at which a live type becomes active.
    pub object_emit_threshold: f64,
    pub aer_epsilon: f64,
    pub aer_update_every: u64,
    /// Miner used for every type unless a control-flow map says otherwise.
    pub miner: MinerConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            object_epsilon: 0.01,
            object_emit_threshold: 0.0,
            aer_epsilon: 0.01,
            aer_update_every: 1,
            miner: MinerConfig::default(),
        }
    }
}

impl RouterConfig {
    pub fn validate(&self) -> Result<()> {
        check_epsilon("object_epsilon", self.object_epsilon)?;
        check_unit_interval("object_emit_threshold", self.object_emit_threshold)?;
        check_epsilon("aer_epsilon", self.aer_epsilon)?;
        self.miner.validate()
    }
}

struct LiveType {
    miner: BoxedMiner,
    active: bool,
}

pub struct ObjectTypeRouter {
    config: RouterConfig,
    types: LossyCounter<String>,
    live: FxIndexMap<String, LiveType>,
    /// `None` in dynamic mode: every type gets the default miner.
    control_flow: Option<BTreeMap<String, MinerFactory>>,
    default_factory: MinerFactory,
    aer: AerMiner,
}

impl std::fmt::Debug for ObjectTypeRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectTypeRouter")
            .field("live_types", &self.live.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ObjectTypeRouter {
    /// Dynamic mode: every object type is mined.
    pub fn new(config: RouterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            types: LossyCounter::with_epsilon(config.object_epsilon)?,
            live: FxIndexMap::default(),
            control_flow: None,
            default_factory: heuristics_factory(config.miner),
            aer: AerMiner::new(config.aer_epsilon, config.aer_update_every)?,
            config,
        })
    }

    /// Static mode: only the listed types are mined, each with its own factory.
    pub fn with_control_flow(
        config: RouterConfig,
        control_flow: BTreeMap<String, MinerFactory>,
    ) -> Result<Self> {
        if control_flow.is_empty() {
            return Err(MiningError::config(
                "control_flow must list at least one object type",
            ));
        }
        let mut router = Self::new(config)?;
        router.control_flow = Some(control_flow);
        Ok(router)
    }

    /// Static mode with the default miner for each listed type.
    pub fn for_types<I, S>(config: RouterConfig, types: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let factory = heuristics_factory(config.miner);
        let control_flow = types
            .into_iter()
            .map(|t| (t.into(), Arc::clone(&factory)))
            .collect();
        Self::with_control_flow(config, control_flow)
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn is_live(&self, object_type: &str) -> bool {
        self.live.contains_key(object_type)
    }

    pub fn is_active(&self, object_type: &str) -> bool {
        self.live.get(object_type).is_some_and(|t| t.active)
    }

    /// Live types in order of first appearance.
    pub fn live_types(&self) -> impl Iterator<Item = &str> {
        self.live.keys().map(String::as_str)
    }

    pub fn active_count(&self) -> usize {
        self.live.values().filter(|t| t.active).count()
    }

    /// Estimated relative frequency of a type.
    pub fn relative_frequency(&self, object_type: &str) -> f64 {
        self.types.relative_frequency(object_type)
    }

    fn factory_for(&self, object_type: &str) -> Option<&MinerFactory> {
        match &self.control_flow {
            None => Some(&self.default_factory),
            Some(map) => map.get(object_type),
        }
    }

    pub fn route(&mut self, event: &ObjectCentricEvent) -> Result<Vec<RouterMessage>> {
        event.validate()?;
        let mut out = Vec::new();
        let mut evicted = Vec::new();

        self.types.tick();
        for flat in event.flatten() {
            let Some(object_type) = flat.single_type().map(str::to_string) else {
                continue;
            };
            evicted.extend(self.types.count(object_type.clone()));

            if !self.live.contains_key(&object_type) {
                let Some(factory) = self.factory_for(&object_type) else {
                    continue;
                };
                let miner = factory()?;
                info!(object_type = %object_type, "Object type registered");
                self.live.insert(
                    object_type.clone(),
                    LiveType {
                        miner,
                        active: false,
                    },
                );
            }

            if let Some(live) = self.live.get_mut(&object_type) {
                for single in flat.explode() {
                    for model in live.miner.on_next(single)? {
                        out.push(RouterMessage::Dfg {
                            object_type: object_type.clone(),
                            model,
                        });
                    }
                }
            }
        }

        // Types are swept once per event, after every flattened event is routed.
        evicted.extend(self.types.sweep_if_due());
        for object_type in evicted {
            if self.live.shift_remove(&object_type).is_some() {
                info!(object_type = %object_type, "Object type deregistered");
                out.push(RouterMessage::command(Command::Deregister, object_type));
            } else {
                debug!(object_type = %object_type, "Untracked object type evicted");
            }
        }

        let threshold = self.config.object_emit_threshold;
        for (object_type, live) in self.live.iter_mut() {
            let frequency = self.types.relative_frequency(object_type.as_str());
            let command = match (live.active, frequency >= threshold) {
                (false, true) => Command::Active,
                (true, false) => Command::Inactive,
                _ => continue,
            };
            live.active = command == Command::Active;
            info!(object_type = %object_type, frequency, command = %command, "Object type transition");
            out.push(RouterMessage::command(command, object_type.clone()));
        }

        if let Some(model) = self.aer.observe(event)? {
            out.push(RouterMessage::Aer { model });
        }
        Ok(out)
    }
}

impl Mapper<ObjectCentricEvent> for ObjectTypeRouter {
    type Output = RouterMessage;

    fn on_next(&mut self, event: ObjectCentricEvent) -> Result<Vec<RouterMessage>> {
        self.route(&event)
    }

    fn on_complete(&mut self) -> Result<Vec<RouterMessage>> {
        let mut out = Vec::new();
        for (object_type, live) in self.live.iter_mut() {
            for model in live.miner.on_complete()? {
                out.push(RouterMessage::Dfg {
                    object_type: object_type.clone(),
                    model,
                });
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn oce(index: i64, activity: &str, objects: &[(&str, &[&str])]) -> ObjectCentricEvent {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let mut event =
            ObjectCentricEvent::new(format!("e{}", index), activity, base + Duration::minutes(index));
        for (object_type, ids) in objects {
            event = event.with_objects(*object_type, ids.iter().copied());
        }
        event
    }

    fn commands(messages: &[RouterMessage]) -> Vec<(Command, String)> {
        messages
            .iter()
            .filter_map(|m| match m {
                RouterMessage::Command {
                    command,
                    object_type,
                } => Some((*command, object_type.clone())),
                _ => None,
            })
            .collect()
    }

    fn config(object_epsilon: f64) -> RouterConfig {
        RouterConfig {
            object_epsilon,
            object_emit_threshold: 0.2,
            aer_epsilon: 0.1,
            aer_update_every: 1,
            miner: MinerConfig {
                dependency_threshold: 0.0,
                ..MinerConfig::default()
            },
        }
    }

    #[test]
    fn test_new_type_goes_live_and_active() {
        let mut router = ObjectTypeRouter::new(config(0.1)).unwrap();
        let out = router
            .route(&oce(0, "Create", &[("Order", &["o1"])]))
            .unwrap();

        assert!(router.is_live("Order"));
        assert!(router.is_active("Order"));
        assert_eq!(commands(&out), vec![(Command::Active, "Order".to_string())]);
        assert!(matches!(out.first(), Some(RouterMessage::Dfg { .. })));
        assert!(matches!(out.last(), Some(RouterMessage::Aer { .. })));
    }

    #[test]
    fn test_rare_type_deregistered() {
        let mut router = ObjectTypeRouter::new(config(0.1)).unwrap();
        let mut deregistered_at = None;
        for i in 0..100 {
            let event = if i == 0 {
                oce(i, "Place", &[("Order", &["o1"]), ("Gift", &["g1"])])
            } else {
                oce(i, "Update", &[("Order", &["o1"])])
            };
            let out = router.route(&event).unwrap();
            for (command, object_type) in commands(&out) {
                if command == Command::Deregister {
                    assert_eq!(object_type, "Gift");
                    assert!(deregistered_at.is_none());
                    deregistered_at = Some(i);
                }
            }
        }
        // Tenth event closes the first bucket.
        assert_eq!(deregistered_at, Some(9));
        assert!(!router.is_live("Gift"));
        assert!(router.is_live("Order"));
    }

    #[test]
    fn test_active_inactive_transitions() {
        let mut router = ObjectTypeRouter::new(RouterConfig {
            object_emit_threshold: 0.5,
            ..config(0.01)
        })
        .unwrap();
        let mut seen = Vec::new();
        seen.extend(commands(
            &router.route(&oce(0, "A", &[("Item", &["i1"])])).unwrap(),
        ));
        for i in 1..4 {
            seen.extend(commands(
                &router.route(&oce(i, "B", &[("Order", &["o1"])])).unwrap(),
            ));
        }
        assert_eq!(
            seen,
            vec![
                (Command::Active, "Item".to_string()),
                (Command::Active, "Order".to_string()),
                (Command::Inactive, "Item".to_string()),
            ]
        );
        assert!(router.is_live("Item"));
        assert_eq!(router.active_count(), 1);
    }

    #[test]
    fn test_reappearing_type_starts_fresh() {
        let mut router = ObjectTypeRouter::new(config(0.5)).unwrap();
        router.route(&oce(0, "A", &[("Gift", &["g1"])])).unwrap();
        let out = router.route(&oce(1, "B", &[("Order", &["o1"])])).unwrap();
        assert_eq!(commands(&out)[0], (Command::Deregister, "Gift".to_string()));

        router.route(&oce(2, "C", &[("Gift", &["g1"])])).unwrap();
        assert!(router.is_live("Gift"));
    }

    #[test]
    fn test_type_counted_once_per_event() {
        let mut router = ObjectTypeRouter::new(config(0.34)).unwrap();
        let events = [
            oce(0, "W", &[("A", &["a1"])]),
            oce(1, "W", &[("B", &["b1"])]),
            oce(2, "X", &[("A", &["a1"]), ("B", &["b1"])]),
            oce(3, "Y", &[("B", &["b1"])]),
        ];
        let mut last_b_net = None;
        for event in &events {
            let out = router.route(event).unwrap();
            assert!(commands(&out).iter().all(|(c, _)| *c != Command::Deregister));
            for message in out {
                if let RouterMessage::Dfg { object_type, model } = message {
                    if object_type == "B" {
                        last_b_net = Some(model);
                    }
                }
            }
        }

        assert!(router.is_live("A"));
        assert!(router.is_live("B"));
        assert!((router.relative_frequency("B") - 0.75).abs() < 1e-9);
        let net = last_b_net.unwrap();
        assert_eq!(net.edge("X", "Y").unwrap().frequency, 1);
    }

    #[test]
    fn test_static_control_flow_restricts_types() {
        let mut router = ObjectTypeRouter::for_types(config(0.1), ["Order"]).unwrap();
        let out = router
            .route(&oce(0, "Place", &[("Order", &["o1"]), ("Item", &["i1"])]))
            .unwrap();
        assert!(router.is_live("Order"));
        assert!(!router.is_live("Item"));
        assert!(out
            .iter()
            .filter_map(RouterMessage::object_type)
            .all(|t| t == "Order"));
    }

    #[test]
    fn test_empty_control_flow_rejected() {
        let err = ObjectTypeRouter::with_control_flow(config(0.1), BTreeMap::new()).unwrap_err();
        assert!(matches!(err, MiningError::Config(_)));
    }

    #[test]
    fn test_failing_factory_surfaces_error() {
        let factory: MinerFactory =
            Arc::new(|| -> Result<BoxedMiner> { Err(MiningError::config("no miner")) });
        let control_flow = BTreeMap::from([("Order".to_string(), factory)]);
        let mut router = ObjectTypeRouter::with_control_flow(config(0.1), control_flow).unwrap();
        let err = router
            .route(&oce(0, "Place", &[("Order", &["o1"])]))
            .unwrap_err();
        assert_eq!(err, MiningError::config("no miner"));
    }

    #[test]
    fn test_multi_object_events_are_exploded() {
        let mut router = ObjectTypeRouter::new(config(0.1)).unwrap();
        router
            .route(&oce(0, "Pick", &[("Item", &["i1", "i2"])]))
            .unwrap();
        let out = router
            .route(&oce(1, "Pack", &[("Item", &["i1", "i2"])]))
            .unwrap();
        let RouterMessage::Dfg { model, .. } = out
            .iter()
            .filter(|m| matches!(m, RouterMessage::Dfg { .. }))
            .last()
            .unwrap()
        else {
            unreachable!()
        };
        assert_eq!(model.edge("Pick", "Pack").unwrap().frequency, 2);
    }

    #[test]
    fn test_invalid_event_rejected() {
        let mut router = ObjectTypeRouter::new(config(0.1)).unwrap();
        assert!(router.route(&oce(0, "A", &[])).is_err());
    }

    #[test]
    fn test_message_json_shape() {
        let message = RouterMessage::command(Command::Deregister, "Gift");
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "command", "command": "DEREGISTER", "object_type": "Gift"})
        );
        let back: RouterMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, message);
    }
}
