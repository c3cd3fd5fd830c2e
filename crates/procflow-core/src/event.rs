//! Event types consumed by miners and conformance checkers

use crate::error::{MiningError, Result};
use crate::value::AttributeValue;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// IndexMap with FxBuildHasher for attribute maps.
pub type FxIndexMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Object type -> set of object ids participating in an event.
pub type ObjectMap = BTreeMap<String, BTreeSet<String>>;

/// A shared reference to an Event, cheap to pass between pipeline stages.
pub type SharedEvent = Arc<Event>;

/// The view a case-centric component needs of an event.
///
/// Implemented by simple events and by flattened object-centric events, so the
/// heuristics miner and the conformance checkers run unchanged on both.
pub trait CaseEvent {
    /// Case identifier, or an `InputError` when the event has none.
    fn case_id(&self) -> Result<&str>;

    fn activity(&self) -> &str;

    fn timestamp(&self) -> DateTime<Utc>;

    /// Check the required fields and return `(case_id, activity)`.
    fn require_case_and_activity(&self) -> Result<(&str, &str)> {
        let case_id = self.case_id()?;
        let activity = self.activity();
        if activity.is_empty() {
            return Err(MiningError::input(format!(
                "event of case '{}' has no activity",
                case_id
            )));
        }
        Ok((case_id, activity))
    }
}

/// A simple (single-case) event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub case_id: Arc<str>,
    pub activity: Arc<str>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Process, trace and event attributes.
    #[serde(default)]
    pub attributes: FxIndexMap<String, AttributeValue>,
}

impl Event {
    pub fn new(case_id: impl Into<Arc<str>>, activity: impl Into<Arc<str>>) -> Self {
        Self {
            case_id: case_id.into(),
            activity: activity.into(),
            timestamp: Utc::now(),
            attributes: IndexMap::with_hasher(FxBuildHasher),
        }
    }

    pub fn at(
        case_id: impl Into<Arc<str>>,
        activity: impl Into<Arc<str>>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(case_id, activity).with_timestamp(timestamp)
    }

    pub fn with_timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = ts;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }
}

impl CaseEvent for Event {
    fn case_id(&self) -> Result<&str> {
        if self.case_id.is_empty() {
            return Err(MiningError::input(format!(
                "event '{}' has no case id",
                self.activity
            )));
        }
        Ok(&self.case_id)
    }

    fn activity(&self) -> &str {
        &self.activity
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// An object-centric event (OCE).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectCentricEvent {
    pub event_id: Arc<str>,
    pub activity: Arc<str>,
    pub timestamp: DateTime<Utc>,
    pub omap: ObjectMap,
    #[serde(default)]
    pub vmap: FxIndexMap<String, AttributeValue>,
}

impl ObjectCentricEvent {
    pub fn new(
        event_id: impl Into<Arc<str>>,
        activity: impl Into<Arc<str>>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            activity: activity.into(),
            timestamp,
            omap: BTreeMap::new(),
            vmap: IndexMap::with_hasher(FxBuildHasher),
        }
    }

    /// Add objects of one type. Object ids accumulate across calls.
    pub fn with_objects<I, S>(mut self, object_type: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.omap
            .entry(object_type.into())
            .or_default()
            .extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.vmap.insert(key.into(), value.into());
        self
    }

    pub fn object_types(&self) -> impl Iterator<Item = &str> {
        self.omap.keys().map(String::as_str)
    }

    /// Reject events with an empty omap or an empty object set.
    pub fn validate(&self) -> Result<()> {
        if self.activity.is_empty() {
            return Err(MiningError::input(format!(
                "object-centric event '{}' has no activity",
                self.event_id
            )));
        }
        if self.omap.is_empty() {
            return Err(MiningError::input(format!(
                "object-centric event '{}' references no objects",
                self.event_id
            )));
        }
        if let Some((object_type, _)) = self.omap.iter().find(|(_, ids)| ids.is_empty()) {
            return Err(MiningError::input(format!(
                "object-centric event '{}' lists type '{}' without objects",
                self.event_id, object_type
            )));
        }
        Ok(())
    }

    /// One event per object type, each keeping its full object-id set.
    pub fn flatten(&self) -> Vec<ObjectCentricEvent> {
        self.omap
            .iter()
            .map(|(object_type, ids)| self.restricted(object_type, ids.clone()))
            .collect()
    }

    /// One event per `(object type, object id)`.
    pub fn explode(&self) -> Vec<ObjectCentricEvent> {
        self.omap
            .iter()
            .flat_map(|(object_type, ids)| {
                ids.iter()
                    .map(move |id| self.restricted(object_type, BTreeSet::from([id.clone()])))
            })
            .collect()
    }

    fn restricted(&self, object_type: &str, ids: BTreeSet<String>) -> ObjectCentricEvent {
        ObjectCentricEvent {
            event_id: self.event_id.clone(),
            activity: self.activity.clone(),
            timestamp: self.timestamp,
            omap: BTreeMap::from([(object_type.to_string(), ids)]),
            vmap: self.vmap.clone(),
        }
    }

    /// The single object type of a flattened event.
    pub fn single_type(&self) -> Option<&str> {
        if self.omap.len() == 1 {
            self.omap.keys().next().map(String::as_str)
        } else {
            None
        }
    }

    /// Count of objects of each type, as seen by cardinality inference.
    pub fn object_count(&self, object_type: &str) -> usize {
        self.omap.get(object_type).map_or(0, BTreeSet::len)
    }
}

impl CaseEvent for ObjectCentricEvent {
    fn case_id(&self) -> Result<&str> {
        let mut types = self.omap.iter();
        match (types.next(), types.next()) {
            (Some((_, ids)), None) if ids.len() == 1 => ids
                .iter()
                .next()
                .map(String::as_str)
                .ok_or_else(|| MiningError::input("empty object set")),
            (Some((object_type, ids)), None) => Err(MiningError::input(format!(
                "event '{}' is not flattened: type '{}' has {} objects",
                self.event_id,
                object_type,
                ids.len()
            ))),
            (None, _) => Err(MiningError::input(format!(
                "event '{}' references no objects",
                self.event_id
            ))),
            (Some(_), Some(_)) => Err(MiningError::input(format!(
                "event '{}' is not flattened: {} object types",
                self.event_id,
                self.omap.len()
            ))),
        }
    }

    fn activity(&self) -> &str {
        &self.activity
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn order_event() -> ObjectCentricEvent {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        ObjectCentricEvent::new("e1", "Place Order", ts)
            .with_objects("Order", ["o1"])
            .with_objects("Item", ["i1", "i2"])
    }

    #[test]
    fn test_simple_event_case_id() {
        let event = Event::new("c1", "A");
        assert_eq!(event.case_id().unwrap(), "c1");
        assert_eq!(event.require_case_and_activity().unwrap(), ("c1", "A"));
    }

    #[test]
    fn test_simple_event_missing_fields() {
        assert!(Event::new("", "A").case_id().is_err());
        assert!(Event::new("c1", "").require_case_and_activity().is_err());
    }

    #[test]
    fn test_flatten_one_event_per_type() {
        let flattened = order_event().flatten();
        assert_eq!(flattened.len(), 2);
        assert_eq!(flattened[0].single_type(), Some("Item"));
        assert_eq!(flattened[0].object_count("Item"), 2);
        assert_eq!(flattened[1].single_type(), Some("Order"));
    }

    #[test]
    fn test_flattened_multi_object_is_rejected() {
        let flattened = order_event().flatten();
        assert_eq!(flattened[1].case_id().unwrap(), "o1");
        assert!(flattened[0].case_id().is_err());
    }

    #[test]
    fn test_unflattened_is_rejected() {
        let err = order_event().case_id().unwrap_err();
        assert!(err.to_string().contains("not flattened"));
    }

    #[test]
    fn test_explode_one_event_per_object() {
        let exploded = order_event().explode();
        assert_eq!(exploded.len(), 3);
        let ids: Vec<&str> = exploded.iter().map(|e| e.case_id().unwrap()).collect();
        assert_eq!(ids, vec!["i1", "i2", "o1"]);
    }

    #[test]
    fn test_validate_rejects_empty_omap() {
        let ts = Utc::now();
        assert!(ObjectCentricEvent::new("e", "A", ts).validate().is_err());
        assert!(order_event().validate().is_ok());
    }

    #[test]
    fn test_event_json_shape() {
        let json = r#"{"case_id":"c7","activity":"Ship","timestamp":"2024-01-01T00:00:00Z"}"#;
        let event: Event = serde_json::from_str(json).unwrap();
        assert_eq!(&*event.case_id, "c7");
        assert!(event.attributes.is_empty());
    }
}
