//! Serialize maps with tuple keys as sequences of `[key, value]` pairs.
//!
//! JSON objects only take string keys, so `(activity, activity) -> f` maps
//! are written as `[[["A","B"], 2], ...]`. Use with
//! `#[serde(with = "crate::serde_pairs")]`.

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use std::collections::BTreeMap;

pub fn serialize<K, V, S>(map: &BTreeMap<K, V>, serializer: S) -> Result<S::Ok, S::Error>
where
    K: Serialize,
    V: Serialize,
    S: Serializer,
{
    serializer.collect_seq(map.iter())
}

pub fn deserialize<'de, K, V, D>(deserializer: D) -> Result<BTreeMap<K, V>, D::Error>
where
    K: Deserialize<'de> + Ord,
    V: Deserialize<'de>,
    D: Deserializer<'de>,
{
    let pairs = Vec::<(K, V)>::deserialize(deserializer)?;
    Ok(pairs.into_iter().collect())
}

/// Same encoding, for a map nested one level: `outer -> (pair -> value)`.
pub mod nested {
    use super::*;

    struct Pairs<'a, K, V>(&'a BTreeMap<K, V>);

    impl<K: Serialize, V: Serialize> Serialize for Pairs<'_, K, V> {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.collect_seq(self.0.iter())
        }
    }

    pub fn serialize<O, K, V, S>(
        map: &BTreeMap<O, BTreeMap<K, V>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        O: Serialize + Ord,
        K: Serialize,
        V: Serialize,
        S: Serializer,
    {
        serializer.collect_map(map.iter().map(|(k, inner)| (k, Pairs(inner))))
    }

    pub fn deserialize<'de, O, K, V, D>(
        deserializer: D,
    ) -> Result<BTreeMap<O, BTreeMap<K, V>>, D::Error>
    where
        O: Deserialize<'de> + Ord,
        K: Deserialize<'de> + Ord,
        V: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<O, Vec<(K, V)>>::deserialize(deserializer)?;
        Ok(raw
            .into_iter()
            .map(|(k, pairs)| (k, pairs.into_iter().collect()))
            .collect())
    }
}
