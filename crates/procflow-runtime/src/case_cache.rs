//! Bounded per-case state with least-recently-used eviction.

use lru::LruCache;
use procflow_core::{MiningError, Result};
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Per-case values; touching a case makes it most recent. Inserting a new
/// case into a full cache evicts the least recently used one.
pub struct CaseCache<V> {
    entries: LruCache<Arc<str>, V>,
}

impl<V> CaseCache<V> {
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| MiningError::config("case cache capacity must be at least 1"))?;
        Ok(Self {
            entries: LruCache::new(capacity),
        })
    }

    /// Look up without touching.
    pub fn peek(&self, case_id: &str) -> Option<&V> {
        self.entries.peek(case_id)
    }

    pub fn contains(&self, case_id: &str) -> bool {
        self.entries.contains(case_id)
    }

    /// Look up and mark as most recently used.
    pub fn get_mut(&mut self, case_id: &str) -> Option<&mut V> {
        self.entries.get_mut(case_id)
    }

    /// Insert or replace; returns the case evicted to make room.
    pub fn insert(&mut self, case_id: &str, value: V) -> Option<(Arc<str>, V)> {
        if let Some(current) = self.entries.get_mut(case_id) {
            *current = value;
            return None;
        }
        self.entries.push(Arc::from(case_id), value)
    }

    pub fn remove(&mut self, case_id: &str) -> Option<V> {
        self.entries.pop(case_id)
    }

    /// Cases from least to most recently used.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().rev().map(|(key, value)| (key.as_ref(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }
}
