//! Value serialization with cycle detection and a bounded serialization
//! cache (spec §4.1 "Value processing").
//!
//! `serde_json::Value` has no pointer identity and cannot itself contain a
//! cycle once constructed, so cycle detection here operates over the
//! *source* type before it is converted to `Value` — callers that build
//! values from a graph with back-references (the scenario spec §9 "Cyclic
//! value graphs" calls out) detect the cycle through [`CycleGuard`] while
//! walking their own structure and substitute the sentinel themselves.
//! `to_text`/`from_text` handle the textual form and the LRU memoization
//! once a (possibly sentinel-bearing) `Value` exists.

use crate::error::{CacheError, Result};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::warn;

/// Placeholder substituted for the second occurrence of a cyclic
/// reference, per spec §9's "emit a sentinel on second visit" policy.
pub const CYCLE_SENTINEL: &str = "[Circular]";

/// Tracks pointer identities visited while walking a value graph so a
/// second visit can be replaced by [`CYCLE_SENTINEL`] instead of recursing
/// forever.
#[derive(Debug, Default)]
pub struct CycleGuard {
    visiting: Vec<usize>,
}

impl CycleGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a node identified by its address. Returns `false` (and emits
    /// a warning) if this address is already being visited — the caller
    /// should substitute [`CYCLE_SENTINEL`] and not recurse further.
    pub fn enter<T>(&mut self, node: &T) -> bool {
        let addr = node as *const T as usize;
        if self.visiting.contains(&addr) {
            warn!(address = addr, "cycle detected during serialization, substituting sentinel");
            return false;
        }
        self.visiting.push(addr);
        true
    }

    /// Leave the most recently entered node.
    pub fn exit(&mut self) {
        self.visiting.pop();
    }
}

/// Render a `serde_json::Value` to its canonical textual form.
pub fn to_text(value: &serde_json::Value) -> Result<String> {
    serde_json::to_string(value).map_err(CacheError::from)
}

/// Parse a stored textual payload back into a `serde_json::Value`.
pub fn from_text(text: &str) -> Result<serde_json::Value> {
    serde_json::from_str(text).map_err(|e| {
        CacheError::with_internal(
            crate::error::ErrorCode::DeserializationFail,
            "failed to deserialize cached value",
            e.to_string(),
        )
    })
}

fn value_hash(value: &serde_json::Value) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    let digest = hasher.finalize();
    u64::from_le_bytes(digest[0..8].try_into().unwrap())
}

/// Process-wide cache mapping `(shape-fingerprint, value-hash)` to the
/// already-serialized textual form, amortizing repeated serialization of
/// structurally identical values. Bounded with LRU eviction.
pub struct SerializationCache {
    capacity: usize,
    entries: DashMap<(String, u64), String>,
    order: Mutex<VecDeque<(String, u64)>>,
}

impl SerializationCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
        }
    }

    fn key_for(shape: &str, value: &serde_json::Value) -> (String, u64) {
        (shape.to_string(), value_hash(value))
    }

    /// Serialize `value` to text, reusing a cached rendering when the
    /// `(shape, value-hash)` pair has been seen before.
    pub fn serialize(&self, shape: &str, value: &serde_json::Value) -> Result<String> {
        let key = Self::key_for(shape, value);
        if let Some(cached) = self.entries.get(&key) {
            return Ok(cached.clone());
        }
        let text = to_text(value)?;
        self.insert(key, text.clone());
        Ok(text)
    }

    fn insert(&self, key: (String, u64), text: String) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(key.clone(), text).is_none() {
            let mut order = self.order.lock().unwrap();
            order.push_back(key);
            if order.len() > self.capacity {
                if let Some(oldest) = order.pop_front() {
                    self.entries.remove(&oldest);
                }
            }
        }
    }

    /// Number of entries currently cached.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every cached entry — used by the memory manager's emergency
    /// cleanup path.
    pub fn clear(&self) {
        self.entries.clear();
        self.order.lock().unwrap().clear();
    }
}

impl Default for SerializationCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_scalars_and_objects() {
        let value = json!({"name": "A", "count": 3, "tags": [1, 2, 3]});
        let text = to_text(&value).unwrap();
        let back = from_text(&text).unwrap();
        assert_eq!(value, back);
    }

    #[test]
    fn cycle_guard_rejects_revisit() {
        let node = 42u32;
        let mut guard = CycleGuard::new();
        assert!(guard.enter(&node));
        assert!(!guard.enter(&node));
        guard.exit();
        assert!(guard.enter(&node));
    }

    #[test]
    fn serialization_cache_reuses_rendering() {
        let cache = SerializationCache::new(4);
        let value = json!({"a": 1});
        let first = cache.serialize("object", &value).unwrap();
        let second = cache.serialize("object", &value).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn serialization_cache_evicts_oldest() {
        let cache = SerializationCache::new(2);
        cache.serialize("s", &json!(1)).unwrap();
        cache.serialize("s", &json!(2)).unwrap();
        cache.serialize("s", &json!(3)).unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn deserialize_failure_reports_deserialization_fail() {
        let err = from_text("{not json").unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::DeserializationFail);
    }
}
