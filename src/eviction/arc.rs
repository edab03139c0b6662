//! Adaptive Replacement Cache eviction (spec §4.3): four lists (T1 recency,
//! T2 frequency, and their ghost histories B1/B2) with an adaptively tuned
//! split `p` between them, after Megiddo & Modha's ARC.

use super::{EvictionPolicy, EvictionStats};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;

struct State {
    t1: VecDeque<String>,
    t2: VecDeque<String>,
    b1: VecDeque<String>,
    b2: VecDeque<String>,
    t1_set: HashSet<String>,
    t2_set: HashSet<String>,
    b1_set: HashSet<String>,
    b2_set: HashSet<String>,
    /// Target size of T1; adapts between 0 and `capacity`.
    p: f64,
    /// High-water mark of resident keys, used in place of an externally
    /// configured capacity (this policy isn't told the engine's bound).
    capacity: usize,
}

impl State {
    fn new() -> Self {
        Self {
            t1: VecDeque::new(),
            t2: VecDeque::new(),
            b1: VecDeque::new(),
            b2: VecDeque::new(),
            t1_set: HashSet::new(),
            t2_set: HashSet::new(),
            b1_set: HashSet::new(),
            b2_set: HashSet::new(),
            p: 0.0,
            capacity: 0,
        }
    }

    fn remove_everywhere(&mut self, key: &str) {
        if self.t1_set.remove(key) {
            self.t1.retain(|k| k != key);
        }
        if self.t2_set.remove(key) {
            self.t2.retain(|k| k != key);
        }
        if self.b1_set.remove(key) {
            self.b1.retain(|k| k != key);
        }
        if self.b2_set.remove(key) {
            self.b2.retain(|k| k != key);
        }
    }

    fn trim_ghosts(&mut self) {
        let cap = self.capacity.max(1);
        while self.b1.len() + self.b2.len() > cap {
            if self.b1.len() > self.b2.len() {
                if let Some(k) = self.b1.pop_front() {
                    self.b1_set.remove(&k);
                }
            } else if let Some(k) = self.b2.pop_front() {
                self.b2_set.remove(&k);
            } else {
                break;
            }
        }
    }
}

/// Evicts according to the ARC adaptive replacement rule, favoring
/// whichever of T1/T2 currently exceeds its adaptive target share `p`.
pub struct ArcPolicy {
    state: Mutex<State>,
}

impl ArcPolicy {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::new()),
        }
    }
}

impl Default for ArcPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl EvictionPolicy for ArcPolicy {
    fn record_add(&self, key: &str, _ttl: Option<Duration>) {
        let mut state = self.state.lock();

        if state.b1_set.contains(key) {
            let b1_len = state.b1.len().max(1) as f64;
            let b2_len = state.b2.len() as f64;
            state.p = (state.p + (b2_len / b1_len).max(1.0)).min(state.capacity as f64);
            state.remove_everywhere(key);
            state.t2_set.insert(key.to_string());
            state.t2.push_back(key.to_string());
        } else if state.b2_set.contains(key) {
            let b2_len = state.b2.len().max(1) as f64;
            let b1_len = state.b1.len() as f64;
            state.p = (state.p - (b1_len / b2_len).max(1.0)).max(0.0);
            state.remove_everywhere(key);
            state.t2_set.insert(key.to_string());
            state.t2.push_back(key.to_string());
        } else if !state.t1_set.contains(key) && !state.t2_set.contains(key) {
            state.t1_set.insert(key.to_string());
            state.t1.push_back(key.to_string());
        }

        state.capacity = state.capacity.max(state.t1.len() + state.t2.len());
        state.trim_ghosts();
    }

    fn record_access(&self, key: &str) {
        let mut state = self.state.lock();
        if state.t1_set.remove(key) {
            state.t1.retain(|k| k != key);
            state.t2_set.insert(key.to_string());
            state.t2.push_back(key.to_string());
        } else if state.t2_set.remove(key) {
            state.t2.retain(|k| k != key);
            state.t2_set.insert(key.to_string());
            state.t2.push_back(key.to_string());
        }
    }

    fn remove_key(&self, key: &str) {
        self.state.lock().remove_everywhere(key);
    }

    /// A capacity eviction moves the victim into its corresponding ghost
    /// list (T1 → B1, T2 → B2) instead of forgetting it outright, so
    /// [`Self::record_add`] can later recognize a returning key and adapt
    /// `p` toward whichever list has been proven to need more room.
    fn record_eviction(&self, key: &str) {
        let mut state = self.state.lock();
        if state.t1_set.remove(key) {
            state.t1.retain(|k| k != key);
            state.b1_set.insert(key.to_string());
            state.b1.push_back(key.to_string());
        } else if state.t2_set.remove(key) {
            state.t2.retain(|k| k != key);
            state.b2_set.insert(key.to_string());
            state.b2.push_back(key.to_string());
        }
        state.trim_ghosts();
    }

    fn get_eviction_key(&self) -> Option<String> {
        let state = self.state.lock();
        let favor_t1 = !state.t1.is_empty() && (state.t1.len() as f64) > state.p;
        if favor_t1 {
            state.t1.front().cloned()
        } else {
            state.t2.front().cloned().or_else(|| state.t1.front().cloned())
        }
    }

    fn clear(&self) {
        *self.state.lock() = State::new();
    }

    fn stats(&self) -> EvictionStats {
        let state = self.state.lock();
        EvictionStats {
            resident: state.t1.len() + state.t2.len(),
        }
    }

    fn name(&self) -> &'static str {
        "arc"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newly_added_keys_live_in_t1_and_evict_lru_first() {
        let policy = ArcPolicy::new();
        policy.record_add("a", None);
        policy.record_add("b", None);
        assert_eq!(policy.get_eviction_key().as_deref(), Some("a"));
    }

    #[test]
    fn repeated_access_promotes_into_t2() {
        let policy = ArcPolicy::new();
        policy.record_add("a", None);
        policy.record_add("b", None);
        policy.record_access("a");
        assert_eq!(policy.stats().resident, 2);
        // "a" promoted to T2, so T1 now only holds "b".
        let victim = policy.get_eviction_key().unwrap();
        assert_eq!(victim, "b");
    }

    #[test]
    fn removal_drops_key_from_all_lists() {
        let policy = ArcPolicy::new();
        policy.record_add("a", None);
        policy.remove_key("a");
        assert_eq!(policy.stats().resident, 0);
        assert!(policy.get_eviction_key().is_none());
    }

    #[test]
    fn eviction_then_reinsertion_adapts_the_t1_t2_split() {
        let policy = ArcPolicy::new();
        policy.record_add("a", None);
        policy.record_add("b", None);

        let victim = policy.get_eviction_key().unwrap();
        assert_eq!(victim, "a");
        policy.record_eviction(&victim);
        assert!(policy.state.lock().b1_set.contains("a"));

        let p_before = policy.state.lock().p;
        policy.record_add("a", None);
        let p_after = policy.state.lock().p;

        assert_ne!(p_before, p_after);
        // A hit in B1 promotes the key straight into T2, not back into T1.
        assert!(policy.state.lock().t2_set.contains("a"));
        assert!(!policy.state.lock().b1_set.contains("a"));
    }
}
