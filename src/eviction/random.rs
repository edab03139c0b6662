//! Random eviction (spec §4.3): a key array with O(1) swap-remove and a
//! uniformly chosen victim.

use super::{EvictionPolicy, EvictionStats};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;

struct State {
    keys: Vec<String>,
    index: HashMap<String, usize>,
}

impl State {
    fn swap_remove(&mut self, key: &str) {
        if let Some(&idx) = self.index.get(key) {
            let last = self.keys.len() - 1;
            self.keys.swap(idx, last);
            self.keys.pop();
            self.index.remove(key);
            if idx < self.keys.len() {
                self.index.insert(self.keys[idx].clone(), idx);
            }
        }
    }
}

/// Evicts a uniformly random resident key.
pub struct RandomPolicy {
    state: Mutex<State>,
}

impl RandomPolicy {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                keys: Vec::new(),
                index: HashMap::new(),
            }),
        }
    }
}

impl Default for RandomPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl EvictionPolicy for RandomPolicy {
    fn record_add(&self, key: &str, _ttl: Option<Duration>) {
        let mut state = self.state.lock();
        if !state.index.contains_key(key) {
            state.index.insert(key.to_string(), state.keys.len());
            state.keys.push(key.to_string());
        }
    }

    fn record_access(&self, _key: &str) {
        // Access order is irrelevant to uniform random selection.
    }

    fn remove_key(&self, key: &str) {
        self.state.lock().swap_remove(key);
    }

    fn get_eviction_key(&self) -> Option<String> {
        let state = self.state.lock();
        if state.keys.is_empty() {
            return None;
        }
        let idx = rand::thread_rng().gen_range(0..state.keys.len());
        Some(state.keys[idx].clone())
    }

    fn clear(&self) {
        let mut state = self.state.lock();
        state.keys.clear();
        state.index.clear();
    }

    fn stats(&self) -> EvictionStats {
        EvictionStats {
            resident: self.state.lock().keys.len(),
        }
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn victim_is_among_resident_keys() {
        let policy = RandomPolicy::new();
        policy.record_add("a", None);
        policy.record_add("b", None);
        policy.record_add("c", None);
        let victim = policy.get_eviction_key().unwrap();
        assert!(["a", "b", "c"].contains(&victim.as_str()));
    }

    #[test]
    fn swap_remove_keeps_remaining_keys_intact() {
        let policy = RandomPolicy::new();
        policy.record_add("a", None);
        policy.record_add("b", None);
        policy.record_add("c", None);
        policy.remove_key("b");
        assert_eq!(policy.stats().resident, 2);
        for _ in 0..10 {
            let victim = policy.get_eviction_key().unwrap();
            assert_ne!(victim, "b");
        }
    }

    #[test]
    fn empty_state_has_no_victim() {
        let policy = RandomPolicy::new();
        assert!(policy.get_eviction_key().is_none());
    }
}
