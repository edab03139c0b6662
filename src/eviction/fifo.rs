//! First-in-first-out eviction (spec §4.3): an insertion-order queue, no
//! reordering on access.

use super::{EvictionPolicy, EvictionStats};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;

struct State {
    queue: VecDeque<String>,
    present: HashSet<String>,
}

/// Evicts the oldest-inserted key still resident.
pub struct FifoPolicy {
    state: Mutex<State>,
}

impl FifoPolicy {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                present: HashSet::new(),
            }),
        }
    }
}

impl Default for FifoPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl EvictionPolicy for FifoPolicy {
    fn record_add(&self, key: &str, _ttl: Option<Duration>) {
        let mut state = self.state.lock();
        if state.present.insert(key.to_string()) {
            state.queue.push_back(key.to_string());
        }
    }

    fn record_access(&self, _key: &str) {
        // FIFO ignores access order by design.
    }

    fn remove_key(&self, key: &str) {
        let mut state = self.state.lock();
        if state.present.remove(key) {
            state.queue.retain(|k| k != key);
        }
    }

    fn get_eviction_key(&self) -> Option<String> {
        self.state.lock().queue.front().cloned()
    }

    fn clear(&self) {
        let mut state = self.state.lock();
        state.queue.clear();
        state.present.clear();
    }

    fn stats(&self) -> EvictionStats {
        EvictionStats {
            resident: self.state.lock().present.len(),
        }
    }

    fn name(&self) -> &'static str {
        "fifo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_insert_regardless_of_access() {
        let policy = FifoPolicy::new();
        policy.record_add("a", None);
        policy.record_add("b", None);
        policy.record_access("a");
        assert_eq!(policy.get_eviction_key().as_deref(), Some("a"));
    }

    #[test]
    fn removal_advances_front() {
        let policy = FifoPolicy::new();
        policy.record_add("a", None);
        policy.record_add("b", None);
        policy.remove_key("a");
        assert_eq!(policy.get_eviction_key().as_deref(), Some("b"));
    }
}
