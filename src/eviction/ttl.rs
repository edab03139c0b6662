//! TTL eviction (spec §4.3): a min-heap keyed by expiry. Entries without a
//! TTL are never chosen by this path and fall back to FIFO order among
//! themselves.

use super::{EvictionPolicy, EvictionStats};
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet, VecDeque};
use std::time::Duration;

struct State {
    heap: BinaryHeap<Reverse<(i64, u64, String)>>,
    removed: HashSet<String>,
    with_ttl: HashSet<String>,
    no_ttl_queue: VecDeque<String>,
    no_ttl_present: HashSet<String>,
    next_seq: u64,
}

impl State {
    fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            removed: HashSet::new(),
            with_ttl: HashSet::new(),
            no_ttl_queue: VecDeque::new(),
            no_ttl_present: HashSet::new(),
            next_seq: 0,
        }
    }
}

/// Evicts the resident key with the earliest expiry; entries lacking a TTL
/// are evicted in FIFO order only once no TTL-bearing key remains.
pub struct TtlPolicy {
    state: Mutex<State>,
}

impl TtlPolicy {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::new()),
        }
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl EvictionPolicy for TtlPolicy {
    fn record_add(&self, key: &str, ttl: Option<Duration>) {
        let mut state = self.state.lock();
        match ttl {
            Some(ttl) => {
                let expires_at = crate::entry::now_ms() + ttl.as_millis() as i64;
                let seq = state.next_seq;
                state.next_seq += 1;
                state.with_ttl.insert(key.to_string());
                state.heap.push(Reverse((expires_at, seq, key.to_string())));
            }
            None => {
                if state.no_ttl_present.insert(key.to_string()) {
                    state.no_ttl_queue.push_back(key.to_string());
                }
            }
        }
    }

    fn record_access(&self, _key: &str) {
        // Access does not change expiry-order victim selection.
    }

    fn remove_key(&self, key: &str) {
        let mut state = self.state.lock();
        if state.with_ttl.remove(key) {
            state.removed.insert(key.to_string());
        }
        if state.no_ttl_present.remove(key) {
            state.no_ttl_queue.retain(|k| k != key);
        }
    }

    fn get_eviction_key(&self) -> Option<String> {
        let mut state = self.state.lock();
        while let Some(Reverse((_, _, key))) = state.heap.peek().cloned() {
            if state.removed.contains(&key) || !state.with_ttl.contains(&key) {
                state.heap.pop();
                state.removed.remove(&key);
                continue;
            }
            return Some(key);
        }
        state.no_ttl_queue.front().cloned()
    }

    fn clear(&self) {
        *self.state.lock() = State::new();
    }

    fn stats(&self) -> EvictionStats {
        let state = self.state.lock();
        EvictionStats {
            resident: state.with_ttl.len() + state.no_ttl_present.len(),
        }
    }

    fn name(&self) -> &'static str {
        "ttl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_earliest_expiry_first() {
        let policy = TtlPolicy::new();
        policy.record_add("a", Some(Duration::from_secs(10)));
        policy.record_add("b", Some(Duration::from_millis(1)));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(policy.get_eviction_key().as_deref(), Some("b"));
    }

    #[test]
    fn no_ttl_entries_fall_back_to_fifo() {
        let policy = TtlPolicy::new();
        policy.record_add("a", None);
        policy.record_add("b", None);
        assert_eq!(policy.get_eviction_key().as_deref(), Some("a"));
    }

    #[test]
    fn ttl_entries_take_priority_over_no_ttl() {
        let policy = TtlPolicy::new();
        policy.record_add("a", None);
        policy.record_add("b", Some(Duration::from_millis(1)));
        assert_eq!(policy.get_eviction_key().as_deref(), Some("b"));
    }

    #[test]
    fn removed_keys_are_skipped() {
        let policy = TtlPolicy::new();
        policy.record_add("a", Some(Duration::from_millis(1)));
        policy.record_add("b", Some(Duration::from_secs(10)));
        policy.remove_key("a");
        assert_eq!(policy.get_eviction_key().as_deref(), Some("b"));
    }
}
