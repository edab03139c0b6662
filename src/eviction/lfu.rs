//! Least-frequently-used eviction (spec §4.3): a frequency map ordered by
//! count, tie-broken by insertion order (earliest first).

use super::{EvictionPolicy, EvictionStats};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

struct Entry {
    freq: u64,
    seq: u64,
}

struct State {
    entries: HashMap<String, Entry>,
    ordered: BTreeSet<(u64, u64, String)>,
    next_seq: u64,
}

impl State {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            ordered: BTreeSet::new(),
            next_seq: 0,
        }
    }

    fn bump(&mut self, key: &str) {
        let Some(entry) = self.entries.get_mut(key) else {
            return;
        };
        self.ordered.remove(&(entry.freq, entry.seq, key.to_string()));
        entry.freq += 1;
        self.ordered.insert((entry.freq, entry.seq, key.to_string()));
    }
}

/// Evicts the key with the lowest access frequency.
pub struct LfuPolicy {
    state: Mutex<State>,
}

impl LfuPolicy {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::new()),
        }
    }
}

impl Default for LfuPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl EvictionPolicy for LfuPolicy {
    fn record_add(&self, key: &str, _ttl: Option<Duration>) {
        let mut state = self.state.lock();
        if state.entries.contains_key(key) {
            return;
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(key.to_string(), Entry { freq: 0, seq });
        state.ordered.insert((0, seq, key.to_string()));
    }

    fn record_access(&self, key: &str) {
        self.state.lock().bump(key);
    }

    fn remove_key(&self, key: &str) {
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.remove(key) {
            state.ordered.remove(&(entry.freq, entry.seq, key.to_string()));
        }
    }

    fn get_eviction_key(&self) -> Option<String> {
        self.state.lock().ordered.iter().next().map(|(_, _, k)| k.clone())
    }

    fn clear(&self) {
        *self.state.lock() = State::new();
    }

    fn stats(&self) -> EvictionStats {
        EvictionStats {
            resident: self.state.lock().entries.len(),
        }
    }

    fn name(&self) -> &'static str {
        "lfu"
    }
}
