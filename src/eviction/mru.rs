//! Most-recently-used eviction (spec §4.3): same structure as LRU, but the
//! victim is the most recently touched key (the list tail) rather than the
//! head.

use super::{EvictionPolicy, EvictionStats};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

struct Node {
    key: String,
    prev: Option<usize>,
    next: Option<usize>,
}

struct State {
    nodes: Vec<Node>,
    free: Vec<usize>,
    index: HashMap<String, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl State {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
        }
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = (self.nodes[idx].prev, self.nodes[idx].next);
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
        self.nodes[idx].prev = None;
        self.nodes[idx].next = None;
    }

    fn push_back(&mut self, idx: usize) {
        self.nodes[idx].prev = self.tail;
        self.nodes[idx].next = None;
        if let Some(t) = self.tail {
            self.nodes[t].next = Some(idx);
        }
        self.tail = Some(idx);
        if self.head.is_none() {
            self.head = Some(idx);
        }
    }

    fn move_to_back(&mut self, idx: usize) {
        if self.tail == Some(idx) {
            return;
        }
        self.detach(idx);
        self.push_back(idx);
    }

    fn insert(&mut self, key: &str) {
        if let Some(&idx) = self.index.get(key) {
            self.move_to_back(idx);
            return;
        }
        let idx = if let Some(free_idx) = self.free.pop() {
            self.nodes[free_idx] = Node {
                key: key.to_string(),
                prev: None,
                next: None,
            };
            free_idx
        } else {
            self.nodes.push(Node {
                key: key.to_string(),
                prev: None,
                next: None,
            });
            self.nodes.len() - 1
        };
        self.index.insert(key.to_string(), idx);
        self.push_back(idx);
    }

    fn remove(&mut self, key: &str) {
        if let Some(idx) = self.index.remove(key) {
            self.detach(idx);
            self.free.push(idx);
        }
    }
}

/// Evicts the most-recently-used key: the list tail.
pub struct MruPolicy {
    state: Mutex<State>,
}

impl MruPolicy {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::new()),
        }
    }
}

impl Default for MruPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl EvictionPolicy for MruPolicy {
    fn record_add(&self, key: &str, _ttl: Option<Duration>) {
        self.state.lock().insert(key);
    }

    fn record_access(&self, key: &str) {
        self.state.lock().insert(key);
    }

    fn remove_key(&self, key: &str) {
        self.state.lock().remove(key);
    }

    fn get_eviction_key(&self) -> Option<String> {
        let state = self.state.lock();
        state.tail.map(|idx| state.nodes[idx].key.clone())
    }

    fn clear(&self) {
        *self.state.lock() = State::new();
    }

    fn stats(&self) -> EvictionStats {
        EvictionStats {
            resident: self.state.lock().index.len(),
        }
    }

    fn name(&self) -> &'static str {
        "mru"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_most_recently_accessed() {
        let policy = MruPolicy::new();
        policy.record_add("a", None);
        policy.record_add("b", None);
        policy.record_add("c", None);
        policy.record_access("a");
        assert_eq!(policy.get_eviction_key().as_deref(), Some("a"));
    }

    #[test]
    fn most_recent_insert_is_victim_when_untouched() {
        let policy = MruPolicy::new();
        policy.record_add("a", None);
        policy.record_add("b", None);
        assert_eq!(policy.get_eviction_key().as_deref(), Some("b"));
    }
}
