//! The routing cache (spec §3.1 "Routing Record", §9 "Routing cache").
//!
//! A bounded LRU mapping a fingerprinted key to the engine currently
//! believed to hold it. Entries are hints only: staleness is tolerated and
//! corrected by falling through to full engine polling on miss.

use parking_lot::Mutex;
use std::collections::HashMap;

struct Node {
    key: String,
    engine: String,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Bounded LRU cache from key to engine name. Uses an arena of nodes
/// indexed by integer with forward/back pointers stored as indices
/// (spec §9's recommendation for doubly-linked-list structures), avoiding
/// ownership cycles.
struct Lru {
    capacity: usize,
    nodes: Vec<Node>,
    free: Vec<usize>,
    index: HashMap<String, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl Lru {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
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

    fn push_front(&mut self, idx: usize) {
        self.nodes[idx].prev = None;
        self.nodes[idx].next = self.head;
        if let Some(h) = self.head {
            self.nodes[h].prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn touch(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.detach(idx);
        self.push_front(idx);
    }

    fn get(&mut self, key: &str) -> Option<String> {
        let idx = *self.index.get(key)?;
        self.touch(idx);
        Some(self.nodes[idx].engine.clone())
    }

    fn put(&mut self, key: String, engine: String) {
        if let Some(&idx) = self.index.get(&key) {
            self.nodes[idx].engine = engine;
            self.touch(idx);
            return;
        }

        let idx = if let Some(free_idx) = self.free.pop() {
            self.nodes[free_idx] = Node {
                key: key.clone(),
                engine,
                prev: None,
                next: None,
            };
            free_idx
        } else {
            self.nodes.push(Node {
                key: key.clone(),
                engine,
                prev: None,
                next: None,
            });
            self.nodes.len() - 1
        };
        self.index.insert(key, idx);
        self.push_front(idx);

        if self.index.len() > self.capacity {
            if let Some(tail) = self.tail {
                let evicted_key = self.nodes[tail].key.clone();
                self.detach(tail);
                self.index.remove(&evicted_key);
                self.free.push(tail);
            }
        }
    }

    fn remove(&mut self, key: &str) {
        if let Some(idx) = self.index.remove(key) {
            self.detach(idx);
            self.free.push(idx);
        }
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.index.clear();
        self.head = None;
        self.tail = None;
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

/// Thread-safe bounded routing cache (key → engine name).
pub struct RoutingCache {
    lru: Mutex<Lru>,
}

impl RoutingCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            lru: Mutex::new(Lru::new(capacity)),
        }
    }

    /// Look up the engine a key is believed to reside in.
    pub fn get(&self, key: &str) -> Option<String> {
        self.lru.lock().get(key)
    }

    /// Record that `key` is (believed to be) held by `engine`.
    pub fn put(&self, key: &str, engine: &str) {
        self.lru.lock().put(key.to_string(), engine.to_string());
    }

    /// Forget a key, e.g. after `remove` or expiry.
    pub fn remove(&self, key: &str) {
        self.lru.lock().remove(key);
    }

    /// Drop every entry — used on `clear()` and emergency cleanup.
    pub fn clear(&self) {
        self.lru.lock().clear();
    }

    /// Current number of tracked keys.
    pub fn len(&self) -> usize {
        self.lru.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
