//! A small bounded LRU cache mapping a string to its already-computed
//! UTF-8 byte length (spec §4.2: "a small LRU size-cache (bounded ~1024)
//! amortizes this").

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

pub struct SizeCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

struct Inner {
    sizes: HashMap<String, usize>,
    order: VecDeque<String>,
}

impl SizeCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                sizes: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Byte length of `text`, computed once per distinct string and cached
    /// thereafter.
    pub fn size_of(&self, text: &str) -> usize {
        let mut inner = self.inner.lock();
        if let Some(&size) = inner.sizes.get(text) {
            return size;
        }
        let size = super::utf8_byte_length(text);
        if self.capacity > 0 {
            inner.sizes.insert(text.to_string(), size);
            inner.order.push_back(text.to_string());
            if inner.order.len() > self.capacity {
                if let Some(oldest) = inner.order.pop_front() {
                    inner.sizes.remove(&oldest);
                }
            }
        }
        size
    }
}

impl Default for SizeCache {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_utf8_byte_length() {
        let cache = SizeCache::new(4);
        assert_eq!(cache.size_of("hello"), 5);
        assert_eq!(cache.size_of("héllo"), 6);
    }

    #[test]
    fn evicts_oldest_entry_beyond_capacity() {
        let cache = SizeCache::new(1);
        cache.size_of("a");
        cache.size_of("b");
        let mut inner = cache.inner.lock();
        assert_eq!(inner.sizes.len(), 1);
        assert!(!inner.sizes.contains_key("a"));
        inner.sizes.clear();
    }
}
