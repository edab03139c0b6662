//! Session-scoped persistent engine (spec §4.2): same shape as
//! [`local_persistent`](super::local_persistent), bound to a session
//! lifetime instead of a durable-across-restarts one. Kept as its own
//! type (rather than a thin wrapper) since the two stores are backed by
//! genuinely distinct host APIs in a real embedding.

use super::size_cache::SizeCache;
use super::ttl_wrapper::{self, Unwrapped};
use super::StorageEngine;
use crate::entry::now_ms;
use crate::error::{CacheError, Result};
use crate::memory_manager::MemoryReporter;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const KEY_PREFIX: &str = "ldesign_session_";
const DEFAULT_MAX_SIZE_BYTES: u64 = 5 * 1024 * 1024;

pub struct SessionPersistentEngine {
    store: DashMap<String, String>,
    size_cache: SizeCache,
    used_size: AtomicU64,
    max_size_bytes: u64,
    reporter: Option<Arc<dyn MemoryReporter>>,
}

impl SessionPersistentEngine {
    pub fn new(max_size_bytes: u64, reporter: Option<Arc<dyn MemoryReporter>>) -> Self {
        Self {
            store: DashMap::new(),
            size_cache: SizeCache::default(),
            used_size: AtomicU64::new(0),
            max_size_bytes,
            reporter,
        }
    }

    fn storage_key(key: &str) -> String {
        format!("{KEY_PREFIX}{key}")
    }

    fn report_delta(&self, delta: i64) {
        if delta != 0 {
            if let Some(reporter) = &self.reporter {
                reporter.report_delta(self.name(), delta);
            }
        }
    }

    fn remove_locked(&self, key: &str) {
        if let Some((_, stored)) = self.store.remove(&Self::storage_key(key)) {
            let size = self.size_cache.size_of(&stored) as u64;
            self.used_size.fetch_sub(size, Ordering::Relaxed);
            self.report_delta(-(size as i64));
        }
    }
}

impl Default for SessionPersistentEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE_BYTES, None)
    }
}

#[async_trait]
impl StorageEngine for SessionPersistentEngine {
    async fn set_item(&self, key: &str, text_value: &str, ttl_ms: Option<i64>) -> Result<()> {
        let now = now_ms();
        let stored = ttl_wrapper::wrap(text_value, ttl_ms, now);
        let new_size = self.size_cache.size_of(&stored) as u64;

        let storage_key = Self::storage_key(key);
        let old_size = self
            .store
            .get(&storage_key)
            .map(|v| self.size_cache.size_of(&v) as u64);

        let used_without_old = self.used_size.load(Ordering::Relaxed) - old_size.unwrap_or(0);
        if used_without_old + new_size > self.max_size_bytes {
            return Err(CacheError::quota_exceeded(format!(
                "session persistent store quota exceeded storing {new_size} bytes"
            )));
        }

        if let Some(old) = old_size {
            self.used_size.fetch_sub(old, Ordering::Relaxed);
            self.report_delta(-(old as i64));
        }
        self.store.insert(storage_key, stored);
        self.used_size.fetch_add(new_size, Ordering::Relaxed);
        self.report_delta(new_size as i64);
        Ok(())
    }

    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        let storage_key = Self::storage_key(key);
        let Some(stored) = self.store.get(&storage_key).map(|v| v.clone()) else {
            return Ok(None);
        };
        match ttl_wrapper::unwrap(&stored, now_ms()) {
            Unwrapped::Plain(v) | Unwrapped::Valid(v) => Ok(Some(v)),
            Unwrapped::Expired | Unwrapped::Corrupt => {
                drop(stored);
                self.remove_locked(key);
                Ok(None)
            }
        }
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.remove_locked(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let total = self.used_size.swap(0, Ordering::Relaxed);
        self.store.clear();
        self.report_delta(-(total as i64));
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let now = now_ms();
        let mut live = Vec::new();
        for entry in self.store.iter() {
            let logical = entry.key().trim_start_matches(KEY_PREFIX);
            if !matches!(ttl_wrapper::unwrap(entry.value(), now), Unwrapped::Expired) {
                live.push(logical.to_string());
            }
        }
        Ok(live)
    }

    async fn has_item(&self, key: &str) -> Result<bool> {
        Ok(self.get_item(key).await?.is_some())
    }

    async fn length(&self) -> Result<usize> {
        Ok(self.store.len())
    }

    async fn cleanup(&self) -> Result<()> {
        let now = now_ms();
        let expired: Vec<String> = self
            .store
            .iter()
            .filter(|e| matches!(ttl_wrapper::unwrap(e.value(), now), Unwrapped::Expired))
            .map(|e| e.key().trim_start_matches(KEY_PREFIX).to_string())
            .collect();
        for key in expired {
            self.remove_locked(&key);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sessionPersistent"
    }

    fn available(&self) -> bool {
        true
    }

    fn max_size(&self) -> u64 {
        self.max_size_bytes
    }

    fn used_size(&self) -> u64 {
        self.used_size.load(Ordering::Relaxed)
    }
}
