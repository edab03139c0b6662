//! Browser-local persistent engine (spec §4.2).
//!
//! Stands in for a bridge to a host runtime's durable local key-value
//! store (the browser's `localStorage`, a desktop app's on-disk
//! key-value file, …). All keys are namespaced with `ldesign_cache_` so
//! the engine can coexist with unrelated data in the same store. TTL
//! has no native support here, so it's encoded with the shared
//! [`ttl_wrapper`](super::ttl_wrapper) format.

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

const KEY_PREFIX: &str = "ldesign_cache_";
const DEFAULT_MAX_SIZE_BYTES: u64 = 5 * 1024 * 1024;

pub struct LocalPersistentEngine {
    store: DashMap<String, String>,
    size_cache: SizeCache,
    used_size: AtomicU64,
    max_size_bytes: u64,
    reporter: Option<Arc<dyn MemoryReporter>>,
}

impl LocalPersistentEngine {
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

impl Default for LocalPersistentEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE_BYTES, None)
    }
}

#[async_trait]
impl StorageEngine for LocalPersistentEngine {
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
                "local persistent store quota exceeded storing {new_size} bytes"
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
        "localPersistent"
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_through_ttl_wrapper() {
        let engine = LocalPersistentEngine::default();
        engine.set_item("k", "v", None).await.unwrap();
        assert_eq!(engine.get_item("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn expired_value_reads_as_absent_and_is_removed() {
        let engine = LocalPersistentEngine::default();
        engine.set_item("k", "v", Some(1)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(engine.get_item("k").await.unwrap().is_none());
        assert_eq!(engine.length().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn quota_exceeded_when_store_is_full() {
        let engine = LocalPersistentEngine::new(8, None);
        let err = engine.set_item("k", "way too large a value", None).await.unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::QuotaExceeded);
    }

    #[tokio::test]
    async fn corrupt_wrapper_is_treated_as_absent() {
        let engine = LocalPersistentEngine::default();
        engine
            .store
            .insert(LocalPersistentEngine::storage_key("k"), r#"{"value":"x","expiresAt":"nan"}"#.to_string());
        assert!(engine.get_item("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn keys_are_reported_without_internal_prefix() {
        let engine = LocalPersistentEngine::default();
        engine.set_item("mykey", "v", None).await.unwrap();
        assert_eq!(engine.keys().await.unwrap(), vec!["mykey".to_string()]);
    }
}
