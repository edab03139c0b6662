//! Indexed persistent engine (spec §4.2): a keyed object store with
//! indexes on `expiresAt` and `createdAt`, the only engine in this
//! family with native TTL expiry — it doesn't need the shared
//! [`ttl_wrapper`](super::ttl_wrapper) format. Initialization is
//! asynchronous, modeling a real embedding opening a database handle;
//! `available()` is false until `init` completes.

use super::size_cache::SizeCache;
use super::StorageEngine;
use crate::entry::now_ms;
use crate::error::{CacheError, Result};
use crate::memory_manager::MemoryReporter;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

const DEFAULT_MAX_SIZE_BYTES: u64 = 50 * 1024 * 1024;

struct Record {
    value: String,
    #[allow(dead_code)]
    created_at: i64,
    expires_at: Option<i64>,
}

pub struct IndexedPersistentEngine {
    records: DashMap<String, Record>,
    /// Index on `expiresAt`, `(expires_at, key)` so cleanup can walk the
    /// earliest-expiring entries without scanning every resident record.
    expiry_index: Mutex<BTreeSet<(i64, String)>>,
    size_cache: SizeCache,
    used_size: AtomicU64,
    max_size_bytes: u64,
    available: AtomicBool,
    reporter: Option<Arc<dyn MemoryReporter>>,
}

impl IndexedPersistentEngine {
    pub fn new(max_size_bytes: u64, reporter: Option<Arc<dyn MemoryReporter>>) -> Self {
        Self {
            records: DashMap::new(),
            expiry_index: Mutex::new(BTreeSet::new()),
            size_cache: SizeCache::default(),
            used_size: AtomicU64::new(0),
            max_size_bytes,
            available: AtomicBool::new(false),
            reporter,
        }
    }

    /// Complete asynchronous initialization, after which `available()`
    /// reports `true`. A real embedding would open its backing store here.
    pub async fn init(&self) {
        self.available.store(true, Ordering::Release);
    }

    fn report_delta(&self, delta: i64) {
        if delta != 0 {
            if let Some(reporter) = &self.reporter {
                reporter.report_delta(self.name(), delta);
            }
        }
    }

    fn remove_locked(&self, key: &str) {
        if let Some((_, record)) = self.records.remove(key) {
            let size = self.size_cache.size_of(&record.value) as u64;
            self.used_size.fetch_sub(size, Ordering::Relaxed);
            self.report_delta(-(size as i64));
            if let Some(expires_at) = record.expires_at {
                self.expiry_index.lock().remove(&(expires_at, key.to_string()));
            }
        }
    }

    fn require_available(&self) -> Result<()> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(CacheError::engine_unavailable(
                "indexed persistent engine has not completed initialization",
            ))
        }
    }
}

impl Default for IndexedPersistentEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE_BYTES, None)
    }
}

#[async_trait]
impl StorageEngine for IndexedPersistentEngine {
    async fn set_item(&self, key: &str, text_value: &str, ttl_ms: Option<i64>) -> Result<()> {
        self.require_available()?;
        let now = now_ms();
        let new_size = self.size_cache.size_of(text_value) as u64;
        let expires_at = ttl_ms.map(|ttl| now + ttl);

        let old = self.records.get(key).map(|r| {
            (
                self.size_cache.size_of(&r.value) as u64,
                r.expires_at,
            )
        });
        let used_without_old = self.used_size.load(Ordering::Relaxed) - old.map(|(s, _)| s).unwrap_or(0);
        if used_without_old + new_size > self.max_size_bytes {
            return Err(CacheError::quota_exceeded(format!(
                "indexed persistent store quota exceeded storing {new_size} bytes"
            )));
        }

        if let Some((old_size, old_expiry)) = old {
            self.used_size.fetch_sub(old_size, Ordering::Relaxed);
            self.report_delta(-(old_size as i64));
            if let Some(exp) = old_expiry {
                self.expiry_index.lock().remove(&(exp, key.to_string()));
            }
        }

        self.records.insert(
            key.to_string(),
            Record {
                value: text_value.to_string(),
                created_at: now,
                expires_at,
            },
        );
        self.used_size.fetch_add(new_size, Ordering::Relaxed);
        self.report_delta(new_size as i64);
        if let Some(exp) = expires_at {
            self.expiry_index.lock().insert((exp, key.to_string()));
        }
        Ok(())
    }

    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.require_available()?;
        let now = now_ms();
        let hit = self.records.get(key).map(|r| {
            let expired = matches!(r.expires_at, Some(exp) if now >= exp);
            (expired, r.value.clone())
        });
        match hit {
            Some((true, _)) => {
                self.remove_locked(key);
                Ok(None)
            }
            Some((false, value)) => Ok(Some(value)),
            None => Ok(None),
        }
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.require_available()?;
        self.remove_locked(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.require_available()?;
        let total = self.used_size.swap(0, Ordering::Relaxed);
        self.records.clear();
        self.expiry_index.lock().clear();
        self.report_delta(-(total as i64));
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.require_available()?;
        let now = now_ms();
        Ok(self
            .records
            .iter()
            .filter(|e| !matches!(e.expires_at, Some(exp) if now >= exp))
            .map(|e| e.key().clone())
            .collect())
    }

    async fn has_item(&self, key: &str) -> Result<bool> {
        Ok(self.get_item(key).await?.is_some())
    }

    async fn length(&self) -> Result<usize> {
        self.require_available()?;
        Ok(self.records.len())
    }

    async fn cleanup(&self) -> Result<()> {
        self.require_available()?;
        let now = now_ms();
        let expired: Vec<String> = {
            let index = self.expiry_index.lock();
            index
                .iter()
                .take_while(|(expires_at, _)| *expires_at <= now)
                .map(|(_, key)| key.clone())
                .collect()
        };
        for key in expired {
            self.remove_locked(&key);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "indexedPersistent"
    }

    fn available(&self) -> bool {
        self.available.load(Ordering::Acquire)
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

    async fn ready_engine() -> IndexedPersistentEngine {
        let engine = IndexedPersistentEngine::default();
        engine.init().await;
        engine
    }

    #[tokio::test]
    async fn unavailable_before_init() {
        let engine = IndexedPersistentEngine::default();
        let err = engine.set_item("k", "v", None).await.unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::EngineUnavailable);
    }

    #[tokio::test]
    async fn available_after_init() {
        let engine = ready_engine().await;
        assert!(engine.available());
        engine.set_item("k", "v", None).await.unwrap();
        assert_eq!(engine.get_item("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn native_ttl_expiry_via_index_cleanup() {
        let engine = ready_engine().await;
        engine.set_item("short", "v", Some(1)).await.unwrap();
        engine.set_item("long", "v", Some(60_000)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        engine.cleanup().await.unwrap();
        assert_eq!(engine.length().await.unwrap(), 1);
        assert_eq!(engine.get_item("long").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn quota_exceeded_past_store_budget() {
        let engine = IndexedPersistentEngine::new(8, None);
        engine.init().await;
        let err = engine.set_item("k", "way too large a value", None).await.unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::QuotaExceeded);
    }
}
