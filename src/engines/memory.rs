//! The in-process memory engine (spec §4.2).
//!
//! Capacity-bounded by both `max_size_bytes` and `max_items`; a
//! configurable [`EvictionPolicy`] picks victims whenever either bound
//! would be exceeded. A periodic task purges expired items.

use crate::engines::size_cache::SizeCache;
use crate::engines::StorageEngine;
use crate::entry::now_ms;
use crate::error::{CacheError, Result};
use crate::eviction::{self, EvictionPolicy};
use crate::memory_manager::MemoryReporter;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

struct StoredEntry {
    value: String,
    expires_at: Option<i64>,
}

/// Configuration for a [`MemoryEngine`].
#[derive(Debug, Clone)]
pub struct MemoryEngineConfig {
    pub max_size_bytes: u64,
    pub max_items: usize,
    pub eviction_policy: String,
    pub cleanup_interval: Duration,
}

impl Default for MemoryEngineConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 10 * 1024 * 1024,
            max_items: 10_000,
            eviction_policy: "lru".to_string(),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

pub struct MemoryEngine {
    entries: DashMap<String, StoredEntry>,
    size_cache: SizeCache,
    policy: RwLock<Box<dyn EvictionPolicy>>,
    used_size: AtomicU64,
    config: MemoryEngineConfig,
    reporter: Option<Arc<dyn MemoryReporter>>,
}

impl MemoryEngine {
    pub fn new(config: MemoryEngineConfig, reporter: Option<Arc<dyn MemoryReporter>>) -> Self {
        let policy = eviction::by_name(&config.eviction_policy);
        Self {
            entries: DashMap::new(),
            size_cache: SizeCache::default(),
            policy: RwLock::new(policy),
            used_size: AtomicU64::new(0),
            config,
            reporter,
        }
    }

    /// Start the periodic expired-item sweep (spec §4.2: default 60s).
    /// The manager holds the returned handle and aborts it on `destroy`.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(self);
        let interval = engine.config.cleanup_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(err) = engine.cleanup().await {
                    warn!(?err, "periodic memory engine cleanup failed");
                }
            }
        })
    }

    /// Switch the eviction policy at runtime, replaying every resident key
    /// into the new policy so no resident key is lost (spec §4.3).
    pub fn switch_policy(&self, new_name: &str) {
        let keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        let mut policy = self.policy.write();
        *policy = eviction::migrate(policy.as_ref(), new_name, &keys);
    }

    /// Drop `key` entirely: explicit user-initiated removal or expiry.
    /// Policy state is wiped, not retained as eviction history.
    fn remove_key(&self, key: &str) {
        if let Some((_, entry)) = self.entries.remove(key) {
            let size = self.size_cache.size_of(&entry.value) as u64;
            self.used_size.fetch_sub(size, Ordering::Relaxed);
            self.report_delta(-(size as i64));
        }
        self.policy.read().remove_key(key);
    }

    /// Drop `key` because the eviction policy picked it to make room.
    /// Unlike [`Self::remove_key`], history-aware policies (ARC) get a
    /// chance to retain a ghost-list trace of the eviction.
    fn evict_key(&self, key: &str) {
        if let Some((_, entry)) = self.entries.remove(key) {
            let size = self.size_cache.size_of(&entry.value) as u64;
            self.used_size.fetch_sub(size, Ordering::Relaxed);
            self.report_delta(-(size as i64));
        }
        self.policy.read().record_eviction(key);
    }

    fn report_delta(&self, delta: i64) {
        if delta != 0 {
            if let Some(reporter) = &self.reporter {
                reporter.report_delta(self.name(), delta);
            }
        }
    }

    async fn ensure_capacity(&self, incoming_size: u64, is_new_key: bool) -> Result<()> {
        loop {
            let used = self.used_size.load(Ordering::Relaxed);
            let count = self.entries.len() + usize::from(is_new_key);
            let fits_size = used + incoming_size <= self.config.max_size_bytes;
            let fits_count = count <= self.config.max_items;
            if fits_size && fits_count {
                return Ok(());
            }
            match self.policy.read().get_eviction_key() {
                Some(victim) => {
                    debug!(key = %victim, engine = self.name(), "evicting to satisfy capacity");
                    self.evict_key(&victim);
                }
                None => break,
            }
        }

        let used = self.used_size.load(Ordering::Relaxed);
        if used + incoming_size > self.config.max_size_bytes
            || self.entries.len() + usize::from(is_new_key) > self.config.max_items
        {
            return Err(CacheError::quota_exceeded(format!(
                "memory engine cannot admit {incoming_size} bytes within its configured bounds"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageEngine for MemoryEngine {
    async fn set_item(&self, key: &str, text_value: &str, ttl_ms: Option<i64>) -> Result<()> {
        let now = now_ms();
        let new_size = self.size_cache.size_of(text_value) as u64;
        let existing_size = self
            .entries
            .get(key)
            .map(|e| self.size_cache.size_of(&e.value) as u64);
        let is_new_key = existing_size.is_none();

        if let Some(old_size) = existing_size {
            self.used_size.fetch_sub(old_size, Ordering::Relaxed);
            self.report_delta(-(old_size as i64));
        }

        self.ensure_capacity(new_size, is_new_key).await?;

        self.entries.insert(
            key.to_string(),
            StoredEntry {
                value: text_value.to_string(),
                expires_at: ttl_ms.map(|ttl| now + ttl),
            },
        );
        self.used_size.fetch_add(new_size, Ordering::Relaxed);
        self.report_delta(new_size as i64);
        self.policy
            .read()
            .record_add(key, ttl_ms.map(|ms| Duration::from_millis(ms.max(0) as u64)));
        Ok(())
    }

    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        let now = now_ms();
        let hit = self.entries.get(key).map(|entry| {
            let expired = matches!(entry.expires_at, Some(exp) if now >= exp);
            (expired, entry.value.clone())
        });
        match hit {
            Some((true, _)) => {
                self.remove_key(key);
                Ok(None)
            }
            Some((false, value)) => {
                self.policy.read().record_access(key);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.remove_key(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let total = self.used_size.swap(0, Ordering::Relaxed);
        self.entries.clear();
        self.policy.read().clear();
        self.report_delta(-(total as i64));
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let now = now_ms();
        Ok(self
            .entries
            .iter()
            .filter(|e| !matches!(e.expires_at, Some(exp) if now >= exp))
            .map(|e| e.key().clone())
            .collect())
    }

    async fn has_item(&self, key: &str) -> Result<bool> {
        Ok(self.get_item(key).await?.is_some())
    }

    async fn length(&self) -> Result<usize> {
        Ok(self.entries.len())
    }

    async fn cleanup(&self) -> Result<()> {
        let now = now_ms();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| matches!(e.expires_at, Some(exp) if now >= exp))
            .map(|e| e.key().clone())
            .collect();
        for key in expired {
            self.remove_key(&key);
        }
        Ok(())
    }

    async fn evict_one(&self) -> Result<bool> {
        match self.policy.read().get_eviction_key() {
            Some(victim) => {
                self.evict_key(&victim);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn name(&self) -> &'static str {
        "memory"
    }

    fn available(&self) -> bool {
        true
    }

    fn max_size(&self) -> u64 {
        self.config.max_size_bytes
    }

    fn used_size(&self) -> u64 {
        self.used_size.load(Ordering::Relaxed)
    }
}
