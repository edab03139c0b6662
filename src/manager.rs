//! The Cache Manager (spec §4.1): the single external contract. Validates
//! input, serializes and optionally encrypts values, selects an engine,
//! enforces TTL, updates stats, and emits events.

use crate::config::CacheManagerConfig;
use crate::engines::cookie::CookieEngine;
use crate::engines::indexed_persistent::IndexedPersistentEngine;
use crate::engines::local_persistent::LocalPersistentEngine;
use crate::engines::memory::MemoryEngine;
use crate::engines::session_persistent::SessionPersistentEngine;
use crate::engines::StorageEngine;
use crate::entry::{now_ms, CacheEntry, DataType, Metadata};
use crate::error::{CacheError, ErrorCode, Result};
use crate::events::{EventBus, EventPayload, EventType, StrategyEventPayload};
use crate::keys;
use crate::memory_manager::{EmergencyCleanupTargets, MemoryManager, MemoryReporter};
use crate::routing::RoutingCache;
use crate::security::SecurityContext;
use crate::serialize::{self, SerializationCache};
use crate::stats::{CacheStats, StatsCollector};
use crate::strategy::StorageStrategy;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Options recognized by [`CacheManager::set`] (spec §4.1).
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    pub ttl: Option<Duration>,
    pub engine: Option<String>,
    pub encrypt: Option<bool>,
    pub obfuscate_key: Option<bool>,
    pub data_type: Option<DataType>,
}

/// Outcome of a batch operation: keys that succeeded and keys that failed
/// with their error, in the order they were submitted (spec §4.1 "batch
/// operations... one item's failure never aborts the others").
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub success: Vec<String>,
    pub failed: Vec<(String, CacheError)>,
}

struct Handles {
    engine: Arc<dyn StorageEngine>,
    cleanup_task: Option<tokio::task::JoinHandle<()>>,
}

/// The central dispatcher described by spec §4.1. Owns the engine set, the
/// routing cache, the memory manager, the security context, the storage
/// strategy, and the event bus.
pub struct CacheManager {
    config: CacheManagerConfig,
    engines: Vec<Handles>,
    routing: Arc<RoutingCache>,
    security: SecurityContext,
    strategy: StorageStrategy,
    memory: Arc<MemoryManager>,
    stats: StatsCollector,
    events: EventBus,
    serialization_cache: Arc<SerializationCache>,
    memory_poll_task: tokio::task::JoinHandle<()>,
    disposed: AtomicBool,
}

impl CacheManager {
    /// Construct a manager and its full engine set. Equivalent to the
    /// spec's lazily-awaited `initPromise`: every engine is ready (the
    /// indexed-persistent engine's async `init()` has already completed)
    /// by the time this returns, so callers never need to await anything
    /// before the first operation.
    pub async fn new(config: CacheManagerConfig) -> Self {
        let memory = Arc::new(MemoryManager::new(config.memory.clone()));
        let memory_poll_task = memory.spawn_poll_task();

        let reporter: Arc<dyn MemoryReporter> = memory.clone();

        let memory_engine = Arc::new(MemoryEngine::new(
            config.memory_engine.clone(),
            Some(reporter.clone()),
        ));
        let memory_cleanup_task = memory_engine.spawn_cleanup_task();

        let indexed = Arc::new(IndexedPersistentEngine::default());
        indexed.init().await;

        let engines: Vec<Handles> = vec![
            Handles {
                engine: memory_engine as Arc<dyn StorageEngine>,
                cleanup_task: Some(memory_cleanup_task),
            },
            Handles {
                engine: Arc::new(LocalPersistentEngine::new(5 * 1024 * 1024, Some(reporter.clone()))),
                cleanup_task: None,
            },
            Handles {
                engine: Arc::new(SessionPersistentEngine::new(5 * 1024 * 1024, Some(reporter.clone()))),
                cleanup_task: None,
            },
            Handles {
                engine: indexed as Arc<dyn StorageEngine>,
                cleanup_task: None,
            },
            Handles {
                engine: Arc::new(CookieEngine::new(4 * 1024, Some(reporter))),
                cleanup_task: None,
            },
        ];

        let security = match &config.security {
            Some(sec_config) => SecurityContext::new(sec_config),
            None => SecurityContext::disabled(),
        };

        let strategy = StorageStrategy::new(
            config.strategy.clone(),
            true,
            config.default_engine_priority[0].clone(),
        );

        Self {
            routing: Arc::new(RoutingCache::new(config.routing_cache_capacity)),
            security,
            strategy,
            memory,
            stats: StatsCollector::new(),
            events: EventBus::new(&config.events),
            serialization_cache: Arc::new(SerializationCache::default()),
            memory_poll_task,
            engines,
            config,
            disposed: AtomicBool::new(false),
        }
    }

    fn check_disposed(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            Err(CacheError::disposed())
        } else {
            Ok(())
        }
    }

    fn find_engine(&self, name: &str) -> Option<&Arc<dyn StorageEngine>> {
        self.engines.iter().map(|h| &h.engine).find(|e| e.name() == name)
    }

    fn engines_in_priority_order(&self) -> Vec<&Arc<dyn StorageEngine>> {
        let mut ordered = Vec::with_capacity(self.engines.len());
        for name in &self.config.default_engine_priority {
            if let Some(engine) = self.find_engine(name) {
                ordered.push(engine);
            }
        }
        for handle in &self.engines {
            if !ordered.iter().any(|e| e.name() == handle.engine.name()) {
                ordered.push(&handle.engine);
            }
        }
        ordered
    }

    fn emit(&self, payload: EventPayload) {
        self.events.emit(payload);
    }

    fn emit_error(&self, message: impl Into<String>) {
        self.emit(EventPayload {
            event_type: EventType::Error,
            key: None,
            value: None,
            engine: None,
            timestamp: now_ms(),
            error: Some(message.into()),
            strategy: None,
        });
    }

    /// Choose an engine to store a new value in (spec §4.1 "Engine
    /// selection for set").
    fn select_engine_for_set(
        &self,
        requested: Option<&str>,
        size_bytes: usize,
        ttl: Option<Duration>,
        data_type: DataType,
    ) -> Result<Arc<dyn StorageEngine>> {
        if let Some(name) = requested {
            match self.find_engine(name) {
                Some(engine) if engine.available() => return Ok(engine.clone()),
                Some(_) => {}
                None => {
                    return Err(CacheError::invalid_options(format!("unknown engine {name}")));
                }
            }
        }

        let decision = self.strategy.recommend(size_bytes, ttl, data_type);
        self.emit(EventPayload {
            event_type: EventType::Strategy,
            key: None,
            value: None,
            engine: Some(decision.engine.clone()),
            timestamp: now_ms(),
            error: None,
            strategy: Some(StrategyEventPayload {
                reason: decision.reason.clone(),
                confidence: decision.confidence,
                data_size: size_bytes,
                data_type: format!("{data_type:?}"),
                ttl,
            }),
        });

        if let Some(engine) = self.find_engine(&decision.engine) {
            if engine.available() {
                return Ok(engine.clone());
            }
        }

        for engine in self.engines_in_priority_order() {
            if engine.available() {
                return Ok(engine.clone());
            }
        }

        Err(CacheError::engine_unavailable(
            "no configured engine is currently available",
        ))
    }

    async fn emergency_cleanup_and_retry<F, Fut>(&self, op: F) -> Result<()>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        let targets = EmergencyCleanupTargets {
            routing_cache: self.routing.clone(),
            serialization_cache: self.serialization_cache.clone(),
        };
        let handles: Vec<Arc<dyn StorageEngine>> = self.engines.iter().map(|h| h.engine.clone()).collect();
        self.memory.run_emergency_cleanup(&handles, &targets).await;
        op().await
    }

    /// Store `value` under `key` (spec §4.1 "set").
    pub async fn set(&self, key: &str, value: serde_json::Value, opts: SetOptions) -> Result<()> {
        self.check_disposed()?;
        keys::validate_key(key)?;

        let ttl = match opts.ttl {
            Some(ttl) if ttl.is_zero() => None,
            Some(ttl) => Some(ttl),
            None => self.config.default_ttl,
        };

        let data_type = opts.data_type.unwrap_or_else(|| DataType::of(&value));
        let shape = format!("{data_type:?}");
        let text = self.serialization_cache.serialize(&shape, &value)?;

        let encrypt = opts.encrypt.unwrap_or(self.security.encryption_enabled());
        let (stored_text, encrypted) = if encrypt {
            (self.security.encrypt(&text)?, true)
        } else {
            (text, false)
        };

        let size_bytes = crate::engines::utf8_byte_length(&stored_text);
        let engine = self.select_engine_for_set(opts.engine.as_deref(), size_bytes, ttl, data_type)?;

        let obfuscate = opts.obfuscate_key.unwrap_or(self.security.obfuscator().is_some());
        let engine_key = if obfuscate {
            self.security.obfuscate_key(key)
        } else {
            key.to_string()
        };

        let ttl_ms = ttl.map(|d| d.as_millis() as i64);
        let now = now_ms();
        let entry = CacheEntry::new(stored_text, data_type, engine.name(), ttl_ms, encrypted, now);
        let entry_text = serde_json::to_string(&entry)?;

        match engine.set_item(&engine_key, &entry_text, ttl_ms).await {
            Ok(()) => {
                self.routing.put(key, engine.name());
                self.emit(EventPayload {
                    event_type: EventType::Set,
                    key: Some(key.to_string()),
                    value: None,
                    engine: Some(engine.name().to_string()),
                    timestamp: now,
                    error: None,
                    strategy: None,
                });
                Ok(())
            }
            Err(err) if err.code == ErrorCode::QuotaExceeded => {
                self.emergency_cleanup_and_retry(|| engine.set_item(&engine_key, &entry_text, ttl_ms))
                    .await?;
                self.routing.put(key, engine.name());
                self.emit(EventPayload {
                    event_type: EventType::Set,
                    key: Some(key.to_string()),
                    value: None,
                    engine: Some(engine.name().to_string()),
                    timestamp: now,
                    error: None,
                    strategy: None,
                });
                Ok(())
            }
            Err(err) => {
                self.emit_error(err.message.clone());
                Err(err)
            }
        }
    }

    fn engine_key_for(&self, key: &str) -> String {
        if self.security.obfuscator().is_some() {
            self.security.obfuscate_key(key)
        } else {
            key.to_string()
        }
    }

    /// Fetch and decode the entry stored for `key` from a specific engine,
    /// handling expiry and the access-count/timestamp touch (spec §3.2,
    /// §4.1 "TTL semantics").
    async fn read_entry(&self, engine: &Arc<dyn StorageEngine>, key: &str) -> Result<Option<CacheEntry>> {
        let engine_key = self.engine_key_for(key);
        let Some(raw) = engine.get_item(&engine_key).await? else {
            return Ok(None);
        };
        let mut entry: CacheEntry = serde_json::from_str(&raw).map_err(|e| {
            CacheError::with_internal(
                ErrorCode::DeserializationFail,
                "stored entry could not be decoded",
                e.to_string(),
            )
        })?;

        let now = now_ms();
        if entry.is_expired(now) {
            let _ = engine.remove_item(&engine_key).await;
            self.routing.remove(key);
            self.stats.record_expired();
            self.emit(EventPayload {
                event_type: EventType::Expired,
                key: Some(key.to_string()),
                value: None,
                engine: Some(engine.name().to_string()),
                timestamp: now,
                error: None,
                strategy: None,
            });
            return Ok(None);
        }

        entry.touch(now);
        let remaining_ttl_ms = entry.expires_at.map(|exp| (exp - now).max(0));
        if let Ok(text) = serde_json::to_string(&entry) {
            if let Err(err) = engine.set_item(&engine_key, &text, remaining_ttl_ms).await {
                debug!(?err, key, "failed to persist access-count touch, ignoring");
            }
        }

        Ok(Some(entry))
    }

    /// Decode a stored entry's payload back into its original value
    /// (decrypt, then deserialize).
    fn decode_value(&self, entry: &CacheEntry) -> Result<serde_json::Value> {
        let plaintext = if entry.encrypted {
            self.security.decrypt(&entry.value)?
        } else {
            entry.value.clone()
        };
        serialize::from_text(&plaintext)
    }

    /// Retrieve the value stored under `key` (spec §4.1 "get"). `None`
    /// means absent or expired.
    pub async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        self.check_disposed()?;
        keys::validate_key(key)?;

        if let Some(engine_name) = self.routing.get(key) {
            if let Some(engine) = self.find_engine(&engine_name) {
                match self.read_entry(engine, key).await {
                    Ok(Some(entry)) => {
                        self.stats.record_hit(engine.name());
                        self.emit(EventPayload {
                            event_type: EventType::Get,
                            key: Some(key.to_string()),
                            value: None,
                            engine: Some(engine.name().to_string()),
                            timestamp: now_ms(),
                            error: None,
                            strategy: None,
                        });
                        return Ok(Some(self.decode_value(&entry)?));
                    }
                    Ok(None) => self.stats.record_miss(engine.name()),
                    Err(err) => {
                        debug!(?err, engine = engine.name(), key, "read failed, falling through to the next engine");
                        self.stats.record_miss(engine.name());
                    }
                }
            }
        }

        for engine in self.engines_in_priority_order() {
            if !engine.available() {
                continue;
            }
            match self.read_entry(engine, key).await {
                Ok(Some(entry)) => {
                    self.routing.put(key, engine.name());
                    self.stats.record_hit(engine.name());
                    self.emit(EventPayload {
                        event_type: EventType::Get,
                        key: Some(key.to_string()),
                        value: None,
                        engine: Some(engine.name().to_string()),
                        timestamp: now_ms(),
                        error: None,
                        strategy: None,
                    });
                    return Ok(Some(self.decode_value(&entry)?));
                }
                Ok(None) => self.stats.record_miss(engine.name()),
                Err(err) => {
                    debug!(?err, engine = engine.name(), key, "read failed, falling through to the next engine");
                    self.stats.record_miss(engine.name());
                }
            }
        }

        Ok(None)
    }

    /// Remove `key` from whichever engine holds it.
    pub async fn remove(&self, key: &str) -> Result<()> {
        self.check_disposed()?;
        keys::validate_key(key)?;
        let engine_key = self.engine_key_for(key);

        let candidates: Vec<Arc<dyn StorageEngine>> = match self.routing.get(key) {
            Some(name) => self.find_engine(&name).into_iter().cloned().collect(),
            None => self.engines_in_priority_order().into_iter().cloned().collect(),
        };

        for engine in &candidates {
            engine.remove_item(&engine_key).await?;
        }
        self.routing.remove(key);
        if let Some(obfuscator) = self.security.obfuscator() {
            obfuscator.forget(&engine_key);
        }
        self.emit(EventPayload {
            event_type: EventType::Remove,
            key: Some(key.to_string()),
            value: None,
            engine: None,
            timestamp: now_ms(),
            error: None,
            strategy: None,
        });
        Ok(())
    }

    /// Clear a specific engine, or every engine if `engine` is `None`.
    pub async fn clear(&self, engine: Option<&str>) -> Result<()> {
        self.check_disposed()?;
        match engine {
            Some(name) => {
                if let Some(engine) = self.find_engine(name) {
                    if let Some(obfuscator) = self.security.obfuscator() {
                        for engine_key in engine.keys().await? {
                            obfuscator.forget(&engine_key);
                        }
                    }
                    engine.clear().await?;
                }
            }
            None => {
                for handle in &self.engines {
                    handle.engine.clear().await?;
                }
                self.routing.clear();
                if let Some(obfuscator) = self.security.obfuscator() {
                    obfuscator.clear();
                }
            }
        }
        self.emit(EventPayload {
            event_type: EventType::Clear,
            key: None,
            value: None,
            engine: engine.map(|s| s.to_string()),
            timestamp: now_ms(),
            error: None,
            strategy: None,
        });
        Ok(())
    }

    /// Whether `key` is present and unexpired in any engine.
    pub async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// List every resident key across `engine`, or every engine if `None`,
    /// deduplicated.
    pub async fn keys(&self, engine: Option<&str>) -> Result<Vec<String>> {
        self.check_disposed()?;
        let mut seen = std::collections::HashSet::new();
        let mut all = Vec::new();

        let target_engines: Vec<&Arc<dyn StorageEngine>> = match engine {
            Some(name) => self.find_engine(name).into_iter().collect(),
            None => self.engines_in_priority_order(),
        };

        for engine in target_engines {
            if !engine.available() {
                continue;
            }
            for engine_key in engine.keys().await? {
                let logical = self
                    .security
                    .deobfuscate_key(&engine_key)
                    .unwrap_or(engine_key);
                if seen.insert(logical.clone()) {
                    all.push(logical);
                }
            }
        }
        Ok(all)
    }

    /// Return the cached value for `key`, populating it via `fetcher` on a
    /// miss (or when `refresh` is set). No single-flight: concurrent calls
    /// may invoke `fetcher` more than once (spec §5 "remember concurrency").
    pub async fn remember<F, Fut>(&self, key: &str, fetcher: F, ttl: Option<Duration>, refresh: bool) -> Result<serde_json::Value>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<serde_json::Value>>,
    {
        if !refresh {
            if let Some(value) = self.get(key).await? {
                return Ok(value);
            }
        }
        let value = fetcher().await?;
        self.set(key, value.clone(), SetOptions { ttl, ..Default::default() }).await?;
        Ok(value)
    }

    /// Batch `set`, per-key bounded concurrency (spec §4.1 "batch
    /// operations"). Concurrency is bounded in-process via
    /// `buffer_unordered`, not by spawning tasks — operations already run
    /// cooperatively on this task, matching the single-threaded scheduling
    /// model (spec §5).
    pub async fn mset(&self, items: Vec<(String, serde_json::Value, SetOptions)>) -> BatchResult {
        let concurrency = self.config.batch_concurrency.max(1);
        let results: Vec<(String, Result<()>)> = stream::iter(items)
            .map(|(key, value, opts)| async move {
                let result = self.set(&key, value, opts).await;
                (key, result)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut out = BatchResult::default();
        for (key, result) in results {
            match result {
                Ok(()) => out.success.push(key),
                Err(err) => out.failed.push((key, err)),
            }
        }
        out
    }

    /// Batch `get`: returns `{success: [(key, Some(value) | None)], failed}`.
    pub async fn mget(&self, keys: Vec<String>) -> (Vec<(String, Option<serde_json::Value>)>, Vec<(String, CacheError)>) {
        let concurrency = self.config.batch_concurrency.max(1);
        let results: Vec<(String, Result<Option<serde_json::Value>>)> = stream::iter(keys)
            .map(|key| async move {
                let result = self.get(&key).await;
                (key, result)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut success = Vec::new();
        let mut failed = Vec::new();
        for (key, result) in results {
            match result {
                Ok(value) => success.push((key, value)),
                Err(err) => failed.push((key, err)),
            }
        }
        (success, failed)
    }

    /// Batch `remove`.
    pub async fn mremove(&self, keys: Vec<String>) -> BatchResult {
        let concurrency = self.config.batch_concurrency.max(1);
        let results: Vec<(String, Result<()>)> = stream::iter(keys)
            .map(|key| async move {
                let result = self.remove(&key).await;
                (key, result)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut out = BatchResult::default();
        for (key, result) in results {
            match result {
                Ok(()) => out.success.push(key),
                Err(err) => out.failed.push((key, err)),
            }
        }
        out
    }

    /// Batch `has`.
    pub async fn mhas(&self, keys: Vec<String>) -> HashMap<String, bool> {
        let concurrency = self.config.batch_concurrency.max(1);
        stream::iter(keys)
            .map(|key| async move {
                let present = self.has(&key).await.unwrap_or(false);
                (key, present)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await
    }

    /// Read-only metadata for `key`, without decoding its payload.
    pub async fn get_metadata(&self, key: &str) -> Result<Option<Metadata>> {
        self.check_disposed()?;
        keys::validate_key(key)?;

        let target = match self.routing.get(key) {
            Some(name) => self.find_engine(&name).into_iter().cloned().collect::<Vec<_>>(),
            None => self.engines_in_priority_order().into_iter().cloned().collect(),
        };

        for engine in target {
            if !engine.available() {
                continue;
            }
            match self.read_entry(&engine, key).await {
                Ok(Some(entry)) => return Ok(Some(Metadata::from(&entry))),
                Ok(None) => {}
                Err(err) => {
                    debug!(?err, engine = engine.name(), key, "metadata read failed, falling through to the next engine");
                }
            }
        }
        Ok(None)
    }

    /// Process-wide cache statistics.
    pub async fn get_stats(&self) -> Result<CacheStats> {
        self.check_disposed()?;
        let mut descriptors = Vec::with_capacity(self.engines.len());
        for handle in &self.engines {
            let item_count = handle.engine.length().await.unwrap_or(0);
            descriptors.push((
                handle.engine.name().to_string(),
                item_count,
                handle.engine.used_size(),
                handle.engine.available(),
            ));
        }
        Ok(self.stats.snapshot(&descriptors))
    }

    /// Number of keys currently tracked by the routing cache. Diagnostic
    /// only; callers should never rely on routing cache contents for
    /// correctness (spec §9: "entries are merely hints").
    pub fn routing_cache_len(&self) -> usize {
        self.routing.len()
    }

    /// Current process-wide memory usage snapshot (spec §4.6).
    pub fn memory_snapshot(&self) -> crate::memory_manager::MemorySnapshot {
        self.memory.snapshot()
    }

    /// Run `cleanup()` across every engine, purging expired entries.
    pub async fn cleanup(&self) -> Result<()> {
        self.check_disposed()?;
        for handle in &self.engines {
            handle.engine.cleanup().await?;
        }
        Ok(())
    }

    /// Register an event listener; see [`EventBus::on`].
    pub fn on(&self, event_type: EventType, listener: impl Fn(&EventPayload) + Send + Sync + 'static) -> crate::events::ListenerId {
        self.events.on(event_type, listener)
    }

    /// Unregister a listener previously returned by [`Self::on`].
    pub fn off(&self, id: crate::events::ListenerId) {
        self.events.off(id);
    }

    /// Force an emergency memory cleanup pass outside the normal
    /// pressure-triggered path.
    pub async fn optimize_memory(&self) -> Result<()> {
        self.check_disposed()?;
        let targets = EmergencyCleanupTargets {
            routing_cache: self.routing.clone(),
            serialization_cache: self.serialization_cache.clone(),
        };
        let handles: Vec<Arc<dyn StorageEngine>> = self.engines.iter().map(|h| h.engine.clone()).collect();
        self.memory.run_emergency_cleanup(&handles, &targets).await;
        Ok(())
    }

    /// Shut the manager down: cancel background timers and reject every
    /// subsequent operation with `Disposed`.
    pub async fn destroy(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.memory_poll_task.abort();
        for handle in &self.engines {
            if let Some(task) = &handle.cleanup_task {
                task.abort();
            }
        }
        warn!("cache manager destroyed");
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        self.memory_poll_task.abort();
        for handle in &self.engines {
            if let Some(task) = &handle.cleanup_task {
                task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn manager() -> CacheManager {
        CacheManager::new(CacheManagerConfig::default()).await
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let manager = manager().await;
        manager.set("k", json!("hello"), SetOptions::default()).await.unwrap();
        assert_eq!(manager.get("k").await.unwrap(), Some(json!("hello")));
    }

    #[tokio::test]
    async fn missing_key_returns_none() {
        let manager = manager().await;
        assert_eq!(manager.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn remove_then_get_returns_none() {
        let manager = manager().await;
        manager.set("k", json!(1), SetOptions::default()).await.unwrap();
        manager.remove("k").await.unwrap();
        assert_eq!(manager.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn ttl_expiry_removes_entry_and_reports_expired_event() {
        let manager = manager().await;
        let seen = Arc::new(std::sync::Mutex::new(0));
        let seen_clone = seen.clone();
        manager.on(EventType::Expired, move |_| *seen_clone.lock().unwrap() += 1);
        manager
            .set(
                "k",
                json!(1),
                SetOptions {
                    ttl: Some(Duration::from_millis(1)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(manager.get("k").await.unwrap(), None);
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn zero_ttl_means_no_expiry() {
        // `Duration` cannot represent a negative TTL, so unlike the
        // dynamically-typed original this is rejected at the type level
        // rather than at runtime; zero still means "no TTL" per spec.
        let manager = manager().await;
        manager
            .set(
                "k",
                json!(1),
                SetOptions {
                    ttl: Some(Duration::ZERO),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let metadata = manager.get_metadata("k").await.unwrap().unwrap();
        assert_eq!(metadata.expires_at, None);
    }

    #[tokio::test]
    async fn explicit_engine_choice_is_honored() {
        let manager = manager().await;
        manager
            .set(
                "k",
                json!(1),
                SetOptions {
                    engine: Some("localPersistent".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let metadata = manager.get_metadata("k").await.unwrap().unwrap();
        assert_eq!(metadata.engine, "localPersistent");
    }

    #[tokio::test]
    async fn batch_set_reports_partial_failure() {
        let manager = manager().await;
        let items = vec![
            ("".to_string(), json!(1), SetOptions::default()),
            ("ok".to_string(), json!(2), SetOptions::default()),
        ];
        let result = manager.mset(items).await;
        assert_eq!(result.success, vec!["ok".to_string()]);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].0, "");
        assert_eq!(result.failed[0].1.code, ErrorCode::InvalidKey);
    }

    #[tokio::test]
    async fn destroy_rejects_further_operations() {
        let manager = manager().await;
        manager.destroy().await;
        let err = manager.set("k", json!(1), SetOptions::default()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Disposed);
    }

    #[tokio::test]
    async fn remember_populates_cache_on_miss() {
        let manager = manager().await;
        let value = manager
            .remember("k", || async { Ok(json!("fetched")) }, None, false)
            .await
            .unwrap();
        assert_eq!(value, json!("fetched"));
        assert_eq!(manager.get("k").await.unwrap(), Some(json!("fetched")));
    }

    #[tokio::test]
    async fn stats_reflect_hits_and_misses() {
        let manager = manager().await;
        manager.set("k", json!(1), SetOptions::default()).await.unwrap();
        manager.get("k").await.unwrap();
        manager.get("missing").await.unwrap();
        let stats = manager.get_stats().await.unwrap();
        assert!(stats.hit_rate > 0.0 && stats.hit_rate < 1.0);
    }
}
