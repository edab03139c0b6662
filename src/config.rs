//! Programmatic configuration for the cache manager.
//!
//! Unlike the teacher's `Config`, there is no environment/file loading here
//! (this layer is embedded, not a standalone service) — every config is
//! built in-process via a builder, matching the teacher's `CacheConfigBuilder`
//! idiom for its own `CacheConfig`.

use crate::engines::memory::MemoryEngineConfig;
use std::time::Duration;

/// Top-level configuration for a [`crate::manager::CacheManager`].
#[derive(Debug, Clone)]
pub struct CacheManagerConfig {
    /// Preference order engines are tried in when no explicit engine or
    /// strategy recommendation applies.
    pub default_engine_priority: Vec<String>,
    /// Global default TTL applied when an operation doesn't specify one.
    pub default_ttl: Option<Duration>,
    /// Maximum number of keys tracked by the routing cache.
    pub routing_cache_capacity: usize,
    /// Maximum concurrent engine calls for batch operations (`mset`/`mget`/…).
    pub batch_concurrency: usize,
    /// Capacity and eviction policy for the in-process memory engine
    /// (spec §6 config's per-engine `engines` map, memory entry).
    pub memory_engine: MemoryEngineConfig,
    /// Strategy-layer configuration.
    pub strategy: StrategyConfig,
    /// Security-layer configuration; `None` disables encryption and key
    /// obfuscation entirely.
    pub security: Option<SecurityConfig>,
    /// Memory-manager configuration.
    pub memory: MemoryConfig,
    /// Event-emission configuration.
    pub events: EventsConfig,
}

impl Default for CacheManagerConfig {
    fn default() -> Self {
        Self {
            default_engine_priority: vec![
                "memory".to_string(),
                "localPersistent".to_string(),
                "sessionPersistent".to_string(),
                "indexedPersistent".to_string(),
                "cookie".to_string(),
            ],
            default_ttl: None,
            routing_cache_capacity: 10_000,
            batch_concurrency: 10,
            memory_engine: MemoryEngineConfig::default(),
            strategy: StrategyConfig::default(),
            security: None,
            memory: MemoryConfig::default(),
            events: EventsConfig::default(),
        }
    }
}

impl CacheManagerConfig {
    /// Start building a configuration from defaults.
    pub fn builder() -> CacheManagerConfigBuilder {
        CacheManagerConfigBuilder::default()
    }
}

/// Builder for [`CacheManagerConfig`].
#[derive(Debug, Default)]
pub struct CacheManagerConfigBuilder {
    inner: CacheManagerConfigOverrides,
}

#[derive(Debug, Default)]
struct CacheManagerConfigOverrides {
    default_engine_priority: Option<Vec<String>>,
    default_ttl: Option<Option<Duration>>,
    routing_cache_capacity: Option<usize>,
    batch_concurrency: Option<usize>,
    memory_engine: Option<MemoryEngineConfig>,
    strategy: Option<StrategyConfig>,
    security: Option<SecurityConfig>,
    memory: Option<MemoryConfig>,
    events: Option<EventsConfig>,
}

impl CacheManagerConfigBuilder {
    pub fn default_engine_priority(mut self, priority: Vec<String>) -> Self {
        self.inner.default_engine_priority = Some(priority);
        self
    }

    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.inner.default_ttl = Some(Some(ttl));
        self
    }

    pub fn routing_cache_capacity(mut self, capacity: usize) -> Self {
        self.inner.routing_cache_capacity = Some(capacity);
        self
    }

    pub fn batch_concurrency(mut self, concurrency: usize) -> Self {
        self.inner.batch_concurrency = Some(concurrency);
        self
    }

    pub fn memory_engine(mut self, memory_engine: MemoryEngineConfig) -> Self {
        self.inner.memory_engine = Some(memory_engine);
        self
    }

    pub fn strategy(mut self, strategy: StrategyConfig) -> Self {
        self.inner.strategy = Some(strategy);
        self
    }

    pub fn security(mut self, security: SecurityConfig) -> Self {
        self.inner.security = Some(security);
        self
    }

    pub fn memory(mut self, memory: MemoryConfig) -> Self {
        self.inner.memory = Some(memory);
        self
    }

    pub fn events(mut self, events: EventsConfig) -> Self {
        self.inner.events = Some(events);
        self
    }

    pub fn build(self) -> CacheManagerConfig {
        let defaults = CacheManagerConfig::default();
        CacheManagerConfig {
            default_engine_priority: self
                .inner
                .default_engine_priority
                .unwrap_or(defaults.default_engine_priority),
            default_ttl: self.inner.default_ttl.unwrap_or(defaults.default_ttl),
            routing_cache_capacity: self
                .inner
                .routing_cache_capacity
                .unwrap_or(defaults.routing_cache_capacity),
            batch_concurrency: self
                .inner
                .batch_concurrency
                .unwrap_or(defaults.batch_concurrency),
            memory_engine: self.inner.memory_engine.unwrap_or(defaults.memory_engine),
            strategy: self.inner.strategy.unwrap_or(defaults.strategy),
            security: self.inner.security.or(defaults.security),
            memory: self.inner.memory.unwrap_or(defaults.memory),
            events: self.inner.events.unwrap_or(defaults.events),
        }
    }
}

/// Size bucket boundaries (bytes) and TTL bucket boundaries used by
/// [`crate::strategy::StorageStrategy`].
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    /// Values at or below this many bytes are "small".
    pub small_bytes: usize,
    /// Values at or below this many bytes are "medium" (above is "large",
    /// further above `huge_bytes` is "huge").
    pub medium_bytes: usize,
    /// Values above this many bytes are "huge".
    pub huge_bytes: usize,
    /// TTLs at or below this are "short".
    pub short_ttl: Duration,
    /// TTLs at or below this are "medium" (above is "long").
    pub long_ttl: Duration,
    /// Maximum entries kept in the strategy's decision cache.
    pub decision_cache_capacity: usize,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            small_bytes: 1_024,
            medium_bytes: 64 * 1_024,
            huge_bytes: 1024 * 1_024,
            short_ttl: Duration::from_secs(60),
            long_ttl: Duration::from_secs(86_400),
            decision_cache_capacity: 10_000,
        }
    }
}

impl StrategyConfig {
    pub fn builder() -> StrategyConfigBuilder {
        StrategyConfigBuilder::default()
    }
}

/// Builder for [`StrategyConfig`].
#[derive(Debug, Default)]
pub struct StrategyConfigBuilder {
    cfg: Option<StrategyConfig>,
}

impl StrategyConfigBuilder {
    fn cfg_mut(&mut self) -> &mut StrategyConfig {
        self.cfg.get_or_insert_with(StrategyConfig::default)
    }

    pub fn small_bytes(mut self, bytes: usize) -> Self {
        self.cfg_mut().small_bytes = bytes;
        self
    }

    pub fn medium_bytes(mut self, bytes: usize) -> Self {
        self.cfg_mut().medium_bytes = bytes;
        self
    }

    pub fn huge_bytes(mut self, bytes: usize) -> Self {
        self.cfg_mut().huge_bytes = bytes;
        self
    }

    pub fn decision_cache_capacity(mut self, capacity: usize) -> Self {
        self.cfg_mut().decision_cache_capacity = capacity;
        self
    }

    pub fn build(self) -> StrategyConfig {
        self.cfg.unwrap_or_default()
    }
}

/// Security-layer configuration (spec §4.5).
#[derive(Clone)]
pub struct SecurityConfig {
    /// User-provided secret; key material is derived by hashing it.
    pub secret: Vec<u8>,
    /// Whether stored keys are obfuscated (hashed with a side map kept for
    /// reverse lookup).
    pub obfuscate_keys: bool,
    /// Prefix prepended to obfuscated keys.
    pub obfuscated_key_prefix: String,
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("secret", &"<redacted>")
            .field("obfuscate_keys", &self.obfuscate_keys)
            .field("obfuscated_key_prefix", &self.obfuscated_key_prefix)
            .finish()
    }
}

impl SecurityConfig {
    /// Build a config that encrypts values and obfuscates keys using
    /// `secret` as key material.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            obfuscate_keys: true,
            obfuscated_key_prefix: "ck_".to_string(),
        }
    }

    pub fn without_key_obfuscation(mut self) -> Self {
        self.obfuscate_keys = false;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.obfuscated_key_prefix = prefix.into();
        self
    }
}

/// Memory-manager configuration (spec §4.6).
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Total byte budget across all engines.
    pub limit_bytes: u64,
    /// Usage fraction (0.0-1.0) above which pressure is `Medium`.
    pub medium_threshold: f64,
    /// Usage fraction above which pressure is `High`.
    pub high_threshold: f64,
    /// Usage fraction above which pressure is `Critical` and emergency
    /// cleanup runs.
    pub critical_threshold: f64,
    /// How often the pressure level is recomputed in the background.
    pub poll_interval: Duration,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            limit_bytes: 50 * 1024 * 1024,
            medium_threshold: 0.80,
            high_threshold: 0.90,
            critical_threshold: 0.95,
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// Event-emission configuration (spec §4.1 "Event emission").
#[derive(Debug, Clone)]
pub struct EventsConfig {
    /// Ring buffer size used for the per-key throttle window.
    pub throttle_buffer_size: usize,
    /// Sliding window within which repeated events for the same key are
    /// suppressed.
    pub throttle_window: Duration,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            throttle_buffer_size: 1024,
            throttle_window: Duration::from_millis(100),
        }
    }
}
