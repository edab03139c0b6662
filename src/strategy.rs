//! Storage strategy (spec §4.4): recommends an engine for a `(key,
//! value, opts)` triple by bucketing size/TTL/type and applying a small
//! rule table, with a bounded decision cache keyed by the bucket triple.

use crate::config::StrategyConfig;
use crate::entry::DataType;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SizeBucket {
    Small,
    Medium,
    Large,
    Huge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TtlBucket {
    Short,
    Medium,
    Persistent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TypeBucket {
    Scalar,
    Object,
    Array,
    Binary,
}

impl From<DataType> for TypeBucket {
    fn from(data_type: DataType) -> Self {
        match data_type {
            DataType::Object => TypeBucket::Object,
            DataType::Array => TypeBucket::Array,
            DataType::Binary => TypeBucket::Binary,
            DataType::String | DataType::Number | DataType::Boolean => TypeBucket::Scalar,
        }
    }
}

type BucketKey = (SizeBucket, TtlBucket, TypeBucket);

fn bucket_size(bytes: usize, config: &StrategyConfig) -> SizeBucket {
    if bytes <= config.small_bytes {
        SizeBucket::Small
    } else if bytes <= config.medium_bytes {
        SizeBucket::Medium
    } else if bytes <= config.huge_bytes {
        SizeBucket::Large
    } else {
        SizeBucket::Huge
    }
}

fn bucket_ttl(ttl: Option<Duration>, config: &StrategyConfig) -> TtlBucket {
    match ttl {
        None => TtlBucket::Persistent,
        Some(ttl) if ttl <= config.short_ttl => TtlBucket::Short,
        Some(ttl) if ttl <= config.long_ttl => TtlBucket::Medium,
        Some(_) => TtlBucket::Persistent,
    }
}

/// An unconditional override that bypasses the size+ttl table entirely
/// (spec §4.4's type/large-payload rows), or `None` if no override
/// applies and the size+ttl table should decide.
fn overriding_rule(size: SizeBucket, ty: TypeBucket) -> Option<(&'static str, &'static str)> {
    if ty == TypeBucket::Binary {
        return Some(("indexedPersistent", "binary value"));
    }
    if matches!(ty, TypeBucket::Object | TypeBucket::Array) {
        return Some(("indexedPersistent", "complex object/array"));
    }
    if matches!(size, SizeBucket::Large | SizeBucket::Huge) {
        return Some(("indexedPersistent", "large/huge payload"));
    }
    None
}

/// Rules from the size+ttl table (spec §4.4). Multiple rules may fire
/// for the same bucket (e.g. medium+medium); when they disagree the
/// caller takes a weighted majority and reports lower confidence.
fn candidate_rules(size: SizeBucket, ttl: TtlBucket) -> Vec<(&'static str, &'static str)> {
    match (size, ttl) {
        (SizeBucket::Small, TtlBucket::Short) => vec![("memory", "small+short")],
        (SizeBucket::Small, _) => vec![("localPersistent", "small+medium/long/persistent")],
        (SizeBucket::Medium, TtlBucket::Short) => vec![("memory", "medium+short")],
        (SizeBucket::Medium, TtlBucket::Medium) => vec![
            ("sessionPersistent", "medium+medium"),
            ("localPersistent", "medium+medium"),
        ],
        (SizeBucket::Medium, TtlBucket::Persistent) => vec![("localPersistent", "medium+persistent")],
        _ => vec![],
    }
}

/// `{engine, reason, confidence}` (spec §3.1).
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyDecision {
    pub engine: String,
    pub reason: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
    pub capacity: usize,
}

impl DecisionCacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct DecisionCache {
    capacity: usize,
    entries: DashMap<BucketKey, StrategyDecision>,
    order: Mutex<VecDeque<BucketKey>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DecisionCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn get(&self, key: &BucketKey) -> Option<StrategyDecision> {
        match self.entries.get(key) {
            Some(decision) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(decision.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn put(&self, key: BucketKey, decision: StrategyDecision) {
        if self.entries.insert(key, decision).is_none() {
            let mut order = self.order.lock();
            order.push_back(key);
            if order.len() > self.capacity {
                if let Some(oldest) = order.pop_front() {
                    self.entries.remove(&oldest);
                }
            }
        }
    }

    fn stats(&self) -> DecisionCacheStats {
        DecisionCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            len: self.entries.len(),
            capacity: self.capacity,
        }
    }
}

/// Recommends a storage engine for a value, given its size, TTL, and
/// data type.
pub struct StorageStrategy {
    config: StrategyConfig,
    enabled: bool,
    default_engine: String,
    cache: DecisionCache,
}

impl StorageStrategy {
    pub fn new(config: StrategyConfig, enabled: bool, default_engine: impl Into<String>) -> Self {
        let capacity = config.decision_cache_capacity;
        Self {
            config,
            enabled,
            default_engine: default_engine.into(),
            cache: DecisionCache::new(capacity),
        }
    }

    /// Recommend an engine for a value of `size_bytes` bytes, with
    /// optional `ttl`, of the given `data_type`. Always evaluated fresh
    /// against the decision cache; the caller is responsible for
    /// emitting the `strategy` event (spec §4.4: "MUST emit... whenever
    /// it is consulted, not on cache hits" — the cache here concerns
    /// the strategy's own bucket lookup, not the value cache).
    pub fn recommend(&self, size_bytes: usize, ttl: Option<Duration>, data_type: DataType) -> StrategyDecision {
        if !self.enabled {
            return StrategyDecision {
                engine: self.default_engine.clone(),
                reason: "Strategy disabled".to_string(),
                confidence: 0.5,
            };
        }

        let key = (
            bucket_size(size_bytes, &self.config),
            bucket_ttl(ttl, &self.config),
            TypeBucket::from(data_type),
        );

        if let Some(decision) = self.cache.get(&key) {
            return decision;
        }

        let decision = self.decide(key);
        self.cache.put(key, decision.clone());
        decision
    }

    fn decide(&self, key: BucketKey) -> StrategyDecision {
        let (size, ttl, ty) = key;

        if let Some((engine, reason)) = overriding_rule(size, ty) {
            return StrategyDecision {
                engine: engine.to_string(),
                reason: reason.to_string(),
                confidence: 0.9,
            };
        }

        let rules = candidate_rules(size, ttl);
        if rules.is_empty() {
            return StrategyDecision {
                engine: self.default_engine.clone(),
                reason: "No strategy rule matched".to_string(),
                confidence: 0.5,
            };
        }

        let mut votes: HashMap<&'static str, (u32, Vec<&'static str>)> = HashMap::new();
        for (engine, reason) in &rules {
            let entry = votes.entry(engine).or_insert((0, Vec::new()));
            entry.0 += 1;
            entry.1.push(reason);
        }

        let total: u32 = votes.values().map(|(count, _)| count).sum();
        let (winner, (count, reasons)) = votes
            .into_iter()
            .max_by_key(|(_, (count, _))| *count)
            .expect("rules is non-empty");

        let confidence = if total == count {
            0.9
        } else {
            0.9 * (count as f64 / total as f64)
        };

        StrategyDecision {
            engine: winner.to_string(),
            reason: reasons.join("; "),
            confidence,
        }
    }

    pub fn cache_stats(&self) -> DecisionCacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy() -> StorageStrategy {
        StorageStrategy::new(StrategyConfig::default(), true, "memory")
    }

    #[test]
    fn small_short_ttl_goes_to_memory() {
        let strategy = strategy();
        let decision = strategy.recommend(100, Some(Duration::from_secs(10)), DataType::String);
        assert_eq!(decision.engine, "memory");
        assert!((decision.confidence - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn small_persistent_ttl_goes_to_local_persistent() {
        let strategy = strategy();
        let decision = strategy.recommend(100, None, DataType::String);
        assert_eq!(decision.engine, "localPersistent");
    }

    #[test]
    fn binary_always_goes_to_indexed_persistent() {
        let strategy = strategy();
        let decision = strategy.recommend(10, Some(Duration::from_secs(1)), DataType::Binary);
        assert_eq!(decision.engine, "indexedPersistent");
    }

    #[test]
    fn huge_payload_goes_to_indexed_persistent_regardless_of_ttl() {
        let strategy = strategy();
        let decision = strategy.recommend(10 * 1024 * 1024, None, DataType::String);
        assert_eq!(decision.engine, "indexedPersistent");
    }

    #[test]
    fn competing_rules_lower_confidence() {
        let strategy = strategy();
        let decision = strategy.recommend(30_000, Some(Duration::from_secs(3_600)), DataType::String);
        assert!(decision.confidence < 0.9);
    }

    #[test]
    fn disabled_strategy_returns_default_with_fixed_confidence() {
        let strategy = StorageStrategy::new(StrategyConfig::default(), false, "memory");
        let decision = strategy.recommend(10, None, DataType::String);
        assert_eq!(decision.engine, "memory");
        assert_eq!(decision.reason, "Strategy disabled");
        assert_eq!(decision.confidence, 0.5);
    }

    #[test]
    fn repeated_lookup_is_served_from_decision_cache() {
        let strategy = strategy();
        strategy.recommend(100, Some(Duration::from_secs(10)), DataType::String);
        strategy.recommend(100, Some(Duration::from_secs(10)), DataType::String);
        let stats = strategy.cache_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }
}
