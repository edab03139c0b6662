//! Cache statistics (spec §4.1 "Stats"): best-effort counters tracked
//! per-engine plus process-wide totals. Counter increments are
//! lock-free and need not be linearized with concurrent get/set.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
struct EngineCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Per-engine stats snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineStats {
    pub item_count: usize,
    pub size: u64,
    pub available: bool,
    pub hits: u64,
    pub misses: u64,
}

/// Process-wide cache statistics snapshot.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub total_items: usize,
    pub total_bytes: u64,
    pub per_engine: Vec<(String, EngineStats)>,
    pub hit_rate: f64,
    pub expired_count: u64,
}

/// Tracks hit/miss/expiry counters; engine item counts and byte sizes
/// are read live from engine descriptors when a snapshot is taken.
pub struct StatsCollector {
    counters: DashMap<String, EngineCounters>,
    expired_count: AtomicU64,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
            expired_count: AtomicU64::new(0),
        }
    }

    pub fn record_hit(&self, engine: &str) {
        self.counters.entry(engine.to_string()).or_default().hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self, engine: &str) {
        self.counters
            .entry(engine.to_string())
            .or_default()
            .misses
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expired(&self) {
        self.expired_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Build a full snapshot from the live engine descriptors passed in
    /// (name, item_count, used_size_bytes, available).
    pub fn snapshot(&self, engines: &[(String, usize, u64, bool)]) -> CacheStats {
        let mut total_items = 0usize;
        let mut total_bytes = 0u64;
        let mut total_hits = 0u64;
        let mut total_misses = 0u64;
        let mut per_engine = Vec::with_capacity(engines.len());

        for (name, item_count, size, available) in engines {
            let counters = self.counters.get(name);
            let hits = counters.as_ref().map(|c| c.hits.load(Ordering::Relaxed)).unwrap_or(0);
            let misses = counters.as_ref().map(|c| c.misses.load(Ordering::Relaxed)).unwrap_or(0);
            total_items += item_count;
            total_bytes += size;
            total_hits += hits;
            total_misses += misses;
            per_engine.push((
                name.clone(),
                EngineStats {
                    item_count: *item_count,
                    size: *size,
                    available: *available,
                    hits,
                    misses,
                },
            ));
        }

        let total_requests = total_hits + total_misses;
        let hit_rate = if total_requests == 0 {
            0.0
        } else {
            total_hits as f64 / total_requests as f64
        };

        CacheStats {
            total_items,
            total_bytes,
            per_engine,
            hit_rate,
            expired_count: self.expired_count.load(Ordering::Relaxed),
        }
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}
