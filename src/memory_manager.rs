//! Process-wide memory accounting and pressure-driven cleanup (spec §4.6).
//!
//! Owned by the Cache Manager and shared by reference with every engine.
//! Engines report size deltas as they mutate; the manager never inspects
//! engine internals directly.

use crate::config::MemoryConfig;
use crate::routing::RoutingCache;
use crate::serialize::SerializationCache;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Implemented by anything an engine can report byte-usage deltas to.
/// Kept as a trait (rather than a concrete type) so `engines::*` doesn't
/// need to depend on the rest of the manager's wiring.
pub trait MemoryReporter: Send + Sync {
    fn report_delta(&self, engine: &str, delta: i64);
}

/// Coarse-grained pressure bands derived from `usagePercentage` (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PressureLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl PressureLevel {
    fn from_usage(usage: f64, config: &MemoryConfig) -> Self {
        if usage >= config.critical_threshold {
            PressureLevel::Critical
        } else if usage >= config.high_threshold {
            PressureLevel::High
        } else if usage >= config.medium_threshold {
            PressureLevel::Medium
        } else {
            PressureLevel::Low
        }
    }
}

/// A snapshot of memory usage at a point in time.
#[derive(Debug, Clone)]
pub struct MemorySnapshot {
    pub total_used: u64,
    pub limit: u64,
    pub usage_percentage: f64,
    pub pressure_level: PressureLevel,
    pub engine_usage: Vec<(String, i64)>,
}

type PressureCallback = Box<dyn Fn(PressureLevel) + Send + Sync>;

/// Resources an emergency cleanup can reach into beyond per-engine
/// `cleanup()`/eviction, since those are engine-local by design.
pub struct EmergencyCleanupTargets {
    pub routing_cache: Arc<RoutingCache>,
    pub serialization_cache: Arc<SerializationCache>,
}

struct Engine {
    used: AtomicI64,
}

pub struct MemoryManager {
    config: MemoryConfig,
    engines: DashMap<String, Engine>,
    pressure: RwLock<PressureLevel>,
    callbacks: RwLock<Vec<PressureCallback>>,
}

impl MemoryManager {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config,
            engines: DashMap::new(),
            pressure: RwLock::new(PressureLevel::Low),
            callbacks: RwLock::new(Vec::new()),
        }
    }

    pub fn total_used(&self) -> u64 {
        self.engines
            .iter()
            .map(|e| e.used.load(Ordering::Relaxed).max(0) as u64)
            .sum()
    }

    pub fn usage_percentage(&self) -> f64 {
        if self.config.limit_bytes == 0 {
            return 0.0;
        }
        self.total_used() as f64 / self.config.limit_bytes as f64
    }

    pub fn pressure_level(&self) -> PressureLevel {
        *self.pressure.read()
    }

    pub fn snapshot(&self) -> MemorySnapshot {
        let engine_usage = self
            .engines
            .iter()
            .map(|e| (e.key().clone(), e.used.load(Ordering::Relaxed)))
            .collect();
        let total_used = self.total_used();
        let usage_percentage = self.usage_percentage();
        MemorySnapshot {
            total_used,
            limit: self.config.limit_bytes,
            usage_percentage,
            pressure_level: PressureLevel::from_usage(usage_percentage, &self.config),
            engine_usage,
        }
    }

    /// `true` iff admitting `size` more bytes keeps total usage at or
    /// under the configured limit.
    pub fn request_memory(&self, size: u64) -> bool {
        self.total_used() + size <= self.config.limit_bytes
    }

    /// Subscribe to pressure-level transitions. Returns nothing to
    /// unsubscribe with; callbacks live for the manager's lifetime,
    /// matching the cache manager's own event-listener model.
    pub fn on_pressure_change(&self, callback: impl Fn(PressureLevel) + Send + Sync + 'static) {
        self.callbacks.write().push(Box::new(callback));
    }

    /// Recompute the pressure level and notify subscribers on a
    /// transition. Called by the periodic poll timer and after every
    /// delta report.
    fn recompute_pressure(&self) {
        let usage = self.usage_percentage();
        let new_level = PressureLevel::from_usage(usage, &self.config);
        let changed = {
            let mut current = self.pressure.write();
            if *current != new_level {
                *current = new_level;
                true
            } else {
                false
            }
        };
        if changed {
            debug!(?new_level, usage, "memory pressure level changed");
            for callback in self.callbacks.read().iter() {
                callback(new_level);
            }
        }
    }

    /// Spawn the periodic pressure-poll timer (spec §4.6: default 60s via
    /// `poll_interval`). The manager holds the returned handle.
    pub fn spawn_poll_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        let interval = manager.config.poll_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                manager.recompute_pressure();
            }
        })
    }

    /// Reclaim memory by calling `cleanup()` on every engine, then, if
    /// still above the high threshold, invoking each engine's eviction
    /// policy directly and dropping non-critical process caches (spec
    /// §4.6 "emergency cleanup").
    pub async fn run_emergency_cleanup(
        &self,
        engines: &[Arc<dyn crate::engines::StorageEngine>],
        targets: &EmergencyCleanupTargets,
    ) {
        warn!("memory pressure high; running cleanup across engines");
        for engine in engines {
            if let Err(err) = engine.cleanup().await {
                warn!(?err, engine = engine.name(), "engine cleanup failed during pressure response");
            }
        }
        self.recompute_pressure();
        if self.pressure_level() < PressureLevel::High {
            return;
        }

        warn!("still under pressure after cleanup; running emergency reclamation");
        targets.routing_cache.clear();
        targets.serialization_cache.clear();

        for engine in engines {
            loop {
                if self.usage_percentage() < self.config.high_threshold {
                    break;
                }
                match engine.evict_one().await {
                    Ok(true) => continue,
                    _ => break,
                }
            }
        }
        self.recompute_pressure();
        info!(usage = self.usage_percentage(), "emergency cleanup complete");
    }
}

impl MemoryReporter for MemoryManager {
    fn report_delta(&self, engine: &str, delta: i64) {
        if let Some(entry) = self.engines.get(engine) {
            entry.used.fetch_add(delta, Ordering::Relaxed);
        } else {
            self.engines.insert(
                engine.to_string(),
                Engine {
                    used: AtomicI64::new(delta),
                },
            );
        }
        self.recompute_pressure();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(limit: u64) -> MemoryConfig {
        MemoryConfig {
            limit_bytes: limit,
            medium_threshold: 0.80,
            high_threshold: 0.90,
            critical_threshold: 0.95,
            poll_interval: std::time::Duration::from_secs(60),
        }
    }

    #[test]
    fn tracks_usage_across_engines() {
        let manager = MemoryManager::new(config(1000));
        manager.report_delta("memory", 400);
        manager.report_delta("cookie", 100);
        assert_eq!(manager.total_used(), 500);
        assert!((manager.usage_percentage() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn pressure_level_follows_thresholds() {
        let manager = MemoryManager::new(config(1000));
        manager.report_delta("memory", 850);
        assert_eq!(manager.pressure_level(), PressureLevel::Medium);
        manager.report_delta("memory", 100);
        assert_eq!(manager.pressure_level(), PressureLevel::High);
        manager.report_delta("memory", 50);
        assert_eq!(manager.pressure_level(), PressureLevel::Critical);
    }

    #[test]
    fn request_memory_respects_limit() {
        let manager = MemoryManager::new(config(1000));
        manager.report_delta("memory", 900);
        assert!(manager.request_memory(50));
        assert!(!manager.request_memory(200));
    }

    #[test]
    fn pressure_callback_fires_on_transition() {
        let manager = MemoryManager::new(config(1000));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        manager.on_pressure_change(move |level| seen_clone.lock().unwrap().push(level));
        manager.report_delta("memory", 850);
        manager.report_delta("memory", 10);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], PressureLevel::Medium);
    }
}
