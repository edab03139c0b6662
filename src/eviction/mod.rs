//! Eviction policies (spec §4.3).
//!
//! Each capacity-bounded engine holds exactly one [`EvictionPolicy`]
//! instance. Implementations use interior mutability (`parking_lot::Mutex`)
//! so the trait can be called through a shared `Arc<dyn EvictionPolicy>`
//! the way the manager holds engines through shared handles (spec §9
//! "Dynamic dispatch across engines").

pub mod arc;
pub mod fifo;
pub mod lfu;
pub mod lru;
pub mod mru;
pub mod random;
pub mod ttl;

use std::time::Duration;

/// Point-in-time view over a policy's resident set, exposed for stats and
/// tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionStats {
    /// Number of keys currently tracked.
    pub resident: usize,
}

/// Shared contract every eviction policy implements (spec §4.3).
pub trait EvictionPolicy: Send + Sync {
    /// Record that `key` was just inserted, with an optional TTL used only
    /// by [`ttl::TtlPolicy`].
    fn record_add(&self, key: &str, ttl: Option<Duration>);

    /// Record that `key` was read or refreshed.
    fn record_access(&self, key: &str);

    /// Remove `key` from policy state entirely (explicit user-initiated
    /// removal, or expiry — the key is gone, not merely evicted under
    /// capacity pressure).
    fn remove_key(&self, key: &str);

    /// Record that `key` was evicted by [`Self::get_eviction_key`] to make
    /// room for something else. Distinct from [`Self::remove_key`] so
    /// history-aware policies (ARC's B1/B2 ghost lists) can retain a trace
    /// of the eviction; policies without such history fall back to a plain
    /// removal.
    fn record_eviction(&self, key: &str) {
        self.remove_key(key);
    }

    /// Pick the next victim without removing it from policy state — the
    /// caller removes it from both the engine and the policy afterward via
    /// [`EvictionPolicy::remove_key`].
    fn get_eviction_key(&self) -> Option<String>;

    /// Drop all policy state.
    fn clear(&self);

    /// Current policy statistics.
    fn stats(&self) -> EvictionStats;

    /// Policy name, used for runtime switching and stats discriminants.
    fn name(&self) -> &'static str;
}

/// Construct a policy by name. Unknown names fall back to LRU with a
/// warning, per spec §4.3.
pub fn by_name(name: &str) -> Box<dyn EvictionPolicy> {
    match name {
        "lru" => Box::new(lru::LruPolicy::new()),
        "mru" => Box::new(mru::MruPolicy::new()),
        "lfu" => Box::new(lfu::LfuPolicy::new()),
        "fifo" => Box::new(fifo::FifoPolicy::new()),
        "random" => Box::new(random::RandomPolicy::new()),
        "ttl" => Box::new(ttl::TtlPolicy::new()),
        "arc" => Box::new(arc::ArcPolicy::new()),
        other => {
            tracing::warn!(policy = other, "unknown eviction policy, falling back to LRU");
            Box::new(lru::LruPolicy::new())
        }
    }
}

/// Recreate `new_policy` populated with every key currently tracked by
/// `old`, preserving residents across a runtime policy switch (spec §4.3
/// "Switching policy at runtime").
pub fn migrate(old: &dyn EvictionPolicy, new_name: &str, keys_in_order: &[String]) -> Box<dyn EvictionPolicy> {
    let fresh = by_name(new_name);
    for key in keys_in_order {
        fresh.record_add(key, None);
    }
    let _ = old;
    fresh
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_policy_name_falls_back_to_lru() {
        let policy = by_name("nonexistent");
        assert_eq!(policy.name(), "lru");
    }

    #[test]
    fn migration_preserves_resident_keys() {
        let old = lru::LruPolicy::new();
        old.record_add("a", None);
        old.record_add("b", None);
        let migrated = migrate(&old, "fifo", &["a".to_string(), "b".to_string()]);
        assert_eq!(migrated.stats().resident, 2);
        assert_eq!(migrated.name(), "fifo");
    }
}
