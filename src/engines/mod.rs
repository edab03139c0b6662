//! Storage engines (spec §4.2): a family of backends sharing one capability
//! contract. Each in-process reference implementation models the contract
//! a host runtime's native store (`localStorage`, a cookie jar, IndexedDB,
//! …) would provide; a real embedder swaps the engine behind this trait
//! for a genuine bridge to that runtime.

pub mod cookie;
pub mod indexed_persistent;
pub mod local_persistent;
pub mod memory;
pub mod session_persistent;
pub mod size_cache;
pub mod ttl_wrapper;

use crate::error::Result;
use async_trait::async_trait;

/// Descriptor fields every engine reports to the manager and to stats.
#[derive(Debug, Clone)]
pub struct EngineDescriptor {
    pub name: &'static str,
    pub available: bool,
    pub max_size: u64,
    pub used_size: u64,
}

/// Shared contract for every storage engine (spec §4.2).
///
/// Engines operate purely on text: the manager serializes (and optionally
/// encrypts) before calling `set_item`, and deserializes after `get_item`.
/// TTL is always expressed in milliseconds from the call.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Store `text_value` under `key`, with an optional TTL in milliseconds.
    async fn set_item(&self, key: &str, text_value: &str, ttl_ms: Option<i64>) -> Result<()>;

    /// Retrieve the raw stored text for `key`, or `None` if absent/expired.
    async fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Remove `key`, a no-op if absent.
    async fn remove_item(&self, key: &str) -> Result<()>;

    /// Remove every entry.
    async fn clear(&self) -> Result<()>;

    /// List every resident key.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Whether `key` is present and unexpired.
    async fn has_item(&self, key: &str) -> Result<bool>;

    /// Number of resident entries.
    async fn length(&self) -> Result<usize>;

    /// Purge expired entries.
    async fn cleanup(&self) -> Result<()>;

    /// Evict exactly one resident entry via this engine's own eviction
    /// policy, for the memory manager's emergency cleanup path. Returns
    /// `false` if the engine has nothing left to evict. Engines with no
    /// eviction policy (e.g. cookie, indexed-persistent) keep the default.
    async fn evict_one(&self) -> Result<bool> {
        Ok(false)
    }

    /// Store multiple items in one pass; default implementation calls
    /// `set_item` per item; engines with a batch-friendly store override
    /// this.
    async fn batch_set(&self, items: &[(String, String, Option<i64>)]) -> Result<()> {
        for (key, value, ttl_ms) in items {
            self.set_item(key, value, *ttl_ms).await?;
        }
        Ok(())
    }

    /// Fetch multiple items in one pass.
    async fn batch_get(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.get_item(key).await?);
        }
        Ok(out)
    }

    /// Remove multiple items in one pass.
    async fn batch_remove(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            self.remove_item(key).await?;
        }
        Ok(())
    }

    /// Check presence of multiple keys in one pass.
    async fn batch_has(&self, keys: &[String]) -> Result<Vec<bool>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.has_item(key).await?);
        }
        Ok(out)
    }

    /// Engine name, the discriminant used by routing and stats.
    fn name(&self) -> &'static str;

    /// Whether this engine is currently usable (e.g. async init completed).
    fn available(&self) -> bool;

    /// Declared capacity in bytes.
    fn max_size(&self) -> u64;

    /// Bytes currently in use, best-effort.
    fn used_size(&self) -> u64;

    /// Snapshot descriptor combining the accessors above.
    fn descriptor(&self) -> EngineDescriptor {
        EngineDescriptor {
            name: self.name(),
            available: self.available(),
            max_size: self.max_size(),
            used_size: self.used_size(),
        }
    }
}

/// UTF-8 byte length of `text`, the size unit every engine accounts in
/// (spec §4.2: "1/2/3/4 bytes per code unit by range").
pub fn utf8_byte_length(text: &str) -> usize {
    text.len()
}
