//! Cache entry and metadata types (spec §3.1).

use serde::{Deserialize, Serialize};

/// Shape of the value a [`CacheEntry`] carries, recorded alongside the
/// serialized payload so `get` can hand back a typed hint without
/// re-inspecting the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    Binary,
}

impl DataType {
    /// Infer a [`DataType`] from a `serde_json::Value`'s shape.
    pub fn of(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(_) => Self::String,
            serde_json::Value::Number(_) => Self::Number,
            serde_json::Value::Bool(_) => Self::Boolean,
            serde_json::Value::Array(_) => Self::Array,
            serde_json::Value::Object(_) => Self::Object,
            serde_json::Value::Null => Self::Object,
        }
    }

    /// Whether this shape is treated as "complex" by the storage strategy.
    pub fn is_complex(&self) -> bool {
        matches!(self, Self::Object | Self::Array)
    }
}

/// A stored value plus its bookkeeping metadata, as held inside a storage
/// engine. `value` is the already-serialized (and possibly encrypted)
/// textual payload — engines never see the original typed value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Opaque serialized (and possibly encrypted) payload.
    pub value: String,
    /// Epoch-millisecond creation timestamp.
    pub created_at: i64,
    /// Epoch-millisecond timestamp of the most recent access.
    pub last_accessed_at: i64,
    /// Epoch-millisecond expiry; absent means no TTL.
    pub expires_at: Option<i64>,
    /// Shape of the original value.
    pub data_type: DataType,
    /// Payload byte length (UTF-8 semantics).
    pub size: usize,
    /// Monotone access counter since creation.
    pub access_count: u64,
    /// Name of the engine currently storing this entry.
    pub engine: String,
    /// Whether `value` holds ciphertext rather than plaintext.
    pub encrypted: bool,
}

impl CacheEntry {
    /// Build a fresh entry for a just-written value.
    pub fn new(
        value: String,
        data_type: DataType,
        engine: impl Into<String>,
        ttl_ms: Option<i64>,
        encrypted: bool,
        now_ms: i64,
    ) -> Self {
        let size = value.len();
        Self {
            value,
            created_at: now_ms,
            last_accessed_at: now_ms,
            expires_at: ttl_ms.map(|ttl| now_ms + ttl),
            data_type,
            size,
            access_count: 0,
            engine: engine.into(),
            encrypted,
        }
    }

    /// Whether this entry has passed its expiry at `now_ms`.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        matches!(self.expires_at, Some(exp) if now_ms >= exp)
    }

    /// Record an access, bumping the counter and last-accessed timestamp.
    pub fn touch(&mut self, now_ms: i64) {
        self.access_count += 1;
        self.last_accessed_at = now_ms;
    }
}

/// Metadata returned by `CacheManager::get_metadata`, a read-only view of
/// a [`CacheEntry`] without its payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub created_at: i64,
    pub last_accessed_at: i64,
    pub expires_at: Option<i64>,
    pub data_type: DataType,
    pub size: usize,
    pub access_count: u64,
    pub engine: String,
    pub encrypted: bool,
}

impl From<&CacheEntry> for Metadata {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            created_at: entry.created_at,
            last_accessed_at: entry.last_accessed_at,
            expires_at: entry.expires_at,
            data_type: entry.data_type,
            size: entry.size,
            access_count: entry.access_count,
            engine: entry.engine.clone(),
            encrypted: entry.encrypted,
        }
    }
}

/// Current epoch-millisecond time, the single clock source entries use.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
