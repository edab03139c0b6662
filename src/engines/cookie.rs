//! Cookie engine (spec §4.2): stands in for a browser cookie jar. Total
//! capacity is small (4 KB, matching the per-origin cookie budget most
//! browsers enforce) so keys and values are percent-encoded the way a
//! real `document.cookie` round trip would store them, and TTL maps
//! onto the cookie's own expiry attribute rather than the shared
//! [`ttl_wrapper`](super::ttl_wrapper) format.

use super::StorageEngine;
use crate::entry::now_ms;
use crate::error::{CacheError, Result};
use crate::memory_manager::MemoryReporter;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const DEFAULT_MAX_SIZE_BYTES: u64 = 4 * 1024;

fn percent_encode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.as_bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(*byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn percent_decode(encoded: &str) -> String {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(byte) = u8::from_str_radix(&encoded[i + 1..i + 3], 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

struct Cookie {
    encoded_value: String,
    expires_at: Option<i64>,
}

impl Cookie {
    fn record_size(encoded_key: &str, encoded_value: &str) -> u64 {
        (encoded_key.len() + 1 + encoded_value.len()) as u64
    }
}

pub struct CookieEngine {
    jar: DashMap<String, Cookie>,
    used_size: AtomicU64,
    max_size_bytes: u64,
    reporter: Option<Arc<dyn MemoryReporter>>,
}

impl CookieEngine {
    pub fn new(max_size_bytes: u64, reporter: Option<Arc<dyn MemoryReporter>>) -> Self {
        Self {
            jar: DashMap::new(),
            used_size: AtomicU64::new(0),
            max_size_bytes,
            reporter,
        }
    }

    fn report_delta(&self, delta: i64) {
        if delta != 0 {
            if let Some(reporter) = &self.reporter {
                reporter.report_delta(self.name(), delta);
            }
        }
    }

    fn remove_locked(&self, encoded_key: &str) {
        if let Some((_, cookie)) = self.jar.remove(encoded_key) {
            let size = Cookie::record_size(encoded_key, &cookie.encoded_value);
            self.used_size.fetch_sub(size, Ordering::Relaxed);
            self.report_delta(-(size as i64));
        }
    }
}

impl Default for CookieEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE_BYTES, None)
    }
}

#[async_trait]
impl StorageEngine for CookieEngine {
    async fn set_item(&self, key: &str, text_value: &str, ttl_ms: Option<i64>) -> Result<()> {
        let encoded_key = percent_encode(key);
        let encoded_value = percent_encode(text_value);
        let new_size = Cookie::record_size(&encoded_key, &encoded_value);

        let old_size = self
            .jar
            .get(&encoded_key)
            .map(|c| Cookie::record_size(&encoded_key, &c.encoded_value));
        let used_without_old = self.used_size.load(Ordering::Relaxed) - old_size.unwrap_or(0);
        if used_without_old + new_size > self.max_size_bytes {
            return Err(CacheError::quota_exceeded(format!(
                "cookie jar quota exceeded storing {new_size} bytes"
            )));
        }

        if let Some(old) = old_size {
            self.used_size.fetch_sub(old, Ordering::Relaxed);
            self.report_delta(-(old as i64));
        }
        self.jar.insert(
            encoded_key,
            Cookie {
                encoded_value,
                expires_at: ttl_ms.map(|ttl| now_ms() + ttl),
            },
        );
        self.used_size.fetch_add(new_size, Ordering::Relaxed);
        self.report_delta(new_size as i64);
        Ok(())
    }

    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        let encoded_key = percent_encode(key);
        let now = now_ms();
        let hit = self.jar.get(&encoded_key).map(|c| {
            let expired = matches!(c.expires_at, Some(exp) if now >= exp);
            (expired, c.encoded_value.clone())
        });
        match hit {
            Some((true, _)) => {
                self.remove_locked(&encoded_key);
                Ok(None)
            }
            Some((false, encoded_value)) => Ok(Some(percent_decode(&encoded_value))),
            None => Ok(None),
        }
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.remove_locked(&percent_encode(key));
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let total = self.used_size.swap(0, Ordering::Relaxed);
        self.jar.clear();
        self.report_delta(-(total as i64));
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let now = now_ms();
        Ok(self
            .jar
            .iter()
            .filter(|e| !matches!(e.expires_at, Some(exp) if now >= exp))
            .map(|e| percent_decode(e.key()))
            .collect())
    }

    async fn has_item(&self, key: &str) -> Result<bool> {
        Ok(self.get_item(key).await?.is_some())
    }

    async fn length(&self) -> Result<usize> {
        Ok(self.jar.len())
    }

    async fn cleanup(&self) -> Result<()> {
        let now = now_ms();
        let expired: Vec<String> = self
            .jar
            .iter()
            .filter(|e| matches!(e.expires_at, Some(exp) if now >= exp))
            .map(|e| e.key().clone())
            .collect();
        for encoded_key in expired {
            self.remove_locked(&encoded_key);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "cookie"
    }

    fn available(&self) -> bool {
        true
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

    #[tokio::test]
    async fn round_trips_with_special_characters() {
        let engine = CookieEngine::default();
        engine.set_item("k e y", "v=a;b", None).await.unwrap();
        assert_eq!(engine.get_item("k e y").await.unwrap().as_deref(), Some("v=a;b"));
    }

    #[tokio::test]
    async fn ttl_maps_to_cookie_expiry() {
        let engine = CookieEngine::default();
        engine.set_item("k", "v", Some(1)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(engine.get_item("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn quota_exceeded_past_jar_budget() {
        let engine = CookieEngine::new(8, None);
        let err = engine.set_item("k", "way too large a value", None).await.unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::QuotaExceeded);
    }

    #[test]
    fn percent_round_trip() {
        let encoded = percent_encode("a b&c=d");
        assert_eq!(percent_decode(&encoded), "a b&c=d");
    }
}
