//! Key validation and obfuscation (spec §4.1 "Key processing", §4.5 "Key
//! obfuscation").

use crate::error::{CacheError, Result};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Maximum key length, inclusive.
pub const MAX_KEY_LENGTH: usize = 250;

/// Validate a key per spec §4.1: non-empty, length ≤ 250, no Unicode
/// control characters.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::invalid_key("key must not be empty"));
    }
    if key.chars().count() > MAX_KEY_LENGTH {
        return Err(CacheError::invalid_key(format!(
            "key exceeds maximum length of {MAX_KEY_LENGTH} characters"
        )));
    }
    if key.chars().any(|c| c.is_control()) {
        return Err(CacheError::invalid_key(
            "key must not contain control characters",
        ));
    }
    Ok(())
}

/// Deterministic hash of a key used both for obfuscation and for routing
/// cache fingerprints. Not meant to be reversed directly — reversal goes
/// through the side map in [`KeyObfuscator`].
pub fn fingerprint(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Obfuscates keys before they're handed to engines, keeping a side map so
/// enumeration (`keys()`) can recover the plaintext form — per spec §9 OQ2,
/// "treat as a side map always".
#[derive(Debug, Clone)]
pub struct KeyObfuscator {
    prefix: String,
    reverse: Arc<DashMap<String, String>>,
}

impl KeyObfuscator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            reverse: Arc::new(DashMap::new()),
        }
    }

    /// Obfuscate `key`, recording the reverse mapping.
    pub fn obfuscate(&self, key: &str) -> String {
        let obfuscated = format!("{}{}", self.prefix, fingerprint(key));
        self.reverse.insert(obfuscated.clone(), key.to_string());
        obfuscated
    }

    /// Recover the plaintext key for a previously obfuscated one, if known.
    pub fn deobfuscate(&self, obfuscated: &str) -> Option<String> {
        self.reverse.get(obfuscated).map(|entry| entry.clone())
    }

    /// Drop the reverse mapping for a key that's being removed.
    pub fn forget(&self, obfuscated: &str) {
        self.reverse.remove(obfuscated);
    }

    /// Clear the entire side map.
    pub fn clear(&self) {
        self.reverse.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_key() {
        assert!(validate_key("").is_err());
    }

    #[test]
    fn rejects_overlong_key() {
        let key = "a".repeat(MAX_KEY_LENGTH + 1);
        assert!(validate_key(&key).is_err());
    }

    #[test]
    fn rejects_control_characters() {
        assert!(validate_key("abc\ndef").is_err());
        assert!(validate_key("abc\tdef").is_err());
    }

    #[test]
    fn accepts_normal_key() {
        assert!(validate_key("user:123:profile").is_ok());
    }

    #[test]
    fn obfuscation_round_trips_through_side_map() {
        let obfuscator = KeyObfuscator::new("ck_");
        let obfuscated = obfuscator.obfuscate("user:1");
        assert!(obfuscated.starts_with("ck_"));
        assert_eq!(obfuscator.deobfuscate(&obfuscated).as_deref(), Some("user:1"));
    }

    #[test]
    fn forgetting_a_key_drops_reverse_lookup() {
        let obfuscator = KeyObfuscator::new("ck_");
        let obfuscated = obfuscator.obfuscate("user:1");
        obfuscator.forget(&obfuscated);
        assert!(obfuscator.deobfuscate(&obfuscated).is_none());
    }

    #[test]
    fn fingerprint_is_deterministic() {
        assert_eq!(fingerprint("same"), fingerprint("same"));
        assert_ne!(fingerprint("a"), fingerprint("b"));
    }
}
