//! The security layer (spec §4.5): AEAD encryption, key obfuscation,
//! and an integrity check, all driven from one [`SecurityContext`].

use crate::config::SecurityConfig;
use crate::error::{CacheError, Result};
use crate::keys::KeyObfuscator;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::warn;

const NONCE_SIZE: usize = 12;

/// Derive a 256-bit key from an arbitrary-length secret by hashing it
/// (spec §4.5: "256-bit key derived by hashing the user-provided secret").
fn derive_key(secret: &[u8]) -> [u8; 32] {
    let digest = Sha256::digest(secret);
    digest.into()
}

/// AEAD encryption, key obfuscation, and integrity checking, configured
/// from a [`SecurityConfig`].
pub struct SecurityContext {
    cipher: Option<Aes256Gcm>,
    obfuscator: Option<KeyObfuscator>,
}

impl SecurityContext {
    pub fn new(config: &SecurityConfig) -> Self {
        let cipher = Aes256Gcm::new_from_slice(&derive_key(&config.secret)).ok();
        let obfuscator = config
            .obfuscate_keys
            .then(|| KeyObfuscator::new(config.obfuscated_key_prefix.clone()));
        Self { cipher, obfuscator }
    }

    /// Disabled context: no encryption, no key obfuscation. Used when
    /// `config.security` is absent.
    pub fn disabled() -> Self {
        Self {
            cipher: None,
            obfuscator: None,
        }
    }

    pub fn encryption_enabled(&self) -> bool {
        self.cipher.is_some()
    }

    pub fn obfuscator(&self) -> Option<&KeyObfuscator> {
        self.obfuscator.as_ref()
    }

    /// Encrypt `plaintext`, returning base64 of `nonce || ciphertext`. If
    /// no cipher is configured, falls back to plain base64 and warns —
    /// callers MUST treat that output as non-confidential (spec §4.5).
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        match &self.cipher {
            Some(cipher) => {
                let mut nonce_bytes = [0u8; NONCE_SIZE];
                OsRng.fill_bytes(&mut nonce_bytes);
                let nonce = Nonce::from_slice(&nonce_bytes);
                let ciphertext = cipher
                    .encrypt(nonce, plaintext.as_bytes())
                    .map_err(|_| CacheError::crypto_fail("AEAD encryption failed"))?;
                let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
                combined.extend_from_slice(&nonce_bytes);
                combined.extend_from_slice(&ciphertext);
                Ok(BASE64.encode(combined))
            }
            None => {
                warn!("encryption requested but no cipher configured; falling back to base64");
                Ok(BASE64.encode(plaintext.as_bytes()))
            }
        }
    }

    /// Decrypt a value produced by [`Self::encrypt`].
    pub fn decrypt(&self, stored: &str) -> Result<String> {
        match &self.cipher {
            Some(cipher) => {
                let combined = BASE64
                    .decode(stored)
                    .map_err(|_| CacheError::crypto_fail("invalid ciphertext encoding"))?;
                if combined.len() < NONCE_SIZE + 1 {
                    return Err(CacheError::crypto_fail("invalid ciphertext"));
                }
                let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
                let nonce = Nonce::from_slice(nonce_bytes);
                let plaintext = cipher
                    .decrypt(nonce, ciphertext)
                    .map_err(|_| CacheError::crypto_fail("invalid ciphertext"))?;
                String::from_utf8(plaintext)
                    .map_err(|_| CacheError::crypto_fail("decrypted payload was not valid UTF-8"))
            }
            None => {
                let raw = BASE64
                    .decode(stored)
                    .map_err(|_| CacheError::crypto_fail("invalid ciphertext encoding"))?;
                String::from_utf8(raw)
                    .map_err(|_| CacheError::crypto_fail("decoded payload was not valid UTF-8"))
            }
        }
    }

    /// `true` iff `decrypt(stored)` equals `plaintext`, false on any
    /// mismatch or crypto error. Both empty counts as true (spec §4.5).
    pub fn verify_integrity(&self, plaintext: &str, stored: &str) -> bool {
        if plaintext.is_empty() && stored.is_empty() {
            return true;
        }
        match self.decrypt(stored) {
            Ok(decrypted) => decrypted == plaintext,
            Err(_) => false,
        }
    }

    /// Obfuscate `key` if obfuscation is enabled, else return it unchanged.
    pub fn obfuscate_key(&self, key: &str) -> String {
        match &self.obfuscator {
            Some(obfuscator) => obfuscator.obfuscate(key),
            None => key.to_string(),
        }
    }

    /// Recover the plaintext key for an obfuscated one, if known.
    pub fn deobfuscate_key(&self, obfuscated: &str) -> Option<String> {
        self.obfuscator
            .as_ref()
            .and_then(|o| o.deobfuscate(obfuscated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context_with_secret(secret: &str) -> SecurityContext {
        SecurityContext::new(&SecurityConfig::new(secret.as_bytes().to_vec()))
    }

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let ctx = context_with_secret("top secret");
        let ciphertext = ctx.encrypt("hello world").unwrap();
        assert_ne!(ciphertext, "hello world");
        assert_eq!(ctx.decrypt(&ciphertext).unwrap(), "hello world");
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let ctx = context_with_secret("top secret");
        let mut ciphertext = ctx.encrypt("hello world").unwrap();
        ciphertext.push('x');
        assert!(ctx.decrypt(&ciphertext).is_err());
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let ctx_a = context_with_secret("key-a");
        let ctx_b = context_with_secret("key-b");
        let ciphertext = ctx_a.encrypt("hello world").unwrap();
        assert!(ctx_b.decrypt(&ciphertext).is_err());
    }

    #[test]
    fn verify_integrity_detects_mismatch() {
        let ctx = context_with_secret("top secret");
        let ciphertext = ctx.encrypt("hello world").unwrap();
        assert!(ctx.verify_integrity("hello world", &ciphertext));
        assert!(!ctx.verify_integrity("goodbye", &ciphertext));
    }

    #[test]
    fn verify_integrity_both_empty_is_true() {
        let ctx = context_with_secret("top secret");
        assert!(ctx.verify_integrity("", ""));
    }

    #[test]
    fn disabled_context_falls_back_to_base64_and_skips_obfuscation() {
        let ctx = SecurityContext::disabled();
        assert!(!ctx.encryption_enabled());
        let encoded = ctx.encrypt("hello").unwrap();
        assert_eq!(ctx.decrypt(&encoded).unwrap(), "hello");
        assert_eq!(ctx.obfuscate_key("k"), "k");
    }

    #[test]
    fn key_obfuscation_round_trips_through_reverse_map() {
        let ctx = context_with_secret("top secret");
        let obfuscated = ctx.obfuscate_key("user:42");
        assert_ne!(obfuscated, "user:42");
        assert_eq!(ctx.deobfuscate_key(&obfuscated).as_deref(), Some("user:42"));
    }
}
