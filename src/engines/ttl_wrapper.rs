//! The persisted TTL wrapper format (spec §6): engines without native TTL
//! support embed expiry inline as `{"value": "<payload>", "expiresAt":
//! <epoch_ms>}`. Absence of the wrapper means "no TTL".

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtlWrapper {
    pub value: String,
    #[serde(rename = "expiresAt")]
    pub expires_at: i64,
}

/// Encode `value` for storage, wrapping it with an expiry when `ttl_ms` is
/// set. Values with no TTL are stored as raw text, unwrapped.
pub fn wrap(value: &str, ttl_ms: Option<i64>, now_ms: i64) -> String {
    match ttl_ms {
        Some(ttl) => {
            let wrapper = TtlWrapper {
                value: value.to_string(),
                expires_at: now_ms + ttl,
            };
            // Safe to unwrap: TtlWrapper has no cyclic or non-serializable fields.
            serde_json::to_string(&wrapper).expect("ttl wrapper is always serializable")
        }
        None => value.to_string(),
    }
}

/// Outcome of unwrapping a stored value.
pub enum Unwrapped {
    /// No TTL; the raw text value.
    Plain(String),
    /// TTL-wrapped value, not yet expired.
    Valid(String),
    /// TTL-wrapped value whose expiry has passed.
    Expired,
    /// Stored text could not be interpreted as either form — treated as
    /// absent (spec §4.2: "safe against partially corrupt stored values").
    Corrupt,
}

/// Unwrap a stored value, checking expiry against `now_ms`.
///
/// A stored value is first tried as a TTL wrapper; if that fails to parse
/// as the wrapper shape, it's treated as raw (unwrapped, no-TTL) text, the
/// common case for engines that never used the wrapper for that key.
pub fn unwrap(stored: &str, now_ms: i64) -> Unwrapped {
    match serde_json::from_str::<serde_json::Value>(stored) {
        Ok(serde_json::Value::Object(map))
            if map.contains_key("value") && map.contains_key("expiresAt") =>
        {
            match serde_json::from_value::<TtlWrapper>(serde_json::Value::Object(map)) {
                Ok(wrapper) => {
                    if now_ms >= wrapper.expires_at {
                        Unwrapped::Expired
                    } else {
                        Unwrapped::Valid(wrapper.value)
                    }
                }
                Err(_) => Unwrapped::Corrupt,
            }
        }
        _ => Unwrapped::Plain(stored.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_ttl_round_trips_as_raw_text() {
        let wrapped = wrap("hello", None, 1_000);
        match unwrap(&wrapped, 2_000) {
            Unwrapped::Plain(v) => assert_eq!(v, "hello"),
            _ => panic!("expected plain"),
        }
    }

    #[test]
    fn ttl_wrapper_unwraps_when_not_expired() {
        let wrapped = wrap("hello", Some(1_000), 1_000);
        match unwrap(&wrapped, 1_500) {
            Unwrapped::Valid(v) => assert_eq!(v, "hello"),
            _ => panic!("expected valid"),
        }
    }

    #[test]
    fn ttl_wrapper_reports_expired() {
        let wrapped = wrap("hello", Some(100), 1_000);
        match unwrap(&wrapped, 2_000) {
            Unwrapped::Expired => {}
            _ => panic!("expected expired"),
        }
    }

    #[test]
    fn raw_text_that_happens_to_look_like_json_object_without_both_fields_is_plain() {
        match unwrap(r#"{"value": "x"}"#, 1_000) {
            Unwrapped::Plain(v) => assert_eq!(v, r#"{"value": "x"}"#),
            _ => panic!("expected plain passthrough"),
        }
    }
}
