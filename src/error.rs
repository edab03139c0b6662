//! Error handling for the caching core.
//!
//! Mirrors the teacher's error design (stable machine-readable codes,
//! severity, category, retryability, user vs. internal messages) trimmed to
//! the error kinds this crate actually surfaces. There is no HTTP surface
//! here, so unlike the teacher's `ApexError` this type carries no status
//! code mapping.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, warn};

/// A specialized `Result` for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Machine-readable error codes, stable for programmatic matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Key is not a usable string: empty, too long, or has control characters.
    InvalidKey,
    /// Value could not be accepted (e.g. not serializable after cycle handling).
    InvalidValue,
    /// Bad option: negative/non-finite TTL, unknown engine name, bad batch size.
    InvalidOptions,
    /// Requested (or every) engine is not constructible in this runtime.
    EngineUnavailable,
    /// No engine can accept the payload even after emergency cleanup.
    QuotaExceeded,
    /// Value could not be serialized to its textual form.
    SerializationFail,
    /// Stored text could not be deserialized back to a value.
    DeserializationFail,
    /// Encrypt/decrypt failed; decryption treats this as an integrity failure.
    CryptoFail,
    /// Operation attempted after `destroy()`.
    Disposed,
}

impl ErrorCode {
    /// Numeric code, grouped by family, stable for log correlation.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::InvalidKey => 1000,
            Self::InvalidValue => 1001,
            Self::InvalidOptions => 1002,
            Self::EngineUnavailable => 2000,
            Self::QuotaExceeded => 2001,
            Self::SerializationFail => 3000,
            Self::DeserializationFail => 3001,
            Self::CryptoFail => 4000,
            Self::Disposed => 5000,
        }
    }

    /// Category name, used for grouping in logs.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1999 => "validation",
            2000..=2999 => "engine",
            3000..=3999 => "serialization",
            4000..=4999 => "crypto",
            _ => "lifecycle",
        }
    }

    /// Whether a caller might reasonably retry the operation unchanged.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::EngineUnavailable | Self::QuotaExceeded)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Severity level, used to pick the `tracing` level when an error is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Caller-input errors.
    Low,
    /// Operational conditions a caller can retry past.
    Medium,
    /// Failures that indicate a broken engine or corrupted payload.
    High,
}

impl ErrorSeverity {
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::InvalidKey | ErrorCode::InvalidValue | ErrorCode::InvalidOptions => {
                Self::Low
            }
            ErrorCode::EngineUnavailable | ErrorCode::QuotaExceeded | ErrorCode::Disposed => {
                Self::Medium
            }
            ErrorCode::SerializationFail
            | ErrorCode::DeserializationFail
            | ErrorCode::CryptoFail => Self::High,
        }
    }
}

/// The error type returned by every fallible cache operation.
#[derive(Debug, Error, Clone)]
#[error("{code}: {message}")]
pub struct CacheError {
    /// Stable machine-readable code.
    pub code: ErrorCode,
    /// Message safe to surface to callers.
    pub message: String,
    /// Optional internal cause, kept as text so the error stays `Clone` —
    /// batch operations need to report failures without consuming them.
    pub internal: Option<String>,
}

impl CacheError {
    /// Build a new error with just a code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let err = Self {
            code,
            message: message.into(),
            internal: None,
        };
        err.log();
        err
    }

    /// Build an error carrying an internal cause for logs.
    pub fn with_internal(
        code: ErrorCode,
        message: impl Into<String>,
        internal: impl Into<String>,
    ) -> Self {
        let err = Self {
            code,
            message: message.into(),
            internal: Some(internal.into()),
        };
        err.log();
        err
    }

    /// Shorthand for [`ErrorCode::InvalidKey`].
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidKey, message)
    }

    /// Shorthand for [`ErrorCode::InvalidValue`].
    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidValue, message)
    }

    /// Shorthand for [`ErrorCode::InvalidOptions`].
    pub fn invalid_options(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidOptions, message)
    }

    /// Shorthand for [`ErrorCode::EngineUnavailable`].
    pub fn engine_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::EngineUnavailable, message)
    }

    /// Shorthand for [`ErrorCode::QuotaExceeded`].
    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::QuotaExceeded, message)
    }

    /// Shorthand for [`ErrorCode::CryptoFail`].
    pub fn crypto_fail(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::CryptoFail, message)
    }

    /// Shorthand for [`ErrorCode::Disposed`].
    pub fn disposed() -> Self {
        Self::new(ErrorCode::Disposed, "cache manager has been destroyed")
    }

    /// Severity implied by this error's code.
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();
        match self.severity() {
            ErrorSeverity::High => error!(
                error_code = %code,
                category,
                message = %self.message,
                internal = ?self.internal,
                "cache operation failed"
            ),
            ErrorSeverity::Medium => warn!(
                error_code = %code,
                category,
                message = %self.message,
                "cache operation failed"
            ),
            ErrorSeverity::Low => debug!(
                error_code = %code,
                category,
                message = %self.message,
                "cache operation rejected"
            ),
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        Self::with_internal(
            ErrorCode::SerializationFail,
            "failed to serialize or deserialize cached value",
            e.to_string(),
        )
    }
}
