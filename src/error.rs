//! Error types for RPC operations
//!
//! Errors are values: every failure surfaced to a caller is an [`RpcError`]
//! with a wire-stable code, a human-oriented message, and code-specific
//! extras (validation details, the offending path, similar-path
//! suggestions).
//!
//! # Error Codes
//!
//! The canonical codes are the [`ErrorCode`] variants; they serialize to
//! SCREAMING_SNAKE_CASE strings (`NotFound` becomes `"NOT_FOUND"`). Domain
//! codes returned by handlers pass through verbatim as
//! [`ErrorCode::Other`].
//!
//! # Example
//! ```rust,ignore
//! use nexus_rpc_core::{RpcError, ErrorCode};
//!
//! let error = RpcError::not_found("Procedure not found: users.gett")
//!     .with_path("users.gett")
//!     .with_suggestions(vec!["users.get".into()]);
//! assert_eq!(error.code, ErrorCode::NotFound);
//! ```

use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Wire-stable error codes.
///
/// The first six variants are the canonical taxonomy of the core; any other
/// code produced by a handler is carried verbatim in [`ErrorCode::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Unknown path and no matching alias
    NotFound,
    /// Path violates both the strict and the relaxed grammar
    InvalidPath,
    /// Input schema rejection; carries per-field details
    ValidationError,
    /// Batch per-call deadline exceeded
    Timeout,
    /// Batch length exceeds the configured maximum
    BatchTooLarge,
    /// Trapped panic, response-validation failure, or broken middleware
    InternalError,
    /// Domain code returned by a handler, passed through unchanged
    Other(String),
}

impl ErrorCode {
    /// Returns the string representation of the error code.
    pub fn as_str(&self) -> &str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::InvalidPath => "INVALID_PATH",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::BatchTooLarge => "BATCH_TOO_LARGE",
            Self::InternalError => "INTERNAL_ERROR",
            Self::Other(code) => code,
        }
    }

    fn from_wire(code: &str) -> Self {
        match code {
            "NOT_FOUND" => Self::NotFound,
            "INVALID_PATH" => Self::InvalidPath,
            "VALIDATION_ERROR" => Self::ValidationError,
            "TIMEOUT" => Self::Timeout,
            "BATCH_TOO_LARGE" => Self::BatchTooLarge,
            "INTERNAL_ERROR" => Self::InternalError,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let code = String::deserialize(deserializer)?;
        Ok(Self::from_wire(&code))
    }
}

/// RPC error with wire-stable code and message.
///
/// # Example
/// ```rust,ignore
/// use nexus_rpc_core::RpcError;
///
/// let error = RpcError::validation("Validation failed")
///     .with_details(serde_json::json!({ "email": ["is invalid"] }));
/// ```
#[derive(Debug, Clone, Deserialize, Error)]
#[error("[{code}] {message}")]
pub struct RpcError {
    /// Wire-stable error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details (JSON value)
    #[serde(default)]
    pub details: Option<serde_json::Value>,
    /// Procedure path the error relates to, when known
    #[serde(default)]
    pub path: Option<String>,
    /// Similar known paths, populated on lookup misses
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl RpcError {
    /// Create a new error with code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            path: None,
            suggestions: Vec::new(),
        }
    }

    /// Add details to the error.
    pub fn with_details(mut self, details: impl Serialize) -> Self {
        self.details = serde_json::to_value(details).ok();
        self
    }

    /// Attach the procedure path the error relates to.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attach similar-path suggestions.
    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    // Convenience constructors

    /// Create a NOT_FOUND error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Create an INVALID_PATH error.
    pub fn invalid_path(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidPath, message)
    }

    /// Create a VALIDATION_ERROR error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// Create a TIMEOUT error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    /// Create a BATCH_TOO_LARGE error.
    pub fn batch_too_large(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BatchTooLarge, message)
    }

    /// Create an INTERNAL_ERROR error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Create an error with a domain-specific code, passed through verbatim.
    pub fn other(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Other(code.into()), message)
    }

    /// Create a NOT_FOUND error for an unknown procedure path.
    pub fn procedure_not_found(path: &str) -> Self {
        Self::not_found(format!("Procedure not found: {path}")).with_path(path)
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("JSON error: {err}"))
    }
}

impl Serialize for RpcError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("RpcError", 5)?;
        state.serialize_field("code", &self.code)?;
        state.serialize_field("message", &self.message)?;

        if let Some(ref details) = self.details {
            state.serialize_field("details", details)?;
        }

        if let Some(ref path) = self.path {
            state.serialize_field("path", path)?;
        }

        if !self.suggestions.is_empty() {
            state.serialize_field("suggestions", &self.suggestions)?;
        }

        state.end()
    }
}

/// Result type alias for RPC operations.
pub type RpcResult<T> = Result<T, RpcError>;
