//! Batch request types
//!
//! A batch is an ordered list of calls executed with bounded parallelism by
//! [`Router::batch`](crate::Router::batch); results come back positionally,
//! one per call, regardless of completion order.
//!
//! # Example
//! ```rust,ignore
//! use nexus_rpc_core::batch::BatchCall;
//! use serde_json::json;
//!
//! let calls = vec![
//!     BatchCall::new("users.get", json!({"id": "1"})),
//!     BatchCall::new("users.list", json!(null)),
//! ];
//! let response = router.batch(calls, ctx, &opts).await;
//! assert_eq!(response.len(), 2);
//! ```

use crate::error::RpcError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single call within a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchCall {
    /// The procedure path to call (e.g. "users.get")
    pub path: String,
    /// Input data for the procedure; defaults to null when omitted
    #[serde(default)]
    pub input: Value,
}

impl BatchCall {
    /// Create a batch call.
    pub fn new(path: impl Into<String>, input: Value) -> Self {
        Self {
            path: path.into(),
            input,
        }
    }
}

/// Result slot of one batch call: success data or an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchResult {
    /// Successful result with data
    Success {
        /// The value returned by the procedure
        data: Value,
    },
    /// Error result
    Error {
        /// The error that occurred
        error: RpcError,
    },
}

impl BatchResult {
    /// Create a successful result.
    pub fn success(data: Value) -> Self {
        Self::Success { data }
    }

    /// Create an error result.
    pub fn error(error: RpcError) -> Self {
        Self::Error { error }
    }

    /// Whether this slot holds a success.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Whether this slot holds an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// The data, if successful.
    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Success { data } => Some(data),
            Self::Error { .. } => None,
        }
    }

    /// The error, if failed.
    pub fn get_error(&self) -> Option<&RpcError> {
        match self {
            Self::Success { .. } => None,
            Self::Error { error } => Some(error),
        }
    }
}

/// Response for a whole batch, positionally aligned with the input calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    /// One result per call, in input order
    pub results: Vec<BatchResult>,
}

impl BatchResponse {
    /// Wrap a list of results.
    pub fn new(results: Vec<BatchResult>) -> Self {
        Self { results }
    }

    /// Number of result slots.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether the response is empty.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Count successful results.
    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    /// Count error results.
    pub fn error_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_error()).count()
    }
}
