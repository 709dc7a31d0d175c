//! Schema facade
//!
//! The core does not implement schema validation; it calls an external
//! engine through the [`Schema`] trait. A schema parses raw JSON into a
//! typed value or reports [`ValidationError`]s, and may optionally export a
//! JSON Schema representation for documentation tooling.
//!
//! # Example
//! ```rust,ignore
//! use nexus_rpc_core::schema::{Schema, ValidationError};
//!
//! struct IdSchema;
//!
//! impl Schema for IdSchema {
//!     fn parse(&self, raw: serde_json::Value, coerce: bool) -> Result<serde_json::Value, Vec<ValidationError>> {
//!         match raw.get("id") {
//!             Some(id) if id.is_string() => Ok(raw),
//!             _ => Err(vec![ValidationError::new(vec!["id".into()], "is required")]),
//!         }
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Opaque handle to an externally implemented schema.
pub trait Schema: Send + Sync {
    /// Parse raw input into a typed value.
    ///
    /// With `coerce` set, the engine is expected to coerce string-keyed raw
    /// data into typed keys (e.g. `"42"` into an integer field) before
    /// rejecting it.
    fn parse(&self, raw: Value, coerce: bool) -> Result<Value, Vec<ValidationError>>;

    /// Export a JSON Schema representation, if the engine supports it.
    fn to_json_schema(&self) -> Option<Value> {
        None
    }
}

/// Shared reference to a schema.
pub type SchemaRef = Arc<dyn Schema>;

/// A single validation failure, addressed by a path into the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Segments into the input (`["address", "zip"]`)
    pub path: Vec<String>,
    /// Human-readable message
    pub message: String,
}

impl ValidationError {
    /// Create a validation error for a field path.
    pub fn new(path: Vec<String>, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
        }
    }

    /// Create a validation error addressing the input as a whole.
    pub fn root(message: impl Into<String>) -> Self {
        Self::new(Vec::new(), message)
    }

    /// The path joined with dots; the root path renders as `"."`.
    pub fn dotted_path(&self) -> String {
        if self.path.is_empty() {
            ".".to_string()
        } else {
            self.path.join(".")
        }
    }
}

/// Group validation errors by dotted field path.
///
/// Produces the `details` payload of a `VALIDATION_ERROR` response:
/// a map from dotted path to the list of messages for that path.
pub fn group_by_path(errors: &[ValidationError]) -> Value {
    let mut grouped: Map<String, Value> = Map::new();
    for error in errors {
        let key = error.dotted_path();
        match grouped.get_mut(&key) {
            Some(Value::Array(messages)) => {
                messages.push(Value::String(error.message.clone()));
            }
            _ => {
                grouped.insert(key, Value::Array(vec![Value::String(error.message.clone())]));
            }
        }
    }
    debug!(fields = grouped.len(), "Grouped validation errors");
    Value::Object(grouped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn groups_messages_by_dotted_path() {
        let errors = vec![
            ValidationError::new(vec!["email".into()], "is required"),
            ValidationError::new(vec!["email".into()], "is invalid"),
            ValidationError::new(vec!["address".into(), "zip".into()], "is too short"),
            ValidationError::root("unknown key: foo"),
        ];
        let grouped = group_by_path(&errors);
        assert_eq!(
            grouped,
            json!({
                "email": ["is required", "is invalid"],
                "address.zip": ["is too short"],
                ".": ["unknown key: foo"],
            })
        );
    }
}
