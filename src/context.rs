//! Per-call context
//!
//! A [`Context`] is the per-call bag threaded through hooks, middleware, and
//! handlers: the transport kind, user-domain assigns, request metadata, and
//! the identity of the procedure being dispatched. It is built by a
//! transport adapter (or a test), derived copy-on-write down the chain, and
//! discarded when the call returns. It is never shared across concurrent
//! calls.
//!
//! # Example
//! ```rust,ignore
//! use nexus_rpc_core::{Context, Transport};
//!
//! let ctx = Context::new(Transport::Http)
//!     .with_metadata("remote_ip", serde_json::json!("10.0.0.7"));
//!
//! // A middleware derives a new context; the original is untouched.
//! let ctx = ctx.assign("current_user", serde_json::json!({"id": 42}));
//! ```

use crate::procedure::ProcedureKind;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Transport that originated the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// HTTP adapter
    Http,
    /// WebSocket adapter
    WebSocket,
    /// No transport (tests, internal calls)
    None,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => write!(f, "http"),
            Self::WebSocket => write!(f, "websocket"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Opaque transport handle (connection, socket) carried for adapters.
pub type RawHandle = Arc<dyn Any + Send + Sync>;

/// Per-call context.
///
/// Cloning is cheap relative to call cost and is the derivation mechanism:
/// [`Context::assign`] and [`Context::with_metadata`] consume `self` and
/// return the derived copy, so upstream frames keep their own view.
#[derive(Clone)]
pub struct Context {
    transport: Transport,
    raw_conn: Option<RawHandle>,
    raw_socket: Option<RawHandle>,
    assigns: HashMap<String, Value>,
    metadata: HashMap<String, Value>,
    procedure_path: Option<String>,
    procedure_kind: Option<ProcedureKind>,
    started_at: Instant,
}

impl Context {
    /// Create a context for the given transport.
    ///
    /// Seeds `metadata.request_id` with a time-ordered UUID v7 and records
    /// the monotonic start time.
    pub fn new(transport: Transport) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("request_id".to_string(), Value::String(request_id()));
        Self {
            transport,
            raw_conn: None,
            raw_socket: None,
            assigns: HashMap::new(),
            metadata,
            procedure_path: None,
            procedure_kind: None,
            started_at: Instant::now(),
        }
    }

    /// The transport that originated the call.
    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Attach the adapter's connection handle.
    pub fn with_raw_conn(mut self, conn: RawHandle) -> Self {
        self.raw_conn = Some(conn);
        self
    }

    /// Attach the adapter's socket handle.
    pub fn with_raw_socket(mut self, socket: RawHandle) -> Self {
        self.raw_socket = Some(socket);
        self
    }

    /// The adapter's connection handle, if any.
    pub fn raw_conn(&self) -> Option<&RawHandle> {
        self.raw_conn.as_ref()
    }

    /// The adapter's socket handle, if any.
    pub fn raw_socket(&self) -> Option<&RawHandle> {
        self.raw_socket.as_ref()
    }

    /// Derive a context with an assign set.
    ///
    /// Assigns carry user-domain data (e.g. the authenticated principal)
    /// visible only downstream in the same chain.
    pub fn assign(mut self, key: impl Into<String>, value: Value) -> Self {
        self.assigns.insert(key.into(), value);
        self
    }

    /// Look up an assign.
    pub fn get_assign(&self, key: &str) -> Option<&Value> {
        self.assigns.get(key)
    }

    /// All assigns.
    pub fn assigns(&self) -> &HashMap<String, Value> {
        &self.assigns
    }

    /// Derive a context with a metadata entry set.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Look up a metadata entry.
    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// All metadata.
    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    /// The request id seeded at construction.
    pub fn request_id(&self) -> Option<&str> {
        self.metadata.get("request_id").and_then(Value::as_str)
    }

    /// Canonical path of the procedure being dispatched, once known.
    pub fn procedure_path(&self) -> Option<&str> {
        self.procedure_path.as_deref()
    }

    /// Kind of the procedure being dispatched, once known.
    pub fn procedure_kind(&self) -> Option<ProcedureKind> {
        self.procedure_kind
    }

    /// Monotonic instant the context was created.
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Derive a context tagged with the resolved procedure identity.
    ///
    /// Called by dispatch after lookup, before the executor runs.
    pub(crate) fn for_procedure(mut self, path: &str, kind: ProcedureKind) -> Self {
        self.procedure_path = Some(path.to_string());
        self.procedure_kind = Some(kind);
        self
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(Transport::None)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("transport", &self.transport)
            .field("has_raw_conn", &self.raw_conn.is_some())
            .field("has_raw_socket", &self.raw_socket.is_some())
            .field("assigns", &self.assigns)
            .field("metadata", &self.metadata)
            .field("procedure_path", &self.procedure_path)
            .field("procedure_kind", &self.procedure_kind)
            .finish()
    }
}

/// Generate a time-ordered request id (UUID v7).
pub fn request_id() -> String {
    Uuid::now_v7().to_string()
}
