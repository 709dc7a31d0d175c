//! Procedure definitions
//!
//! A procedure is a named unit of RPC work: a kind (query, mutation,
//! subscription), optional input/output schemas, a handler, metadata, an
//! optional REST route for HTTP adapters, and procedure-local middleware.
//! Definitions are assembled with the fluent [`Procedure`] builder and
//! frozen once registered in a declaring unit.
//!
//! # Example
//! ```rust,ignore
//! use nexus_rpc_core::procedure::Procedure;
//!
//! let get_user = Procedure::query("get")
//!     .input(user_id_schema())
//!     .output(user_schema())
//!     .meta(Meta::new().description("Get a user by id").tag("users"))
//!     .route(RouteMethod::Get, "/users/{id}")
//!     .handler(|input: GetUserInput, ctx| async move {
//!         // ...
//!         Ok(user)
//!     });
//! ```

use crate::context::Context;
use crate::error::{RpcError, RpcResult};
use crate::middleware::MiddlewareEntry;
use crate::schema::SchemaRef;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::panic::Location;
use std::pin::Pin;
use std::sync::Arc;
use tracing::trace;

/// Kind of procedure.
#[derive(Clone, Debug, PartialEq, Eq, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcedureKind {
    /// Read-only operation, safe to retry
    Query,
    /// Side-effecting operation
    Mutation,
    /// Long-lived streaming operation
    Subscription,
}

impl fmt::Display for ProcedureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query => write!(f, "query"),
            Self::Mutation => write!(f, "mutation"),
            Self::Subscription => write!(f, "subscription"),
        }
    }
}

/// HTTP method of a REST route.
#[derive(Clone, Debug, PartialEq, Eq, Copy, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RouteMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// Optional REST route consumed by HTTP adapters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestRoute {
    /// HTTP method
    pub method: RouteMethod,
    /// Path template (e.g. `/users/{id}`)
    pub path_template: String,
}

/// Deprecation marker: a bare flag or a reason string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Deprecated {
    Flag(bool),
    Reason(String),
}

/// Procedure metadata.
///
/// The core recognises the fields below; unknown keys are preserved in
/// `extra` and otherwise ignored.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Meta {
    /// Human-readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Short description for documentation tooling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Tags for categorization
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Example inputs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<Value>,
    /// Deprecation flag or reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<Deprecated>,
    /// Stable operation id for generated clients
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    /// Per-procedure override of the output-validation setting
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validate_output: Option<bool>,
    /// Unrecognised keys, preserved verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Meta {
    /// Create empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the summary.
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Add a tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Add an example input.
    pub fn example(mut self, example: Value) -> Self {
        self.examples.push(example);
        self
    }

    /// Mark as deprecated.
    pub fn deprecated(mut self) -> Self {
        self.deprecated = Some(Deprecated::Flag(true));
        self
    }

    /// Mark as deprecated with a reason.
    pub fn deprecated_because(mut self, reason: impl Into<String>) -> Self {
        self.deprecated = Some(Deprecated::Reason(reason.into()));
        self
    }

    /// Set the operation id.
    pub fn operation_id(mut self, id: impl Into<String>) -> Self {
        self.operation_id = Some(id.into());
        self
    }

    /// Override the output-validation setting for this procedure.
    pub fn validate_output(mut self, enabled: bool) -> Self {
        self.validate_output = Some(enabled);
        self
    }

    /// Preserve an unrecognised key.
    pub fn extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Where a definition was declared, for diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceLocation {
    /// Source file of the declaration
    pub file: &'static str,
    /// Line of the declaration
    pub line: u32,
    /// Declaring unit, filled in at registration
    pub unit: Option<String>,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.unit {
            Some(unit) => write!(f, "{}:{} (unit {})", self.file, self.line, unit),
            None => write!(f, "{}:{}", self.file, self.line),
        }
    }
}

/// Boxed async handler: typed input value and context in, value out.
pub type HandlerFn = Arc<
    dyn Fn(Value, Context) -> Pin<Box<dyn Future<Output = RpcResult<Value>> + Send>> + Send + Sync,
>;

/// Wrap a typed async function into a [`HandlerFn`].
///
/// The input value has already passed schema validation when the handler
/// runs, so a decode mismatch here is a wiring bug and surfaces as an
/// `INTERNAL_ERROR`.
pub fn handler<I, O, F, Fut>(f: F) -> HandlerFn
where
    I: DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
    F: Fn(I, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RpcResult<O>> + Send + 'static,
{
    Arc::new(move |raw: Value, ctx: Context| {
        let decoded = serde_json::from_value::<I>(raw)
            .map_err(|e| RpcError::internal(format!("Handler input decode failed: {e}")))
            .map(|input| f(input, ctx));
        Box::pin(async move {
            let output = decoded?.await?;
            serde_json::to_value(output).map_err(RpcError::from)
        })
    })
}

/// Input type for handlers that take no input.
///
/// Deserializes from `null`, `{}`, or any object, so call sites may omit
/// the input entirely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoInput;

impl<'de> Deserialize<'de> for NoInput {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        // Accept and discard whatever the caller sent.
        let _ = Value::deserialize(deserializer)?;
        Ok(NoInput)
    }
}

/// An immutable procedure definition.
///
/// Built with [`Procedure`] and frozen once handed to a declaring unit.
#[derive(Clone)]
pub struct ProcedureDef {
    /// Identifier, unique within the declaring unit
    pub name: String,
    /// Kind
    pub kind: ProcedureKind,
    /// Input schema; absent means the procedure takes no input
    pub input: Option<SchemaRef>,
    /// Output schema; absent disables output validation
    pub output: Option<SchemaRef>,
    /// Handler; absent means the declaring unit binds one under `name`
    pub handler: Option<HandlerFn>,
    /// Metadata
    pub meta: Meta,
    /// Optional REST route
    pub route: Option<RestRoute>,
    /// Procedure-local middleware, innermost in the composed chain
    pub middleware: Vec<MiddlewareEntry>,
    /// Declaration site
    pub location: SourceLocation,
}

impl fmt::Debug for ProcedureDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcedureDef")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("has_input", &self.input.is_some())
            .field("has_output", &self.output.is_some())
            .field("has_handler", &self.handler.is_some())
            .field("route", &self.route)
            .field("middleware", &self.middleware)
            .field("location", &self.location)
            .finish()
    }
}

/// Fluent builder for procedure definitions.
pub struct Procedure {
    def: ProcedureDef,
}

impl Procedure {
    #[track_caller]
    fn start(name: impl Into<String>, kind: ProcedureKind) -> Self {
        let name = name.into();
        let caller = Location::caller();
        trace!(name = %name, kind = %kind, "Declaring procedure");
        Self {
            def: ProcedureDef {
                name,
                kind,
                input: None,
                output: None,
                handler: None,
                meta: Meta::default(),
                route: None,
                middleware: Vec::new(),
                location: SourceLocation {
                    file: caller.file(),
                    line: caller.line(),
                    unit: None,
                },
            },
        }
    }

    /// Declare a query (read-only operation).
    #[track_caller]
    pub fn query(name: impl Into<String>) -> Self {
        Self::start(name, ProcedureKind::Query)
    }

    /// Declare a mutation (side-effecting operation).
    #[track_caller]
    pub fn mutation(name: impl Into<String>) -> Self {
        Self::start(name, ProcedureKind::Mutation)
    }

    /// Declare a subscription (streaming operation).
    #[track_caller]
    pub fn subscription(name: impl Into<String>) -> Self {
        Self::start(name, ProcedureKind::Subscription)
    }

    /// Set the input schema.
    pub fn input(mut self, schema: SchemaRef) -> Self {
        self.def.input = Some(schema);
        self
    }

    /// Set the output schema.
    pub fn output(mut self, schema: SchemaRef) -> Self {
        self.def.output = Some(schema);
        self
    }

    /// Set metadata.
    pub fn meta(mut self, meta: Meta) -> Self {
        self.def.meta = meta;
        self
    }

    /// Attach a REST route for HTTP adapters.
    pub fn route(mut self, method: RouteMethod, path_template: impl Into<String>) -> Self {
        self.def.route = Some(RestRoute {
            method,
            path_template: path_template.into(),
        });
        self
    }

    /// Add procedure-local middleware (innermost in the composed chain).
    pub fn middleware(
        mut self,
        name: impl Into<String>,
        module: Arc<dyn crate::middleware::Middleware>,
        opts: Value,
    ) -> Self {
        self.def
            .middleware
            .push(MiddlewareEntry::new(name, module, opts));
        self
    }

    /// Set a typed handler and finish the definition.
    pub fn handler<I, O, F, Fut>(mut self, f: F) -> ProcedureDef
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(I, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RpcResult<O>> + Send + 'static,
    {
        self.def.handler = Some(handler(f));
        self.def
    }

    /// Set a raw handler (already boxed) and finish the definition.
    pub fn handler_raw(mut self, f: HandlerFn) -> ProcedureDef {
        self.def.handler = Some(f);
        self.def
    }

    /// Finish the definition without a handler.
    ///
    /// The declaring unit must bind a handler under the procedure's name
    /// before the unit is finalised.
    pub fn unbound(self) -> ProcedureDef {
        self.def
    }
}
