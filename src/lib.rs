//! # nexus-rpc-core
//!
//! Transport-agnostic core of a typed, schema-validated RPC framework.
//!
//! Procedures (read-only *queries*, side-effecting *mutations*, streaming
//! *subscriptions*) are declared in [`registry::ProcedureSet`]s and
//! organised by a [`Router`] into a dotted namespace with composable
//! middleware, path aliases, and batch execution. The router is built once,
//! validated, and frozen; transports hand it a [`Context`] per in-flight
//! call and invoke [`Router::call`] or [`Router::batch`].
//!
//! Schema validation is external: input and output schemas are opaque
//! [`schema::Schema`] handles. Telemetry is emitted to a pluggable
//! [`telemetry::TelemetrySink`].
//!
//! ## Quick Start
//!
//! ### 1. Declare procedures
//!
//! ```rust,ignore
//! use nexus_rpc_core::prelude::*;
//!
//! async fn get_user(input: GetUserInput, _ctx: Context) -> RpcResult<User> {
//!     // ...
//! }
//!
//! let users = ProcedureSet::new("users")
//!     .define(Procedure::query("get").input(get_user_schema()).handler(get_user))
//!     .define(Procedure::mutation("create").input(create_user_schema()).unbound())
//!     .bind("create", create_user)
//!     .finish()?;
//! ```
//!
//! ### 2. Build the router
//!
//! ```rust,ignore
//! let router = Router::builder()
//!     .name("app")
//!     .middleware("logger", logger(), json!({}))
//!     .mount(users, "users", &[])
//!     .scope("admin", |s| {
//!         s.middleware("auth", auth(), json!({"role": "admin"}))
//!             .mount(admin_procs, "actions", &[])
//!     })
//!     .alias("getUser", "users.get", true)
//!     .build()?;
//! ```
//!
//! ### 3. Dispatch
//!
//! ```rust,ignore
//! let ctx = Context::new(Transport::Http);
//! let user = router
//!     .call("users.get", json!({"id": "42"}), ctx, &CallOpts::new())
//!     .await?;
//! ```
//!
//! ## Middleware
//!
//! Middleware transforms the per-call context on its way to the handler.
//! Chains compose at build time from the router root, the scope stack
//! (outer to inner), and the procedure's local middleware, minus any names
//! in a mount's skip list.
//!
//! ```rust,ignore
//! let auth = from_fn(|ctx: Context, config, next: Next| async move {
//!     let principal = authenticate(&ctx, &config)?;
//!     next.run(ctx.assign("principal", principal)).await
//! });
//! ```
//!
//! ## Batches
//!
//! [`Router::batch`] fans calls out with bounded parallelism and a per-call
//! deadline, and returns results positionally.
//!
//! ## Module Structure
//!
//! - [`router`] - routing table, build phase, dispatch, introspection
//! - [`registry`] - declaring units and finalised procedure registries
//! - [`procedure`] - procedure definitions and the fluent builder
//! - [`executor`] - the per-call execution pipeline and hooks
//! - [`middleware`] - the middleware contract and chain composition
//! - [`batch`] - batch request/response types
//! - [`schema`] - the external-validator facade
//! - [`subscription`] - subscription tokens, cancellation, event channels
//! - [`telemetry`] - event emission to pluggable sinks
//! - [`context`] - the per-call context bag
//! - [`error`] - wire-stable error codes and values
//! - [`config`] - process-wide configuration snapshot

pub mod batch;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod middleware;
pub mod path;
pub mod procedure;
pub mod registry;
pub mod router;
pub mod schema;
pub mod subscription;
pub mod telemetry;

#[cfg(test)]
mod tests;

// Public API
pub use batch::{BatchCall, BatchResponse, BatchResult};
pub use config::RpcConfig;
pub use context::{Context, Transport, request_id};
pub use error::{ErrorCode, RpcError, RpcResult};
pub use executor::{AfterHook, BeforeHook, CallOpts, Executor};
pub use middleware::{Middleware, MiddlewareEntry, Next, from_fn};
pub use procedure::{
    Meta, NoInput, Procedure, ProcedureDef, ProcedureKind, RestRoute, RouteMethod,
};
pub use registry::{ProcedureRegistry, ProcedureSet, RegistryError};
pub use router::{Alias, BuildError, RouteEntry, Router, RouterBuilder, ScopeBuilder};
pub use schema::{Schema, SchemaRef, ValidationError};
pub use subscription::{
    CancellationSignal, Event, EventMeta, EventReceiver, EventSender, SubscriptionContext,
    SubscriptionId, event_channel,
};
pub use telemetry::{NullSink, TelemetryEvent, TelemetrySink, TracingSink};

/// Prelude for convenient imports
///
/// ```rust,ignore
/// use nexus_rpc_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        // Batch
        BatchCall,
        BatchResponse,
        BatchResult,
        // Errors
        ErrorCode,
        RpcError,
        RpcResult,
        // Context
        Context,
        Transport,
        // Execution
        CallOpts,
        Executor,
        // Middleware
        Middleware,
        MiddlewareEntry,
        Next,
        from_fn,
        // Procedures
        Meta,
        NoInput,
        Procedure,
        ProcedureDef,
        ProcedureKind,
        ProcedureRegistry,
        ProcedureSet,
        RestRoute,
        RouteMethod,
        // Router
        Alias,
        Router,
        RouterBuilder,
        // Schema
        Schema,
        SchemaRef,
        ValidationError,
        // Subscriptions
        Event,
        EventMeta,
        SubscriptionContext,
        SubscriptionId,
        event_channel,
        // Config & telemetry
        RpcConfig,
        TelemetrySink,
        TracingSink,
    };
}
