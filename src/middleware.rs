//! Middleware support
//!
//! A middleware is a pair of operations: [`Middleware::init`] runs once at
//! router build time and turns the declaration-site options into a config
//! value; [`Middleware::call`] runs per call with the current [`Context`],
//! that config, and a [`Next`] continuation for the rest of the chain.
//!
//! Middleware transforms the context flowing toward the handler. A
//! middleware either drives its continuation exactly once and returns the
//! derived context, or terminates the call by returning an error. Returning
//! `Ok` without having invoked `next` is a protocol error and is reported
//! as an `INTERNAL_ERROR` to the caller.
//!
//! # Example
//! ```rust,ignore
//! use nexus_rpc_core::middleware::{from_fn, Next};
//! use nexus_rpc_core::Context;
//!
//! let auth = from_fn(|ctx: Context, config, next: Next| async move {
//!     let role = config["role"].as_str().unwrap_or("user");
//!     // ... check the principal in ctx.assigns() against `role` ...
//!     next.run(ctx.assign("authorized_as", config["role"].clone())).await
//! });
//! ```

use crate::context::Context;
use crate::error::{RpcError, RpcResult};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::trace;

/// Future type returned by [`Middleware::call`].
pub type MiddlewareFuture = Pin<Box<dyn Future<Output = RpcResult<Context>> + Send>>;

/// A middleware module.
pub trait Middleware: Send + Sync {
    /// Turn declaration-site options into the per-entry config.
    ///
    /// Runs once, at router build time. The default keeps the options as-is.
    fn init(&self, opts: Value) -> Value {
        opts
    }

    /// Process the call, driving `next` exactly once.
    fn call(&self, ctx: Context, config: Value, next: Next) -> MiddlewareFuture;
}

/// A middleware declaration: name, module, and declaration-site options.
///
/// The name identifies the middleware in skip lists and diagnostics.
#[derive(Clone)]
pub struct MiddlewareEntry {
    /// Name used by skip lists and introspection
    pub name: String,
    /// The module
    pub module: Arc<dyn Middleware>,
    /// Declaration-site options, passed to `init` at build time
    pub opts: Value,
}

impl MiddlewareEntry {
    /// Declare a middleware under a name with options.
    pub fn new(name: impl Into<String>, module: Arc<dyn Middleware>, opts: Value) -> Self {
        Self {
            name: name.into(),
            module,
            opts,
        }
    }
}

impl std::fmt::Debug for MiddlewareEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareEntry")
            .field("name", &self.name)
            .field("opts", &self.opts)
            .finish()
    }
}

/// A middleware with its config already initialised, as stored in a
/// routing-table entry.
#[derive(Clone)]
pub struct ResolvedMiddleware {
    pub(crate) name: String,
    pub(crate) module: Arc<dyn Middleware>,
    pub(crate) config: Value,
}

impl ResolvedMiddleware {
    /// Name the middleware was declared under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The initialised config.
    pub fn config(&self) -> &Value {
        &self.config
    }
}

impl std::fmt::Debug for ResolvedMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedMiddleware")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}

/// Initialise a list of declarations into a pre-composed chain.
pub(crate) fn resolve_chain(entries: &[MiddlewareEntry]) -> Arc<[ResolvedMiddleware]> {
    entries
        .iter()
        .map(|entry| ResolvedMiddleware {
            name: entry.name.clone(),
            module: entry.module.clone(),
            config: entry.module.init(entry.opts.clone()),
        })
        .collect::<Vec<_>>()
        .into()
}

/// Continuation for the rest of a middleware chain.
///
/// Consumed by [`Next::run`]; a middleware that never runs it while
/// returning `Ok` breaks the protocol and the call fails with an
/// `INTERNAL_ERROR`.
pub struct Next {
    chain: Arc<[ResolvedMiddleware]>,
    index: usize,
    invoked: Arc<AtomicBool>,
}

impl Next {
    /// Run the remainder of the chain with the given context.
    pub async fn run(self, ctx: Context) -> RpcResult<Context> {
        self.invoked.store(true, Ordering::Release);
        run_from(self.chain, self.index, ctx).await
    }
}

/// Run a pre-composed chain to completion, yielding the accumulated context.
pub(crate) async fn run_chain(chain: Arc<[ResolvedMiddleware]>, ctx: Context) -> RpcResult<Context> {
    run_from(chain, 0, ctx).await
}

fn run_from(chain: Arc<[ResolvedMiddleware]>, index: usize, ctx: Context) -> MiddlewareFuture {
    Box::pin(async move {
        let Some(mw) = chain.get(index) else {
            return Ok(ctx);
        };
        trace!(middleware = %mw.name, index, "Entering middleware");
        let invoked = Arc::new(AtomicBool::new(false));
        let next = Next {
            chain: chain.clone(),
            index: index + 1,
            invoked: invoked.clone(),
        };
        let out = mw.module.call(ctx, mw.config.clone(), next).await?;
        if !invoked.load(Ordering::Acquire) {
            return Err(RpcError::internal(format!(
                "Middleware '{}' returned without invoking next",
                mw.name
            )));
        }
        Ok(out)
    })
}

struct FnMiddleware {
    f: Box<dyn Fn(Context, Value, Next) -> MiddlewareFuture + Send + Sync>,
}

impl Middleware for FnMiddleware {
    fn call(&self, ctx: Context, config: Value, next: Next) -> MiddlewareFuture {
        (self.f)(ctx, config, next)
    }
}

/// Create a middleware from an async function.
///
/// # Example
/// ```rust,ignore
/// let logger = from_fn(|ctx, _config, next: Next| async move {
///     tracing::debug!(path = ?ctx.procedure_path(), "dispatching");
///     next.run(ctx).await
/// });
/// ```
pub fn from_fn<F, Fut>(f: F) -> Arc<dyn Middleware>
where
    F: Fn(Context, Value, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RpcResult<Context>> + Send + 'static,
{
    Arc::new(FnMiddleware {
        f: Box::new(move |ctx, config, next| Box::pin(f(ctx, config, next))),
    })
}
