//! Call execution pipeline
//!
//! The executor runs a single procedure call end to end: before-hooks,
//! input validation, the middleware chain, the handler behind a panic trap,
//! conditional output validation, and after-hooks, bracketed by telemetry.
//!
//! # Pipeline
//!
//! ```text
//! procedure.start
//!   before hooks            (sequential, first error short-circuits)
//!   input validation        (no schema => empty object; coercion on)
//!   middleware chain        (continuation passing, context accumulates)
//!   handler                 (panic trapped => INTERNAL_ERROR)
//!   output validation       (only when effective setting is true)
//!   after hooks             (sequential, first error short-circuits)
//! procedure.stop | procedure.exception
//! ```

use crate::config::RpcConfig;
use crate::context::Context;
use crate::error::{RpcError, RpcResult};
use crate::middleware::{ResolvedMiddleware, resolve_chain, run_chain};
use crate::procedure::ProcedureDef;
use crate::registry::ProcedureRegistry;
use crate::schema::group_by_path;
use crate::telemetry::{SinkRef, TelemetryEvent, events};
use futures::FutureExt;
use serde_json::{Map, Value};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};

/// Hook run before input validation; may derive the context.
pub type BeforeHook =
    Arc<dyn Fn(Context, &Value, &ProcedureDef) -> RpcResult<Context> + Send + Sync>;

/// Hook run after output validation; may replace the value.
pub type AfterHook = Arc<dyn Fn(&Context, Value, &ProcedureDef) -> RpcResult<Value> + Send + Sync>;

/// Per-call options.
#[derive(Clone, Default)]
pub struct CallOpts {
    /// Hooks run before validation, in order
    pub before_hooks: Vec<BeforeHook>,
    /// Hooks run after the handler, in order
    pub after_hooks: Vec<AfterHook>,
    /// Per-call override of the output-validation setting
    pub validate_output: Option<bool>,
}

impl CallOpts {
    /// Create empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a before-hook.
    pub fn before_hook<F>(mut self, f: F) -> Self
    where
        F: Fn(Context, &Value, &ProcedureDef) -> RpcResult<Context> + Send + Sync + 'static,
    {
        self.before_hooks.push(Arc::new(f));
        self
    }

    /// Add an after-hook.
    pub fn after_hook<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context, Value, &ProcedureDef) -> RpcResult<Value> + Send + Sync + 'static,
    {
        self.after_hooks.push(Arc::new(f));
        self
    }

    /// Override the output-validation setting for this call.
    pub fn validate_output(mut self, enabled: bool) -> Self {
        self.validate_output = Some(enabled);
        self
    }
}

/// Effective output-validation setting: per-call override, then procedure
/// metadata, then the process-wide default.
pub(crate) fn effective_validate_output(
    opts: &CallOpts,
    def: &ProcedureDef,
    config: &RpcConfig,
) -> bool {
    opts.validate_output
        .or(def.meta.validate_output)
        .unwrap_or(config.validate_output)
}

/// Standalone executor for running procedures outside a router.
///
/// Routers invoke [`execute`] directly with the entry's pre-composed chain;
/// this type initialises the definition's local middleware on the spot.
pub struct Executor {
    config: RpcConfig,
    sink: SinkRef,
}

impl Executor {
    /// Create an executor with the given config and telemetry sink.
    pub fn new(config: RpcConfig, sink: SinkRef) -> Self {
        Self { config, sink }
    }

    /// Run a procedure call through the full pipeline.
    pub async fn execute(
        &self,
        registry: &ProcedureRegistry,
        def: &ProcedureDef,
        raw_input: Value,
        ctx: Context,
        opts: &CallOpts,
    ) -> RpcResult<Value> {
        let chain = resolve_chain(&def.middleware);
        execute(
            registry,
            def,
            chain,
            raw_input,
            ctx,
            opts,
            &self.config,
            &self.sink,
        )
        .await
    }
}

/// Run a procedure call with an already-composed middleware chain.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn execute(
    registry: &ProcedureRegistry,
    def: &ProcedureDef,
    chain: Arc<[ResolvedMiddleware]>,
    raw_input: Value,
    ctx: Context,
    opts: &CallOpts,
    config: &RpcConfig,
    sink: &SinkRef,
) -> RpcResult<Value> {
    sink.emit(
        TelemetryEvent::new(events::PROCEDURE_START)
            .with_system_time()
            .meta("procedure", def.name.as_str())
            .meta("kind", def.kind.to_string())
            .meta("unit", registry.unit()),
    );
    let started = Instant::now();

    let result = run_pipeline(registry, def, chain, raw_input, ctx, opts, config).await;

    let duration = started.elapsed();
    match &result {
        Ok(_) => sink.emit(
            TelemetryEvent::new(events::PROCEDURE_STOP)
                .with_duration(duration)
                .meta("procedure", def.name.as_str())
                .meta("kind", def.kind.to_string())
                .meta("unit", registry.unit()),
        ),
        Err(err) => sink.emit(
            TelemetryEvent::new(events::PROCEDURE_EXCEPTION)
                .with_duration(duration)
                .meta("procedure", def.name.as_str())
                .meta("kind", def.kind.to_string())
                .meta("unit", registry.unit())
                .meta("error_kind", "error")
                .meta("reason", err.to_string()),
        ),
    }
    result
}

async fn run_pipeline(
    registry: &ProcedureRegistry,
    def: &ProcedureDef,
    chain: Arc<[ResolvedMiddleware]>,
    raw_input: Value,
    mut ctx: Context,
    opts: &CallOpts,
    config: &RpcConfig,
) -> RpcResult<Value> {
    for hook in &opts.before_hooks {
        ctx = hook(ctx, &raw_input, def)?;
    }

    let input = match &def.input {
        None => Value::Object(Map::new()),
        Some(schema) => schema.parse(raw_input, true).map_err(|errors| {
            RpcError::validation("Validation failed").with_details(group_by_path(&errors))
        })?,
    };

    let ctx = run_chain(chain, ctx).await?;

    let handler = def
        .handler
        .clone()
        .or_else(|| registry.binding(&def.name).cloned())
        .ok_or_else(|| {
            RpcError::internal(format!(
                "No handler for procedure '{}' in unit '{}'",
                def.name,
                registry.unit()
            ))
        })?;

    let invocation = AssertUnwindSafe(handler(input, ctx.clone())).catch_unwind();
    let mut value = match invocation.await {
        Ok(result) => result?,
        Err(payload) => {
            let reason = panic_reason(payload.as_ref());
            error!(
                procedure = %def.name,
                unit = registry.unit(),
                reason = %reason,
                "Handler panicked"
            );
            let mut err = RpcError::internal("Internal server error");
            if config.include_exception_details {
                err = err.with_details(serde_json::json!({ "panic": reason }));
            }
            return Err(err);
        }
    };

    if effective_validate_output(opts, def, config) {
        if let Some(schema) = &def.output {
            value = schema.parse(value, false).map_err(|errors| {
                warn!(
                    procedure = %def.name,
                    unit = registry.unit(),
                    errors = errors.len(),
                    "Handler output failed schema validation"
                );
                RpcError::internal("Response validation failed")
            })?;
        }
    }

    for hook in &opts.after_hooks {
        value = hook(&ctx, value, def)?;
    }

    Ok(value)
}

fn panic_reason(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
