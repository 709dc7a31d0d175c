//! Routing table and dispatch
//!
//! A [`Router`] is the frozen output of the build phase: the entry table,
//! the alias table, the declaring units, and the config snapshot. Dispatch
//! is [`Router::call`] (single call) and [`Router::batch`] (bounded parallel
//! fan-out); the introspection surface serves documentation and client
//! generation tooling.
//!
//! # Example
//! ```rust,ignore
//! let router = Router::builder()
//!     .mount(users_registry, "users", &[])
//!     .build()?;
//!
//! let result = router
//!     .call("users.get", json!({"id": "42"}), Context::default(), &CallOpts::new())
//!     .await?;
//! ```

mod builder;

pub use builder::{BuildError, RouterBuilder, ScopeBuilder};

use crate::batch::{BatchCall, BatchResponse, BatchResult};
use crate::config::RpcConfig;
use crate::context::Context;
use crate::error::{RpcError, RpcResult};
use crate::executor::{CallOpts, execute};
use crate::middleware::ResolvedMiddleware;
use crate::path;
use crate::procedure::{ProcedureDef, ProcedureKind};
use crate::registry::ProcedureRegistry;
use crate::telemetry::{SinkRef, TelemetryEvent, events};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// A row of the routing table, frozen at build time.
#[derive(Clone)]
pub struct RouteEntry {
    /// Canonical dotted path
    pub path: String,
    /// Path segments; joining with `.` yields `path`
    pub segments: Vec<String>,
    /// Name of the procedure in its declaring unit
    pub procedure_name: String,
    /// Procedure kind
    pub kind: ProcedureKind,
    /// Declaring unit identifier, for runtime definition lookup
    pub unit: String,
    /// Fully composed middleware chain (root, scopes outer to inner, local)
    pub middleware: Arc<[ResolvedMiddleware]>,
}

impl std::fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteEntry")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("unit", &self.unit)
            .field(
                "middleware",
                &self.middleware.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// An alternate path resolving to a canonical one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    /// The alternate path (relaxed grammar)
    pub from: String,
    /// The canonical target path
    pub to: String,
    /// Whether callers should migrate off this alias
    pub deprecated: bool,
}

/// Immutable routing table with dispatch and introspection.
pub struct Router {
    pub(crate) name: String,
    pub(crate) entries: Vec<Arc<RouteEntry>>,
    pub(crate) by_path: HashMap<String, Arc<RouteEntry>>,
    pub(crate) aliases: HashMap<String, Alias>,
    pub(crate) units: HashMap<String, Arc<ProcedureRegistry>>,
    pub(crate) config: RpcConfig,
    pub(crate) sink: SinkRef,
}

impl Router {
    /// Start a declaration tree.
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// The router's name, as used in telemetry metadata.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configuration snapshot this router runs with.
    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Call a procedure by path.
    pub async fn call(
        &self,
        call_path: &str,
        input: Value,
        ctx: Context,
        opts: &CallOpts,
    ) -> RpcResult<Value> {
        self.sink.emit(
            TelemetryEvent::new(events::ROUTER_LOOKUP_START)
                .with_system_time()
                .meta("router", self.name.as_str())
                .meta("path", call_path),
        );
        let started = Instant::now();

        let resolved = self.lookup(call_path);
        let found = resolved.is_ok();
        let result = match resolved {
            Ok(entry) => self.run_entry(&entry, input, ctx, opts).await,
            Err(err) => Err(err),
        };

        self.sink.emit(
            TelemetryEvent::new(events::ROUTER_LOOKUP_STOP)
                .with_duration(started.elapsed())
                .meta("router", self.name.as_str())
                .meta("path", call_path)
                .meta("found", found),
        );
        result
    }

    /// Execute a batch of calls with bounded parallelism.
    ///
    /// Results are positional: the i-th result corresponds to the i-th
    /// call. An oversized batch is rejected as a whole with a single
    /// `BATCH_TOO_LARGE` slot.
    pub async fn batch(
        &self,
        calls: Vec<BatchCall>,
        ctx: &Context,
        opts: &CallOpts,
    ) -> BatchResponse {
        if calls.len() > self.config.max_batch_size {
            warn!(
                router = %self.name,
                batch_size = calls.len(),
                max_batch_size = self.config.max_batch_size,
                "Rejecting oversized batch"
            );
            return BatchResponse::new(vec![BatchResult::error(RpcError::batch_too_large(
                format!(
                    "Batch size {} exceeds maximum allowed size {}",
                    calls.len(),
                    self.config.max_batch_size
                ),
            ))]);
        }
        if calls.is_empty() {
            return BatchResponse::new(Vec::new());
        }

        let paths: Vec<Value> = calls
            .iter()
            .map(|c| Value::String(c.path.clone()))
            .collect();
        self.sink.emit(
            TelemetryEvent::new(events::ROUTER_BATCH_START)
                .with_system_time()
                .measurement("batch_size", calls.len())
                .meta("router", self.name.as_str())
                .meta("paths", Value::Array(paths)),
        );
        let started = Instant::now();

        let per_call_timeout = Duration::from_millis(self.config.call_timeout_ms);
        let results: Vec<BatchResult> = futures::stream::iter(calls.into_iter().map(|call| {
            let call_ctx = ctx.clone();
            async move {
                let fut = self.call(&call.path, call.input, call_ctx, opts);
                match tokio::time::timeout(per_call_timeout, fut).await {
                    Ok(Ok(data)) => BatchResult::success(data),
                    Ok(Err(error)) => BatchResult::error(error),
                    Err(_) => BatchResult::error(RpcError::timeout("Procedure timed out")),
                }
            }
        }))
        .buffered(self.config.max_concurrency.max(1))
        .collect()
        .await;

        let response = BatchResponse::new(results);
        self.sink.emit(
            TelemetryEvent::new(events::ROUTER_BATCH_STOP)
                .with_duration(started.elapsed())
                .measurement("success_count", response.success_count())
                .measurement("error_count", response.error_count())
                .meta("router", self.name.as_str()),
        );
        response
    }

    fn lookup(&self, call_path: &str) -> RpcResult<Arc<RouteEntry>> {
        if !path::is_callable(call_path) {
            return Err(
                RpcError::invalid_path(format!("Invalid procedure path: {call_path}"))
                    .with_path(call_path),
            );
        }

        if let Some(entry) = self.by_path.get(call_path) {
            return Ok(entry.clone());
        }

        if let Some(alias) = self.aliases.get(call_path) {
            self.sink.emit(
                TelemetryEvent::new(events::ROUTER_ALIAS_RESOLVED)
                    .meta("router", self.name.as_str())
                    .meta("from", alias.from.as_str())
                    .meta("to", alias.to.as_str())
                    .meta("deprecated", alias.deprecated),
            );
            if let Some(entry) = self.by_path.get(&alias.to) {
                return Ok(entry.clone());
            }
        }

        Err(RpcError::procedure_not_found(call_path)
            .with_suggestions(suggest(call_path, self.by_path.keys())))
    }

    async fn run_entry(
        &self,
        entry: &RouteEntry,
        input: Value,
        ctx: Context,
        opts: &CallOpts,
    ) -> RpcResult<Value> {
        validate_input_size(&input, &self.config)?;

        let registry = self.units.get(&entry.unit).ok_or_else(|| {
            RpcError::internal(format!("Declaring unit '{}' is missing", entry.unit))
        })?;
        let def = registry.by_name(&entry.procedure_name).ok_or_else(|| {
            RpcError::internal(format!(
                "Procedure '{}' is missing from unit '{}'",
                entry.procedure_name, entry.unit
            ))
        })?;

        let ctx = ctx.for_procedure(&entry.path, entry.kind);
        execute(
            registry,
            def,
            entry.middleware.clone(),
            input,
            ctx,
            opts,
            &self.config,
            &self.sink,
        )
        .await
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// All canonical paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<_> = self.by_path.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// The entry at a canonical path.
    pub fn entry(&self, entry_path: &str) -> Option<&RouteEntry> {
        self.by_path.get(entry_path).map(Arc::as_ref)
    }

    /// Whether a canonical path exists.
    pub fn has(&self, entry_path: &str) -> bool {
        self.by_path.contains_key(entry_path)
    }

    /// Entries whose path equals `prefix` or sits below it, sorted by path.
    pub fn entries_by_prefix(&self, prefix: &str) -> Vec<&RouteEntry> {
        let nested = format!("{prefix}.");
        let mut found: Vec<&RouteEntry> = self
            .entries
            .iter()
            .filter(|e| e.path == prefix || e.path.starts_with(&nested))
            .map(|e| e.as_ref())
            .collect();
        found.sort_by(|a, b| a.path.cmp(&b.path));
        found
    }

    /// Sorted paths of all queries.
    pub fn queries(&self) -> Vec<String> {
        self.paths_by_kind(ProcedureKind::Query)
    }

    /// Sorted paths of all mutations.
    pub fn mutations(&self) -> Vec<String> {
        self.paths_by_kind(ProcedureKind::Mutation)
    }

    /// Sorted paths of all subscriptions.
    pub fn subscriptions(&self) -> Vec<String> {
        self.paths_by_kind(ProcedureKind::Subscription)
    }

    fn paths_by_kind(&self, kind: ProcedureKind) -> Vec<String> {
        let mut paths: Vec<_> = self
            .entries
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.path.clone())
            .collect();
        paths.sort();
        paths
    }

    /// All aliases, sorted by alternate path.
    pub fn aliases(&self) -> Vec<&Alias> {
        let mut aliases: Vec<_> = self.aliases.values().collect();
        aliases.sort_by(|a, b| a.from.cmp(&b.from));
        aliases
    }

    /// The canonical path a call path resolves to, if any.
    pub fn resolve(&self, call_path: &str) -> Option<&str> {
        if let Some(entry) = self.by_path.get(call_path) {
            return Some(&entry.path);
        }
        self.aliases
            .get(call_path)
            .and_then(|alias| self.by_path.get(&alias.to))
            .map(|entry| entry.path.as_str())
    }

    /// Names of the composed middleware chain at a canonical path.
    pub fn middleware_for(&self, entry_path: &str) -> Option<Vec<&str>> {
        self.by_path
            .get(entry_path)
            .map(|e| e.middleware.iter().map(|m| m.name()).collect())
    }

    /// The procedure definition behind a canonical path.
    pub fn procedure_for(&self, entry_path: &str) -> Option<Arc<ProcedureDef>> {
        let entry = self.by_path.get(entry_path)?;
        self.units
            .get(&entry.unit)?
            .by_name(&entry.procedure_name)
            .cloned()
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("name", &self.name)
            .field("paths", &self.paths())
            .field("aliases", &self.aliases.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Up to three known paths ranked by Jaro similarity to the missed one.
fn suggest<'a>(missed: &str, candidates: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut scored: Vec<(f64, &String)> = candidates
        .filter_map(|candidate| {
            let score = strsim::jaro(missed, candidate);
            (score > 0.7).then_some((score, candidate))
        })
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    scored.into_iter().take(3).map(|(_, c)| c.clone()).collect()
}

/// Reject inputs whose serialized size exceeds the configured limit.
///
/// Small scalars are estimated without serialization; containers fall back
/// to an exact measurement.
pub fn validate_input_size(input: &Value, config: &RpcConfig) -> RpcResult<()> {
    let estimate = match input {
        Value::Null => 4,
        Value::Bool(_) => 5,
        Value::Number(_) => 24,
        Value::String(s) => s.len() + 2,
        Value::Array(a) if a.is_empty() => 2,
        Value::Object(o) if o.is_empty() => 2,
        _ => usize::MAX,
    };
    if estimate <= config.max_input_size {
        return Ok(());
    }

    let actual = serde_json::to_string(input).map(|s| s.len()).unwrap_or(0);
    if actual > config.max_input_size {
        return Err(RpcError::other(
            "PAYLOAD_TOO_LARGE",
            format!(
                "Input size {} exceeds maximum allowed size {}",
                actual, config.max_input_size
            ),
        ));
    }
    Ok(())
}
