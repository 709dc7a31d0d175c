//! Telemetry events
//!
//! The core emits named events at well-defined points of the dispatch and
//! execution pipeline; collection is external. A [`TelemetrySink`] receives
//! each [`TelemetryEvent`]; the default [`TracingSink`] forwards them to
//! `tracing` at debug level. Sinks must be safe for concurrent emission and
//! must not block.

use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Hierarchical event names emitted by the core.
pub mod events {
    pub const PROCEDURE_START: &str = "procedure.start";
    pub const PROCEDURE_STOP: &str = "procedure.stop";
    pub const PROCEDURE_EXCEPTION: &str = "procedure.exception";
    pub const ROUTER_LOOKUP_START: &str = "router.lookup.start";
    pub const ROUTER_LOOKUP_STOP: &str = "router.lookup.stop";
    pub const ROUTER_ALIAS_RESOLVED: &str = "router.alias.resolved";
    pub const ROUTER_BATCH_START: &str = "router.batch.start";
    pub const ROUTER_BATCH_STOP: &str = "router.batch.stop";
}

/// A single telemetry event: name, numeric measurements, and metadata.
#[derive(Debug, Clone)]
pub struct TelemetryEvent {
    /// Hierarchical event name (one of [`events`])
    pub name: &'static str,
    /// Numeric measurements (durations in milliseconds, sizes, timestamps)
    pub measurements: Map<String, Value>,
    /// Identifying metadata (procedure, kind, router, path, ...)
    pub metadata: Map<String, Value>,
}

impl TelemetryEvent {
    /// Create an event with an empty payload.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            measurements: Map::new(),
            metadata: Map::new(),
        }
    }

    /// Add a measurement.
    pub fn measurement(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.measurements.insert(key.into(), value.into());
        self
    }

    /// Add a metadata field.
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Add the wall-clock timestamp measurement used by `*.start` events.
    pub fn with_system_time(self) -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.measurement("system_time", millis)
    }

    /// Add the duration measurement used by `*.stop` events.
    pub fn with_duration(self, duration: Duration) -> Self {
        self.measurement("duration", duration.as_millis() as u64)
    }
}

/// Consumer of telemetry events.
pub trait TelemetrySink: Send + Sync {
    /// Receive one event. Must not block.
    fn emit(&self, event: TelemetryEvent);
}

/// Default sink: forwards events to `tracing` at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn emit(&self, event: TelemetryEvent) {
        debug!(
            event = event.name,
            measurements = %serde_json::Value::Object(event.measurements),
            metadata = %serde_json::Value::Object(event.metadata),
            "telemetry"
        );
    }
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn emit(&self, _event: TelemetryEvent) {}
}

/// Shared sink handle.
pub type SinkRef = Arc<dyn TelemetrySink>;
