//! Shared fixtures for the test suite

use crate::context::Context;
use crate::error::RpcResult;
use crate::middleware::{Middleware, Next, from_fn};
use crate::procedure::Procedure;
use crate::registry::{ProcedureRegistry, ProcedureSet};
use crate::schema::{Schema, SchemaRef, ValidationError};
use crate::telemetry::{TelemetryEvent, TelemetrySink};
use serde_json::{Map, Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

// =============================================================================
// Telemetry capture
// =============================================================================

/// Sink that records every event for later assertions.
#[derive(Default)]
pub(crate) struct CollectingSink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl CollectingSink {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.name).collect()
    }

    pub(crate) fn events_named(&self, name: &str) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.name == name)
            .cloned()
            .collect()
    }
}

impl TelemetrySink for CollectingSink {
    fn emit(&self, event: TelemetryEvent) {
        self.events.lock().unwrap().push(event);
    }
}

// =============================================================================
// Test schema
// =============================================================================

enum FieldKind {
    Str,
    Int,
}

struct FieldSpec {
    name: &'static str,
    kind: FieldKind,
    required: bool,
}

/// Minimal object validator standing in for the external schema engine.
///
/// Knows string and integer fields, required-ness, and string-to-integer
/// coercion when the caller asks for it.
pub(crate) struct ObjectSchema {
    fields: Vec<FieldSpec>,
    seen_coerce: AtomicBool,
}

impl ObjectSchema {
    pub(crate) fn new() -> Self {
        Self {
            fields: Vec::new(),
            seen_coerce: AtomicBool::new(false),
        }
    }

    pub(crate) fn required_str(mut self, name: &'static str) -> Self {
        self.fields.push(FieldSpec {
            name,
            kind: FieldKind::Str,
            required: true,
        });
        self
    }

    pub(crate) fn required_int(mut self, name: &'static str) -> Self {
        self.fields.push(FieldSpec {
            name,
            kind: FieldKind::Int,
            required: true,
        });
        self
    }

    pub(crate) fn optional_str(mut self, name: &'static str) -> Self {
        self.fields.push(FieldSpec {
            name,
            kind: FieldKind::Str,
            required: false,
        });
        self
    }

    pub(crate) fn into_ref(self) -> SchemaRef {
        Arc::new(self)
    }

    pub(crate) fn last_coerce(&self) -> bool {
        self.seen_coerce.load(Ordering::Acquire)
    }
}

impl Schema for ObjectSchema {
    fn parse(&self, raw: Value, coerce: bool) -> Result<Value, Vec<ValidationError>> {
        self.seen_coerce.store(coerce, Ordering::Release);

        let Value::Object(input) = raw else {
            return Err(vec![ValidationError::root("expected an object")]);
        };

        let mut output = Map::new();
        let mut errors = Vec::new();
        for field in &self.fields {
            match input.get(field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        errors.push(ValidationError::new(
                            vec![field.name.to_string()],
                            "is required",
                        ));
                    }
                }
                Some(value) => match field.kind {
                    FieldKind::Str => {
                        if value.is_string() {
                            output.insert(field.name.to_string(), value.clone());
                        } else {
                            errors.push(ValidationError::new(
                                vec![field.name.to_string()],
                                "must be a string",
                            ));
                        }
                    }
                    FieldKind::Int => {
                        if value.is_i64() {
                            output.insert(field.name.to_string(), value.clone());
                        } else if coerce {
                            match value.as_str().and_then(|s| s.parse::<i64>().ok()) {
                                Some(n) => {
                                    output.insert(field.name.to_string(), json!(n));
                                }
                                None => errors.push(ValidationError::new(
                                    vec![field.name.to_string()],
                                    "must be an integer",
                                )),
                            }
                        } else {
                            errors.push(ValidationError::new(
                                vec![field.name.to_string()],
                                "must be an integer",
                            ));
                        }
                    }
                },
            }
        }

        if errors.is_empty() {
            Ok(Value::Object(output))
        } else {
            Err(errors)
        }
    }
}

/// Schema that rejects everything with a fixed field error.
pub(crate) struct RejectAll;

impl Schema for RejectAll {
    fn parse(&self, _raw: Value, _coerce: bool) -> Result<Value, Vec<ValidationError>> {
        Err(vec![ValidationError::new(
            vec!["value".to_string()],
            "is never acceptable",
        )])
    }
}

// =============================================================================
// Middleware fixtures
// =============================================================================

pub(crate) type ExecutionLog = Arc<Mutex<Vec<String>>>;

pub(crate) fn execution_log() -> ExecutionLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Middleware that appends its configured label to the log, then proceeds.
pub(crate) fn recording(label: &str, log: ExecutionLog) -> Arc<dyn Middleware> {
    let label = label.to_string();
    from_fn(move |ctx: Context, _config: Value, next: Next| {
        let label = label.clone();
        let log = log.clone();
        async move {
            log.lock().unwrap().push(label);
            next.run(ctx).await
        }
    })
}

/// Middleware that fails the call without invoking next.
pub(crate) fn failing(message: &str) -> Arc<dyn Middleware> {
    let message = message.to_string();
    from_fn(move |_ctx: Context, _config: Value, _next: Next| {
        let message = message.clone();
        async move { Err(crate::error::RpcError::other("AUTH_FAILED", message)) }
    })
}

// =============================================================================
// Registries
// =============================================================================

/// A `users` declaring unit: `get` echoes the id, `list` takes no input,
/// `create` is a mutation bound by name.
pub(crate) fn users_registry() -> ProcedureRegistry {
    ProcedureSet::new("users")
        .define(
            Procedure::query("get")
                .input(ObjectSchema::new().required_str("id").into_ref())
                .handler(|input: Value, _ctx: Context| async move {
                    Ok(json!({ "id": input["id"], "name": "Ada" }))
                }),
        )
        .define(
            Procedure::query("list").handler(|_input: Value, _ctx: Context| async move {
                Ok(json!([{ "id": "1", "name": "Ada" }, { "id": "2", "name": "Grace" }]))
            }),
        )
        .define(
            Procedure::mutation("create")
                .input(
                    ObjectSchema::new()
                        .required_str("name")
                        .optional_str("email")
                        .into_ref(),
                )
                .unbound(),
        )
        .bind(
            "create",
            |input: Value, _ctx: Context| async move { Ok(json!({ "created": input["name"] })) },
        )
        .finish()
        .expect("users registry is valid")
}

pub(crate) async fn echo_handler(input: Value, _ctx: Context) -> RpcResult<Value> {
    Ok(input)
}
