//! Middleware composition and chain execution tests
//!
//! Covers chain ordering (root, then scopes outer to inner, then
//! procedure-local), skip lists, context accumulation, error propagation,
//! and the exactly-once continuation protocol.

use super::{echo_handler, execution_log, failing, recording, users_registry};
use crate::context::Context;
use crate::error::ErrorCode;
use crate::executor::CallOpts;
use crate::middleware::{Next, from_fn};
use crate::procedure::Procedure;
use crate::registry::ProcedureSet;
use crate::router::Router;
use proptest::prelude::*;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn stats_registry() -> crate::registry::ProcedureRegistry {
    ProcedureSet::new("admin_proc")
        .define(
            Procedure::query("stats").handler(|_input: Value, _ctx: Context| async move {
                Ok(json!({ "total": 3 }))
            }),
        )
        .finish()
        .unwrap()
}

#[tokio::test]
async fn chains_compose_root_then_scope_then_local() {
    let log = execution_log();
    let local = recording("local", log.clone());

    let unit = ProcedureSet::new("admin_proc")
        .define(
            Procedure::query("stats")
                .middleware("local", local, json!({}))
                .handler(|_input: Value, _ctx: Context| async move { Ok(json!({ "total": 3 })) }),
        )
        .finish()
        .unwrap();

    let router = Router::builder()
        .middleware("logger", recording("logger", log.clone()), json!({}))
        .mount(users_registry(), "users", &[])
        .scope("admin", |s| {
            s.middleware("auth", recording("auth", log.clone()), json!({}))
                .middleware("admin_check", recording("admin_check", log.clone()), json!({}))
                .mount(unit, "actions", &[])
        })
        .build()
        .unwrap();

    assert_eq!(
        router.middleware_for("admin.actions.stats").unwrap(),
        vec!["logger", "auth", "admin_check", "local"]
    );
    assert_eq!(router.middleware_for("users.get").unwrap(), vec!["logger"]);

    router
        .call("admin.actions.stats", json!(null), Context::default(), &CallOpts::new())
        .await
        .unwrap();
    assert_eq!(
        log.lock().unwrap().as_slice(),
        ["logger", "auth", "admin_check", "local"]
    );
}

#[tokio::test]
async fn nested_scopes_stack_outer_to_inner() {
    let log = execution_log();

    let router = Router::builder()
        .middleware("root", recording("root", log.clone()), json!({}))
        .scope("api", |s| {
            s.middleware("outer", recording("outer", log.clone()), json!({}))
                .scope("admin", |s| {
                    s.middleware("inner", recording("inner", log.clone()), json!({}))
                        .mount(stats_registry(), "reports", &[])
                })
        })
        .build()
        .unwrap();

    let entry = router.entry("api.admin.reports.stats").unwrap();
    assert_eq!(entry.segments, vec!["api", "admin", "reports", "stats"]);
    assert_eq!(
        router.middleware_for("api.admin.reports.stats").unwrap(),
        vec!["root", "outer", "inner"]
    );

    router
        .call(
            "api.admin.reports.stats",
            json!(null),
            Context::default(),
            &CallOpts::new(),
        )
        .await
        .unwrap();
    assert_eq!(log.lock().unwrap().as_slice(), ["root", "outer", "inner"]);
}

#[tokio::test]
async fn skip_lists_remove_named_middleware() {
    let log = execution_log();

    let router = Router::builder()
        .middleware("logger", recording("logger", log.clone()), json!({}))
        .scope("admin", |s| {
            s.middleware("auth", recording("auth", log.clone()), json!({}))
                .mount(stats_registry(), "actions", &["logger"])
        })
        .build()
        .unwrap();

    assert_eq!(
        router.middleware_for("admin.actions.stats").unwrap(),
        vec!["auth"]
    );

    router
        .call("admin.actions.stats", json!(null), Context::default(), &CallOpts::new())
        .await
        .unwrap();
    assert_eq!(log.lock().unwrap().as_slice(), ["auth"]);
}

#[tokio::test]
async fn middleware_declared_after_a_mount_does_not_apply_to_it() {
    let log = execution_log();

    let router = Router::builder()
        .mount(users_registry(), "users", &[])
        .middleware("late", recording("late", log.clone()), json!({}))
        .mount(stats_registry(), "ops", &[])
        .build()
        .unwrap();

    assert!(router.middleware_for("users.get").unwrap().is_empty());
    assert_eq!(router.middleware_for("ops.stats").unwrap(), vec!["late"]);
}

#[tokio::test]
async fn assigns_flow_downstream_to_the_handler() {
    let tagger = from_fn(|ctx: Context, config: Value, next: Next| async move {
        next.run(ctx.assign("role", config["role"].clone())).await
    });

    let unit = ProcedureSet::new("whoami")
        .define(
            Procedure::query("role").handler(|_input: Value, ctx: Context| async move {
                Ok(ctx.get_assign("role").cloned().unwrap_or(Value::Null))
            }),
        )
        .finish()
        .unwrap();

    let router = Router::builder()
        .middleware("tagger", tagger, json!({"role": "admin"}))
        .mount(unit, "me", &[])
        .build()
        .unwrap();

    let value = router
        .call("me.role", json!(null), Context::default(), &CallOpts::new())
        .await
        .unwrap();
    assert_eq!(value, json!("admin"));
}

#[tokio::test]
async fn middleware_errors_short_circuit_the_chain() {
    let log = execution_log();

    let router = Router::builder()
        .middleware("first", recording("first", log.clone()), json!({}))
        .middleware("gate", failing("token expired"), json!({}))
        .middleware("after", recording("after", log.clone()), json!({}))
        .mount(users_registry(), "users", &[])
        .build()
        .unwrap();

    let err = router
        .call("users.list", json!(null), Context::default(), &CallOpts::new())
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::Other("AUTH_FAILED".to_string()));
    assert_eq!(err.message, "token expired");
    assert_eq!(log.lock().unwrap().as_slice(), ["first"]);
}

#[tokio::test]
async fn skipping_next_on_the_ok_path_is_a_protocol_error() {
    let silent = from_fn(|ctx: Context, _config: Value, _next: Next| async move { Ok(ctx) });

    let router = Router::builder()
        .middleware("silent", silent, json!({}))
        .mount(users_registry(), "users", &[])
        .build()
        .unwrap();

    let err = router
        .call("users.list", json!(null), Context::default(), &CallOpts::new())
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::InternalError);
    assert!(err.message.contains("silent"));
    assert!(err.message.contains("without invoking next"));
}

#[tokio::test]
async fn init_runs_once_per_entry_at_build_time() {
    struct CountingInit {
        inits: Arc<AtomicUsize>,
    }

    impl crate::middleware::Middleware for CountingInit {
        fn init(&self, opts: Value) -> Value {
            self.inits.fetch_add(1, Ordering::SeqCst);
            opts
        }

        fn call(
            &self,
            ctx: Context,
            _config: Value,
            next: Next,
        ) -> crate::middleware::MiddlewareFuture {
            Box::pin(next.run(ctx))
        }
    }

    let inits = Arc::new(AtomicUsize::new(0));
    let unit = ProcedureSet::new("pings")
        .define(Procedure::query("ping").handler(echo_handler))
        .finish()
        .unwrap();

    let router = Router::builder()
        .middleware(
            "counter",
            Arc::new(CountingInit {
                inits: inits.clone(),
            }),
            json!({}),
        )
        .mount(unit, "pings", &[])
        .build()
        .unwrap();

    // One entry uses the middleware, so init ran exactly once at build.
    assert_eq!(inits.load(Ordering::SeqCst), 1);

    for _ in 0..3 {
        router
            .call("pings.ping", json!(null), Context::default(), &CallOpts::new())
            .await
            .unwrap();
    }
    assert_eq!(inits.load(Ordering::SeqCst), 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// The composed chain preserves declaration order for any stack depth.
    #[test]
    fn prop_chain_preserves_declaration_order(count in 1usize..6) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let log = execution_log();

            let mut builder = Router::builder();
            let mut expected = Vec::new();
            for i in 0..count {
                let name = format!("m{i}");
                builder = builder.middleware(name.clone(), recording(&name, log.clone()), json!({}));
                expected.push(name);
            }
            let router = builder
                .mount(stats_registry(), "ops", &[])
                .build()
                .unwrap();

            router
                .call("ops.stats", json!(null), Context::default(), &CallOpts::new())
                .await
                .unwrap();

            let guard = log.lock().unwrap();
            prop_assert_eq!(guard.as_slice(), expected.as_slice());
            Ok(())
        })?;
    }
}
