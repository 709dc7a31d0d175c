//! Batch execution tests
//!
//! Positional results, size limits, per-call timeouts, and the concurrency
//! bound.

use super::{CollectingSink, users_registry};
use crate::batch::BatchCall;
use crate::config::RpcConfig;
use crate::context::Context;
use crate::error::ErrorCode;
use crate::executor::CallOpts;
use crate::procedure::Procedure;
use crate::registry::ProcedureSet;
use crate::router::Router;
use crate::telemetry::events;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[tokio::test]
async fn results_align_with_input_order() {
    let router = Router::builder()
        .mount(users_registry(), "users", &[])
        .build()
        .unwrap();

    let response = router
        .batch(
            vec![
                BatchCall::new("users.get", json!({"id": "1"})),
                BatchCall::new("unknown.path", json!({})),
                BatchCall::new("users.list", json!(null)),
            ],
            &Context::default(),
            &CallOpts::new(),
        )
        .await;

    assert_eq!(response.len(), 3);
    assert_eq!(response.results[0].data().unwrap()["id"], json!("1"));
    assert_eq!(
        response.results[1].get_error().unwrap().code,
        ErrorCode::NotFound
    );
    assert!(response.results[2].is_success());
    assert_eq!(response.success_count(), 2);
    assert_eq!(response.error_count(), 1);
}

#[tokio::test]
async fn oversized_batches_are_rejected_whole() {
    let router = Router::builder()
        .config(RpcConfig::new().with_max_batch_size(5))
        .mount(users_registry(), "users", &[])
        .build()
        .unwrap();

    let calls: Vec<_> = (0..10)
        .map(|i| BatchCall::new("users.get", json!({"id": i.to_string()})))
        .collect();
    let response = router.batch(calls, &Context::default(), &CallOpts::new()).await;

    assert_eq!(response.len(), 1);
    assert_eq!(
        response.results[0].get_error().unwrap().code,
        ErrorCode::BatchTooLarge
    );
}

#[tokio::test]
async fn empty_batches_return_empty_results() {
    let router = Router::builder()
        .mount(users_registry(), "users", &[])
        .build()
        .unwrap();

    let response = router
        .batch(Vec::new(), &Context::default(), &CallOpts::new())
        .await;
    assert!(response.is_empty());
}

fn sleepy_registry() -> crate::registry::ProcedureRegistry {
    ProcedureSet::new("sleepy")
        .define(
            Procedure::query("nap").handler(|input: Value, _ctx: Context| async move {
                let ms = input["ms"].as_u64().unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(json!({ "slept": ms }))
            }),
        )
        .finish()
        .unwrap()
}

#[tokio::test]
async fn slow_calls_time_out_without_tainting_the_batch() {
    let router = Router::builder()
        .config(RpcConfig::new().with_call_timeout_ms(50))
        .mount(sleepy_registry(), "sleepy", &[])
        .build()
        .unwrap();

    let response = router
        .batch(
            vec![
                BatchCall::new("sleepy.nap", json!({"ms": 5})),
                BatchCall::new("sleepy.nap", json!({"ms": 5_000})),
                BatchCall::new("sleepy.nap", json!({"ms": 5})),
            ],
            &Context::default(),
            &CallOpts::new(),
        )
        .await;

    assert!(response.results[0].is_success());
    let timed_out = response.results[1].get_error().unwrap();
    assert_eq!(timed_out.code, ErrorCode::Timeout);
    assert_eq!(timed_out.message, "Procedure timed out");
    assert!(response.results[2].is_success());
}

#[tokio::test]
async fn fan_out_respects_the_concurrency_bound() {
    struct Gauge {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Gauge {
        fn enter(&self) {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }

        fn leave(&self) {
            self.current.fetch_sub(1, Ordering::SeqCst);
        }
    }

    let gauge = Arc::new(Gauge {
        current: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let handler_gauge = gauge.clone();

    let unit = ProcedureSet::new("gauged")
        .define(Procedure::query("work").handler(move |_input: Value, _ctx: Context| {
            let gauge = handler_gauge.clone();
            async move {
                gauge.enter();
                tokio::time::sleep(Duration::from_millis(20)).await;
                gauge.leave();
                Ok(json!(null))
            }
        }))
        .finish()
        .unwrap();

    let router = Router::builder()
        .config(RpcConfig::new().with_max_concurrency(2))
        .mount(unit, "gauged", &[])
        .build()
        .unwrap();

    let calls: Vec<_> = (0..8)
        .map(|_| BatchCall::new("gauged.work", json!(null)))
        .collect();
    let response = router.batch(calls, &Context::default(), &CallOpts::new()).await;

    assert_eq!(response.success_count(), 8);
    assert!(gauge.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn order_is_preserved_under_uneven_completion() {
    let router = Router::builder()
        .mount(sleepy_registry(), "sleepy", &[])
        .build()
        .unwrap();

    // Later calls finish first; slots must still line up with the input.
    let delays = [40u64, 30, 20, 10, 0];
    let calls: Vec<_> = delays
        .iter()
        .map(|ms| BatchCall::new("sleepy.nap", json!({"ms": ms})))
        .collect();
    let response = router.batch(calls, &Context::default(), &CallOpts::new()).await;

    for (result, ms) in response.results.iter().zip(delays) {
        assert_eq!(result.data().unwrap()["slept"], json!(ms));
    }
}

#[tokio::test]
async fn batch_telemetry_brackets_the_fan_out() {
    let sink = CollectingSink::new();
    let router = Router::builder()
        .sink(sink.clone())
        .mount(users_registry(), "users", &[])
        .build()
        .unwrap();

    router
        .batch(
            vec![
                BatchCall::new("users.list", json!(null)),
                BatchCall::new("missing.path", json!(null)),
            ],
            &Context::default(),
            &CallOpts::new(),
        )
        .await;

    let start = &sink.events_named(events::ROUTER_BATCH_START)[0];
    assert_eq!(start.measurements["batch_size"], json!(2));
    assert_eq!(
        start.metadata["paths"],
        json!(["users.list", "missing.path"])
    );

    let stop = &sink.events_named(events::ROUTER_BATCH_STOP)[0];
    assert_eq!(stop.measurements["success_count"], json!(1));
    assert_eq!(stop.measurements["error_count"], json!(1));
    assert!(stop.measurements.contains_key("duration"));
}
