#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use common::shop_app;
use common::test_server::setup_may_runtime;
use http::Method;
use razor::action::{ActionDescriptor, ActionResult, ControllerDescriptor};
use razor::app::AppBuilder;
use razor::dispatcher::{ActionOutcome, DispatchError, DispatchRequest, ResponseSink};
use razor::ioc::Component;
use razor::runtime_config::RuntimeConfig;
use razor::worker_pool::{BackpressureMode, PoolError, WorkerPoolConfig};
use serde_json::json;

/// Serialises tests that touch `RAZOR_*` variables.
static ENV_MUTEX: Mutex<()> = Mutex::new(());

const POOL_VARS: [&str; 5] = [
    "RAZOR_WORKERS",
    "RAZOR_QUEUE_BOUND",
    "RAZOR_BACKPRESSURE_MODE",
    "RAZOR_BACKPRESSURE_TIMEOUT_MS",
    "RAZOR_STACK_SIZE",
];

fn clear_pool_env() {
    for var in POOL_VARS {
        env::remove_var(var);
    }
}

fn runtime(pool: WorkerPoolConfig) -> RuntimeConfig {
    RuntimeConfig {
        pool,
        ..RuntimeConfig::default()
    }
}

#[derive(Default)]
struct GateController;

/// Shop app plus `/gate/wait`, which holds its worker until `gate` opens.
fn gated_app(gate: Arc<AtomicBool>) -> AppBuilder {
    shop_app().controller(
        ControllerDescriptor::new("gate", Component::<GateController>::with_default()).action(
            ActionDescriptor::get("wait", "wait").handler(move |_: &GateController, _| {
                while !gate.load(Ordering::SeqCst) {
                    may::coroutine::sleep(Duration::from_millis(1));
                }
                Ok(ActionResult::text("opened"))
            }),
        ),
    )
}

fn wait_request() -> DispatchRequest {
    DispatchRequest::new(Method::GET, "/gate/wait")
}

#[test]
fn test_pool_dispatches_requests() {
    setup_may_runtime();
    let app = shop_app()
        .runtime(runtime(WorkerPoolConfig {
            workers: 2,
            queue_bound: 8,
            backpressure_mode: BackpressureMode::Shed,
            ..WorkerPoolConfig::default()
        }))
        .build()
        .unwrap();
    let pool = unsafe { app.start_pool() };

    let receivers: Vec<_> = (0..3)
        .map(|id| {
            let path = format!("/shop/books/{id}.html");
            pool.submit(DispatchRequest::new(Method::GET, &path)).unwrap()
        })
        .collect();
    let titles: Vec<serde_json::Value> = receivers
        .into_iter()
        .map(|rx| {
            let reply = rx.recv().unwrap();
            assert_eq!(reply.outcome.status(), Some(200));
            reply.response.body_json().unwrap()["title"].clone()
        })
        .collect();
    assert_eq!(titles, vec![json!("Dune"), json!("Solaris"), json!("Neuromancer")]);

    let reply = pool
        .dispatch(DispatchRequest::new(Method::GET, "/nowhere"))
        .unwrap();
    assert_eq!(reply.response.status, 404);

    let metrics = pool.metrics();
    assert_eq!(metrics.dispatched_count(), 4);
    assert_eq!(metrics.completed_count(), 4);
    assert_eq!(metrics.queue_depth(), 0);
    assert_eq!(metrics.shed_count(), 0);
}

#[test]
fn test_reply_carries_request_id() {
    setup_may_runtime();
    let app = shop_app()
        .runtime(runtime(WorkerPoolConfig {
            workers: 1,
            ..WorkerPoolConfig::default()
        }))
        .build()
        .unwrap();
    let pool = unsafe { app.start_pool() };

    let request = DispatchRequest::new(Method::GET, "/shop/books/list");
    let id = request.request_id;
    let reply = pool.dispatch(request).unwrap();
    assert_eq!(reply.request_id, id);
}

#[test]
fn test_shed_mode_rejects_when_full() {
    setup_may_runtime();
    let app = shop_app()
        .runtime(runtime(WorkerPoolConfig {
            workers: 1,
            queue_bound: 0,
            backpressure_mode: BackpressureMode::Shed,
            ..WorkerPoolConfig::default()
        }))
        .build()
        .unwrap();
    let pool = unsafe { app.start_pool() };

    let err = pool
        .submit(DispatchRequest::new(Method::GET, "/shop/books/list"))
        .err()
        .unwrap();
    assert_eq!(err, PoolError::Saturated);
    assert_eq!(err.status(), 429);
    assert_eq!(pool.metrics().shed_count(), 1);
    assert_eq!(pool.metrics().dispatched_count(), 0);
}

#[test]
fn test_shed_mode_accepts_up_to_bound_in_flight() {
    setup_may_runtime();
    let gate = Arc::new(AtomicBool::new(false));
    let app = gated_app(Arc::clone(&gate))
        .runtime(runtime(WorkerPoolConfig {
            workers: 1,
            queue_bound: 2,
            backpressure_mode: BackpressureMode::Shed,
            ..WorkerPoolConfig::default()
        }))
        .build()
        .unwrap();
    let pool = unsafe { app.start_pool() };

    let first = pool.submit(wait_request()).unwrap();
    let second = pool.submit(wait_request()).unwrap();
    assert_eq!(pool.metrics().queue_depth(), 2);

    let err = pool.submit(wait_request()).err().unwrap();
    assert_eq!(err, PoolError::Saturated);
    assert_eq!(pool.metrics().shed_count(), 1);
    assert_eq!(pool.metrics().queue_depth(), 2);

    gate.store(true, Ordering::SeqCst);
    for rx in [first, second] {
        let reply = rx.recv().unwrap();
        assert_eq!(reply.outcome.status(), Some(200));
        assert_eq!(reply.response.body_text(), "opened");
    }

    let metrics = pool.metrics();
    assert_eq!(metrics.queue_depth(), 0);
    assert_eq!(metrics.dispatched_count(), 2);
    assert_eq!(metrics.completed_count(), 2);

    // room again once the in-flight jobs are done
    let reply = pool
        .dispatch(DispatchRequest::new(Method::GET, "/shop/books/list"))
        .unwrap();
    assert_eq!(reply.outcome.status(), Some(200));
}

#[test]
fn test_block_mode_waits_for_room_then_succeeds() {
    setup_may_runtime();
    let gate = Arc::new(AtomicBool::new(false));
    let app = gated_app(Arc::clone(&gate))
        .runtime(runtime(WorkerPoolConfig {
            workers: 1,
            queue_bound: 1,
            backpressure_mode: BackpressureMode::Block,
            backpressure_timeout_ms: 5_000,
            ..WorkerPoolConfig::default()
        }))
        .build()
        .unwrap();
    let pool = unsafe { app.start_pool() };

    let held = pool.submit(wait_request()).unwrap();
    let opener = {
        let gate = Arc::clone(&gate);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            gate.store(true, Ordering::SeqCst);
        })
    };

    let started = Instant::now();
    let reply = pool
        .dispatch(DispatchRequest::new(Method::GET, "/shop/books/list"))
        .unwrap();
    assert_eq!(reply.outcome.status(), Some(200));
    assert!(started.elapsed() >= Duration::from_millis(40));
    assert_eq!(held.recv().unwrap().outcome.status(), Some(200));
    opener.join().unwrap();

    let metrics = pool.metrics();
    assert_eq!(metrics.shed_count(), 0);
    assert_eq!(metrics.completed_count(), 2);
    assert_eq!(metrics.queue_depth(), 0);
}

#[test]
fn test_pool_survives_panicking_requests() {
    setup_may_runtime();
    let app = shop_app()
        .middleware_at(
            "/shop/books/list",
            Arc::new(|_: &DispatchRequest, _: &mut dyn ResponseSink| panic!("middleware bug")),
        )
        .runtime(runtime(WorkerPoolConfig {
            workers: 1,
            queue_bound: 1,
            backpressure_mode: BackpressureMode::Shed,
            ..WorkerPoolConfig::default()
        }))
        .build()
        .unwrap();
    let pool = unsafe { app.start_pool() };

    for path in ["/shop/books/list", "/shop/boom", "/shop/books/list"] {
        let reply = pool.dispatch(DispatchRequest::new(Method::GET, path)).unwrap();
        assert!(matches!(
            reply.outcome,
            ActionOutcome::InternalError(DispatchError::Panicked { .. })
        ));
        assert_eq!(reply.response.status, 500);
        assert_eq!(pool.metrics().queue_depth(), 0);
    }

    // the single worker is still alive and the slot was returned
    let reply = pool
        .dispatch(DispatchRequest::new(Method::GET, "/shop/books/0.html"))
        .unwrap();
    assert_eq!(reply.outcome.status(), Some(200));
    assert_eq!(pool.metrics().completed_count(), 4);
}

#[test]
fn test_block_mode_waits_for_timeout_then_rejects() {
    setup_may_runtime();
    let app = shop_app()
        .runtime(runtime(WorkerPoolConfig {
            workers: 1,
            queue_bound: 0,
            backpressure_mode: BackpressureMode::Block,
            backpressure_timeout_ms: 20,
            ..WorkerPoolConfig::default()
        }))
        .build()
        .unwrap();
    let pool = unsafe { app.start_pool() };

    let started = Instant::now();
    let result = pool.dispatch(DispatchRequest::new(Method::GET, "/shop/books/list"));
    assert!(matches!(result, Err(PoolError::Saturated)));
    assert!(started.elapsed() >= Duration::from_millis(20));
    assert_eq!(pool.metrics().shed_count(), 1);
}

#[test]
fn test_pool_config_from_env() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    clear_pool_env();
    env::set_var("RAZOR_WORKERS", "3");
    env::set_var("RAZOR_BACKPRESSURE_MODE", "SHED");
    env::set_var("RAZOR_BACKPRESSURE_TIMEOUT_MS", "75");
    env::set_var("RAZOR_STACK_SIZE", "0x20000");
    env::set_var("RAZOR_QUEUE_BOUND", "lots");

    let config = WorkerPoolConfig::from_env();
    clear_pool_env();

    assert_eq!(config.workers, 3);
    assert_eq!(config.backpressure_mode, BackpressureMode::Shed);
    assert_eq!(config.backpressure_timeout_ms, 75);
    assert_eq!(config.stack_size, 0x20000);
    // unparseable values keep the default
    assert_eq!(config.queue_bound, WorkerPoolConfig::default().queue_bound);
}

#[test]
fn test_runtime_config_file_then_env() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    clear_pool_env();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("razor.yaml");
    std::fs::write(
        &path,
        "pool:\n  workers: 6\n  queue_bound: 32\nlogging:\n  level: debug\n  format: pretty\n",
    )
    .unwrap();

    env::set_var("RAZOR_QUEUE_BOUND", "64");
    let config = RuntimeConfig::load(&path).unwrap();
    clear_pool_env();

    assert_eq!(config.pool.workers, 6);
    assert_eq!(config.pool.queue_bound, 64);
    assert_eq!(config.logging.level, "debug");

    assert!(RuntimeConfig::load(dir.path().join("missing.yaml")).is_err());
}
