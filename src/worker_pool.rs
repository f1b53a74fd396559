//! # Worker Pool Module
//!
//! Runs dispatches on a fixed set of `may` worker coroutines sharing one
//! request queue.
//!
//! ## Features
//!
//! - **Bounded queue**: at most `queue_bound` requests are in flight
//! - **Backpressure**: `shed` rejects at once when the queue is full; `block`
//!   waits up to `backpressure_timeout_ms` for room, then rejects
//! - **Metrics**: dispatched, completed and shed counts, current queue depth
//!
//! ## Configuration
//!
//! - `RAZOR_WORKERS`: worker coroutines (default: available parallelism)
//! - `RAZOR_QUEUE_BOUND`: in-flight limit (default: 1024)
//! - `RAZOR_BACKPRESSURE_MODE`: `block` or `shed` (default: `block`)
//! - `RAZOR_BACKPRESSURE_TIMEOUT_MS`: block mode wait (default: 50)
//! - `RAZOR_STACK_SIZE`: coroutine stack size, decimal or `0x` hex (default: `0x40000`)

use std::env;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use may::sync::mpsc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::dispatcher::{
    panic_message, ActionOutcome, BufferedResponse, DispatchError, DispatchRequest, Dispatcher,
};
use crate::ids::RequestId;

/// What `submit` does when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackpressureMode {
    /// Wait up to the configured timeout for room, then reject.
    #[default]
    Block,
    /// Reject immediately.
    Shed,
}

impl FromStr for BackpressureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(Self::Block),
            "shed" => Ok(Self::Shed),
            other => Err(format!("unknown backpressure mode '{other}'")),
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(4)
}

fn default_queue_bound() -> usize {
    1024
}

fn default_backpressure_timeout_ms() -> u64 {
    50
}

fn default_stack_size() -> usize {
    0x40000
}

/// Parse a size given in decimal or `0x`-prefixed hex.
pub(crate) fn parse_size(value: &str) -> Option<usize> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_bound")]
    pub queue_bound: usize,
    #[serde(default)]
    pub backpressure_mode: BackpressureMode,
    #[serde(default = "default_backpressure_timeout_ms")]
    pub backpressure_timeout_ms: u64,
    #[serde(default = "default_stack_size")]
    pub stack_size: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_bound: default_queue_bound(),
            backpressure_mode: BackpressureMode::default(),
            backpressure_timeout_ms: default_backpressure_timeout_ms(),
            stack_size: default_stack_size(),
        }
    }
}

impl WorkerPoolConfig {
    /// Defaults overridden by `RAZOR_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from `RAZOR_*` environment variables. Unparseable
    /// values are logged and ignored.
    pub fn apply_env(&mut self) {
        if let Some(v) = env_parse("RAZOR_WORKERS", |s| s.trim().parse::<usize>().ok()) {
            self.workers = v;
        }
        if let Some(v) = env_parse("RAZOR_QUEUE_BOUND", |s| s.trim().parse::<usize>().ok()) {
            self.queue_bound = v;
        }
        if let Some(v) = env_parse("RAZOR_BACKPRESSURE_MODE", |s| s.parse().ok()) {
            self.backpressure_mode = v;
        }
        if let Some(v) = env_parse("RAZOR_BACKPRESSURE_TIMEOUT_MS", |s| {
            s.trim().parse::<u64>().ok()
        }) {
            self.backpressure_timeout_ms = v;
        }
        if let Some(v) = env_parse("RAZOR_STACK_SIZE", parse_size) {
            self.stack_size = v;
        }
    }
}

fn env_parse<T>(name: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
    let raw = env::var(name).ok()?;
    let parsed = parse(&raw);
    if parsed.is_none() {
        warn!(variable = name, value = %raw, "Ignoring invalid environment value");
    }
    parsed
}

/// Pool counters, updated lock-free.
#[derive(Debug, Default)]
pub struct WorkerPoolMetrics {
    shed_count: AtomicU64,
    queue_depth: AtomicUsize,
    dispatched_count: AtomicU64,
    completed_count: AtomicU64,
}

impl WorkerPoolMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_shed(&self) {
        self.shed_count.fetch_add(1, Ordering::Relaxed);
    }

    fn record_completion(&self) {
        self.completed_count.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_sub(1, Ordering::AcqRel);
    }

    /// Reserve a queue slot if fewer than `bound` requests are in flight.
    fn try_reserve(&self, bound: usize) -> bool {
        let mut depth = self.queue_depth.load(Ordering::Acquire);
        loop {
            if depth >= bound {
                return false;
            }
            match self.queue_depth.compare_exchange_weak(
                depth,
                depth + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.dispatched_count.fetch_add(1, Ordering::Relaxed);
                    return true;
                }
                Err(current) => depth = current,
            }
        }
    }

    fn release(&self) {
        self.queue_depth.fetch_sub(1, Ordering::AcqRel);
        self.dispatched_count.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn shed_count(&self) -> u64 {
        self.shed_count.load(Ordering::Relaxed)
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Acquire)
    }

    pub fn dispatched_count(&self) -> u64 {
        self.dispatched_count.load(Ordering::Relaxed)
    }

    pub fn completed_count(&self) -> u64 {
        self.completed_count.load(Ordering::Relaxed)
    }
}

/// Submission failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// The queue stayed full (`shed`, or `block` past its timeout).
    Saturated,
    /// The workers are gone.
    Closed,
}

impl PoolError {
    /// Status a transport should answer with.
    pub fn status(&self) -> u16 {
        match self {
            PoolError::Saturated => 429,
            PoolError::Closed => 503,
        }
    }
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Saturated => write!(f, "dispatch queue is full"),
            PoolError::Closed => write!(f, "dispatch workers are not running"),
        }
    }
}

impl std::error::Error for PoolError {}

/// Result of a pooled dispatch.
#[derive(Debug)]
pub struct DispatchReply {
    pub request_id: RequestId,
    pub outcome: ActionOutcome,
    pub response: BufferedResponse,
}

struct Job {
    request: DispatchRequest,
    reply: mpsc::Sender<DispatchReply>,
}

/// Holds one reserved queue slot; dropping it records the completion, so the
/// slot is returned even when a job unwinds.
struct QueueSlot<'a>(&'a WorkerPoolMetrics);

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.0.record_completion();
    }
}

fn run_job(
    dispatcher: &Dispatcher,
    request: &DispatchRequest,
    worker_id: usize,
) -> (ActionOutcome, BufferedResponse) {
    match panic::catch_unwind(AssertUnwindSafe(|| dispatcher.dispatch_buffered(request))) {
        Ok(reply) => reply,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(
                request_id = %request.request_id,
                worker_id,
                panic_message = %message,
                "Dispatch panicked in worker"
            );
            let outcome = ActionOutcome::InternalError(DispatchError::Panicked {
                action: request.path.clone(),
                message,
            });
            let mut response = BufferedResponse::new();
            outcome.write_error_response(&mut response);
            (outcome, response)
        }
    }
}

/// Dispatches requests on `may` worker coroutines.
pub struct DispatchPool {
    config: WorkerPoolConfig,
    sender: mpsc::Sender<Job>,
    metrics: Arc<WorkerPoolMetrics>,
}

impl DispatchPool {
    /// Spawn `config.workers` coroutines running `dispatcher`.
    ///
    /// # Safety
    ///
    /// Spawns coroutines with `may::coroutine::Builder::spawn`, which is unsafe
    /// in the `may` runtime: the caller must not rely on thread-local storage
    /// inside actions and must have configured the `may` runtime beforehand.
    pub unsafe fn new(dispatcher: Dispatcher, config: WorkerPoolConfig) -> Self {
        let (tx, rx) = mpsc::channel::<Job>();
        let rx = Arc::new(rx);
        let metrics = Arc::new(WorkerPoolMetrics::new());

        info!(
            workers = config.workers,
            queue_bound = config.queue_bound,
            backpressure_mode = ?config.backpressure_mode,
            stack_size = config.stack_size,
            "Creating dispatch pool"
        );

        for worker_id in 0..config.workers.max(1) {
            let rx = Arc::clone(&rx);
            let dispatcher = dispatcher.clone();
            let metrics = Arc::clone(&metrics);

            let spawn_result = may::coroutine::Builder::new()
                .name(format!("razor-worker-{worker_id}"))
                .stack_size(config.stack_size)
                .spawn(move || {
                    debug!(worker_id, "Worker coroutine started");
                    while let Ok(job) = rx.recv() {
                        let request_id = job.request.request_id;
                        let (outcome, response) = {
                            let _slot = QueueSlot(&metrics);
                            run_job(&dispatcher, &job.request, worker_id)
                        };
                        let reply = DispatchReply {
                            request_id,
                            outcome,
                            response,
                        };
                        if job.reply.send(reply).is_err() {
                            debug!(
                                request_id = %request_id,
                                worker_id,
                                "Reply receiver dropped"
                            );
                        }
                    }
                    debug!(worker_id, "Worker coroutine exiting");
                });

            if let Err(e) = spawn_result {
                error!(worker_id, error = %e, "Failed to spawn worker coroutine");
            }
        }

        Self {
            config,
            sender: tx,
            metrics,
        }
    }

    /// Queue `request`; the reply arrives on the returned receiver.
    pub fn submit(
        &self,
        request: DispatchRequest,
    ) -> Result<mpsc::Receiver<DispatchReply>, PoolError> {
        let request_id = request.request_id;
        if !self.reserve() {
            self.metrics.record_shed();
            warn!(
                request_id = %request_id,
                queue_depth = self.metrics.queue_depth(),
                queue_bound = self.config.queue_bound,
                mode = ?self.config.backpressure_mode,
                "Dispatch queue full, request shed"
            );
            return Err(PoolError::Saturated);
        }

        let (reply_tx, reply_rx) = mpsc::channel();
        let job = Job {
            request,
            reply: reply_tx,
        };
        if let Err(e) = self.sender.send(job) {
            self.metrics.release();
            error!(request_id = %request_id, error = %e, "Dispatch pool channel disconnected");
            return Err(PoolError::Closed);
        }
        Ok(reply_rx)
    }

    /// Submit and wait for the reply.
    pub fn dispatch(&self, request: DispatchRequest) -> Result<DispatchReply, PoolError> {
        let reply = self.submit(request)?;
        reply.recv().map_err(|_| PoolError::Closed)
    }

    fn reserve(&self) -> bool {
        let bound = self.config.queue_bound;
        if self.metrics.try_reserve(bound) {
            return true;
        }
        if self.config.backpressure_mode == BackpressureMode::Shed {
            return false;
        }
        let deadline = Instant::now() + Duration::from_millis(self.config.backpressure_timeout_ms);
        while Instant::now() < deadline {
            may::coroutine::sleep(Duration::from_millis(1));
            if self.metrics.try_reserve(bound) {
                return true;
            }
        }
        false
    }

    pub fn metrics(&self) -> &Arc<WorkerPoolMetrics> {
        &self.metrics
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }
}
