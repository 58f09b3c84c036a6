//! In-process stand-in for the lab service: control endpoints, a drain
//! simulation driven by report polls, and actuator-style heap gauges.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use axum::Json;
use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

pub use axum::http::StatusCode;

pub const PATH_RESET: &str = "/lab/report/reset";
pub const PATH_SEED: &str = "/lab/seed";
pub const PATH_REPORT: &str = "/lab/report";
pub const PATH_METRIC: &str = "/actuator/metrics/{name}";

pub const DISPATCH_PATHS: [(&str, &str); 4] = [
    ("/lab/run", "async"),
    ("/lab/run-all", "async-all"),
    ("/lab/run-sync", "sync"),
    ("/lab/run-sync-all", "sync-all"),
];

const BASE_HEAP_BYTES: f64 = 64.0 * 1024.0 * 1024.0;
const HEAP_BYTES_PER_JOB: f64 = 16.0 * 1024.0;
const MAX_HEAP_BYTES: f64 = 4096.0 * 1024.0 * 1024.0;

/// Endpoint the server should answer with an injected failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    Reset,
    Seed,
    Dispatch,
    Report,
}

#[derive(Debug, Clone)]
pub struct LabServerOptions {
    /// Jobs moved from pending to processing per report poll.
    pub drain_per_report: u64,
    pub fail_on: Option<FailPoint>,
    /// Status returned by the `fail_on` endpoint.
    pub fail_status: StatusCode,
    /// Endpoint that sends its response head and then never finishes the body.
    pub stall_body_on: Option<FailPoint>,
    /// Serve `/actuator/metrics/*`; when off those paths return 404.
    pub heap_metrics: bool,
    /// Errors reported per finished run.
    pub errors_per_run: u64,
    /// Retries reported per finished run.
    pub retries_per_run: u64,
}

impl Default for LabServerOptions {
    fn default() -> Self {
        Self {
            drain_per_report: 100,
            fail_on: None,
            fail_status: StatusCode::INTERNAL_SERVER_ERROR,
            stall_body_on: None,
            heap_metrics: true,
            errors_per_run: 0,
            retries_per_run: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LabServerStats {
    resets: Arc<AtomicU64>,
    seeds: Arc<AtomicU64>,
    dispatches: Arc<AtomicU64>,
    reports: Arc<AtomicU64>,
    metric_fetches: Arc<AtomicU64>,
}

impl LabServerStats {
    pub fn resets(&self) -> u64 {
        self.resets.load(Ordering::Relaxed)
    }

    pub fn seeds(&self) -> u64 {
        self.seeds.load(Ordering::Relaxed)
    }

    pub fn dispatches(&self) -> u64 {
        self.dispatches.load(Ordering::Relaxed)
    }

    pub fn reports(&self) -> u64 {
        self.reports.load(Ordering::Relaxed)
    }

    pub fn metric_fetches(&self) -> u64 {
        self.metric_fetches.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
struct RunState {
    run_id: u64,
    mode: Option<&'static str>,
    items: u64,
    pending: u64,
    processing: u64,
    done: u64,
    started_at: Option<Instant>,
    started_at_ms: Option<u64>,
    finished_at_ms: Option<u64>,
    drain_time_ms: Option<u64>,
}

impl RunState {
    fn is_drained(&self) -> bool {
        self.pending == 0 && self.processing == 0
    }

    /// One simulation step: in-flight jobs finish, the next batch starts.
    fn advance(&mut self, batch: u64) {
        if self.mode.is_none() {
            return;
        }
        self.done += self.processing;
        self.processing = batch.min(self.pending);
        self.pending -= self.processing;

        if self.is_drained()
            && self.finished_at_ms.is_none()
            && let Some(started) = self.started_at
        {
            self.finished_at_ms = Some(epoch_ms());
            self.drain_time_ms = Some(started.elapsed().as_millis() as u64);
        }
    }
}

#[derive(Debug, Clone)]
struct AppState {
    options: Arc<LabServerOptions>,
    stats: LabServerStats,
    run: Arc<Mutex<RunState>>,
}

impl AppState {
    fn run(&self) -> MutexGuard<'_, RunState> {
        self.run.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Injected response for `point`, if one is configured.
    fn injected(&self, point: FailPoint) -> Option<Response> {
        if self.options.stall_body_on == Some(point) {
            return Some(stalled_body());
        }
        (self.options.fail_on == Some(point)).then(|| injected_failure(self.options.fail_status))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    pending: u64,
    processing: u64,
    done: u64,
    error: u64,
    retry_scheduled: u64,
    total_processed: u64,
    total_success: u64,
    total_errors: u64,
    total_retry_scheduled: u64,
    total_stuck_recovered: u64,
    avg_processing_ms: u64,
    total_elapsed_ms: u64,
    jobs_per_minute: f64,
    run_id: Option<String>,
    scenario: &'static str,
    mode: Option<&'static str>,
    items: u64,
    started_at_ms: Option<u64>,
    finished_at_ms: Option<u64>,
    drain_time_ms: Option<u64>,
    success_count: u64,
    fail_count: u64,
    retry_count: u64,
    run_done: bool,
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

fn injected_failure(status: StatusCode) -> Response {
    (status, "injected failure").into_response()
}

fn stalled_body() -> Response {
    let stream = tokio_stream::pending::<Result<Bytes, std::io::Error>>();
    Response::new(Body::from_stream(stream))
}

async fn handle_reset(State(state): State<AppState>) -> Response {
    state.stats.resets.fetch_add(1, Ordering::Relaxed);
    if let Some(res) = state.injected(FailPoint::Reset) {
        return res;
    }

    let mut run = state.run();
    let (run_id, pending) = (run.run_id, run.pending);
    *run = RunState {
        run_id,
        pending,
        ..RunState::default()
    };
    StatusCode::OK.into_response()
}

async fn handle_seed(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state.stats.seeds.fetch_add(1, Ordering::Relaxed);
    if let Some(res) = state.injected(FailPoint::Seed) {
        return res;
    }

    let items = match query.get("items").map(|v| v.parse::<u64>()) {
        None => 100,
        Some(Ok(v)) => v,
        Some(Err(_)) => return (StatusCode::BAD_REQUEST, "bad items").into_response(),
    };

    state.run().pending += items;
    Json(json!({ "seeded": items })).into_response()
}

async fn handle_dispatch(state: AppState, mode: &'static str) -> Response {
    state.stats.dispatches.fetch_add(1, Ordering::Relaxed);
    if let Some(res) = state.injected(FailPoint::Dispatch) {
        return res;
    }

    let mut run = state.run();
    run.run_id += 1;
    run.mode = Some(mode);
    run.items = run.pending;
    run.started_at = Some(Instant::now());
    run.started_at_ms = Some(epoch_ms());
    Json(json!({ "mode": mode, "dispatched": run.items })).into_response()
}

async fn handle_report(State(state): State<AppState>) -> Response {
    state.stats.reports.fetch_add(1, Ordering::Relaxed);
    if let Some(res) = state.injected(FailPoint::Report) {
        return res;
    }

    let opts = &state.options;
    let mut run = state.run();
    run.advance(opts.drain_per_report);

    let run_done = run.is_drained();
    let finished = run_done && run.mode.is_some();
    let errors = if finished { opts.errors_per_run } else { 0 };
    let retries = if finished { opts.retries_per_run } else { 0 };
    let drain_ms = run.drain_time_ms.unwrap_or(0);
    let jobs_per_minute = if drain_ms > 0 {
        run.done as f64 * 60_000.0 / drain_ms as f64
    } else {
        0.0
    };

    let report = Report {
        pending: run.pending,
        processing: run.processing,
        done: run.done,
        error: errors,
        retry_scheduled: 0,
        total_processed: run.done,
        total_success: run.done.saturating_sub(errors),
        total_errors: errors,
        total_retry_scheduled: retries,
        total_stuck_recovered: 0,
        avg_processing_ms: if run.done > 0 { 5 } else { 0 },
        total_elapsed_ms: drain_ms,
        jobs_per_minute,
        run_id: run.mode.map(|_| format!("run-{}", run.run_id)),
        scenario: "default",
        mode: run.mode,
        items: run.items,
        started_at_ms: run.started_at_ms,
        finished_at_ms: run.finished_at_ms,
        drain_time_ms: run.drain_time_ms,
        success_count: run.done.saturating_sub(errors),
        fail_count: errors,
        retry_count: retries,
        run_done,
    };
    Json(report).into_response()
}

async fn handle_metric(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    state.stats.metric_fetches.fetch_add(1, Ordering::Relaxed);
    if !state.options.heap_metrics {
        return StatusCode::NOT_FOUND.into_response();
    }

    let in_memory = {
        let run = state.run();
        run.pending + run.processing
    };
    let used = BASE_HEAP_BYTES + in_memory as f64 * HEAP_BYTES_PER_JOB;

    let value = match name.as_str() {
        "jvm.memory.used" => used,
        "jvm.memory.committed" => (used * 1.5).min(MAX_HEAP_BYTES),
        "jvm.memory.max" => MAX_HEAP_BYTES,
        _ => return StatusCode::NOT_FOUND.into_response(),
    };

    let body: Value = json!({
        "name": name,
        "baseUnit": "bytes",
        "measurements": [{ "statistic": "VALUE", "value": value }],
    });
    Json(body).into_response()
}

pub fn router(options: LabServerOptions, stats: LabServerStats) -> Router {
    let state = AppState {
        options: Arc::new(options),
        stats,
        run: Arc::new(Mutex::new(RunState::default())),
    };

    let mut router = Router::new()
        .route(PATH_RESET, post(handle_reset))
        .route(PATH_SEED, post(handle_seed))
        .route(PATH_REPORT, get(handle_report))
        .route(PATH_METRIC, get(handle_metric));

    for (path, mode) in DISPATCH_PATHS {
        router = router.route(
            path,
            post(move |State(state): State<AppState>| handle_dispatch(state, mode)),
        );
    }

    router.with_state(state)
}

pub struct LabServer {
    addr: SocketAddr,
    base_url: String,
    stats: LabServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl LabServer {
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with(LabServerOptions::default()).await
    }

    pub async fn start_with(options: LabServerOptions) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = LabServerStats::default();
        let app = router(options, stats.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        Ok(Self {
            addr,
            base_url: format!("http://{addr}"),
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn stats(&self) -> &LabServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for LabServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
