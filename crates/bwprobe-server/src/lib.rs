//! HTTP exporter for bwprobe.
//!
//! Runs a collection cycle in the background every `every` and serves the
//! latest results: per-target records as JSON and the whole cycle in
//! InfluxDB line protocol for scrapers.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Json},
    routing::get,
};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;

use bwprobe_core::format::to_line_protocol;
use bwprobe_core::{CycleSummary, ErrorEntry, Fields, MemoryAccumulator, Probe, Record, Runner};

/// Results of the most recent finished cycle.
#[derive(Debug, Default)]
struct Snapshot {
    cycles: u64,
    summary: Option<CycleSummary>,
    records: Vec<Record>,
    errors: Vec<ErrorEntry>,
}

/// Shared server state.
struct AppState {
    snapshot: Mutex<Snapshot>,
    targets: Vec<String>,
    every: Duration,
}

impl AppState {
    fn new<R: Runner>(probe: &Probe<R>, every: Duration) -> Self {
        Self {
            snapshot: Mutex::new(Snapshot::default()),
            targets: probe
                .targets()
                .iter()
                .map(|t| t.address().to_string())
                .collect(),
            every,
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    cycles: u64,
    targets: usize,
    succeeded: usize,
    failed: usize,
    last_cycle_ms: Option<u64>,
}

#[derive(Serialize)]
struct TargetsResponse {
    targets: Vec<TargetEntry>,
    total: usize,
}

#[derive(Serialize)]
struct TargetEntry {
    address: String,
    result_code: Option<i64>,
    fields: Fields,
    timestamp_unix_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorEntry>,
}

/// Run one cycle and replace the snapshot with its results.
async fn collect_once<R: Runner>(probe: &Probe<R>, state: &AppState) {
    let mut acc = MemoryAccumulator::new();
    let summary = probe.gather(&mut acc).await;
    let errors = acc.error_entries();

    let mut snapshot = state.snapshot.lock().await;
    snapshot.cycles += 1;
    snapshot.summary = Some(summary);
    snapshot.records = acc.records;
    snapshot.errors = errors;
}

async fn collect_loop<R: Runner>(probe: Arc<Probe<R>>, state: Arc<AppState>) {
    let mut ticker = tokio::time::interval(state.every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        collect_once(&probe, &state).await;
    }
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let snapshot = state.snapshot.lock().await;
    let (status, succeeded, failed, elapsed) = match &snapshot.summary {
        None => ("starting", 0, 0, None),
        Some(s) if s.failed == 0 => ("healthy", s.succeeded, s.failed, Some(s.elapsed_ms)),
        Some(s) => ("degraded", s.succeeded, s.failed, Some(s.elapsed_ms)),
    };
    Json(HealthResponse {
        status,
        cycles: snapshot.cycles,
        targets: state.targets.len(),
        succeeded,
        failed,
        last_cycle_ms: elapsed,
    })
}

async fn handle_targets(State(state): State<Arc<AppState>>) -> Json<TargetsResponse> {
    let snapshot = state.snapshot.lock().await;
    let targets: Vec<TargetEntry> = state
        .targets
        .iter()
        .map(|address| {
            let record = snapshot
                .records
                .iter()
                .find(|r| r.tag("address") == Some(address.as_str()));
            TargetEntry {
                address: address.clone(),
                result_code: record
                    .and_then(|r| r.field("result_code"))
                    .map(|v| v.as_f64() as i64),
                fields: record.map(|r| r.fields.clone()).unwrap_or_default(),
                timestamp_unix_ms: record.map(|r| r.timestamp_unix_ms),
                error: snapshot
                    .errors
                    .iter()
                    .find(|e| &e.address == address)
                    .cloned(),
            }
        })
        .collect();
    let total = targets.len();
    Json(TargetsResponse { targets, total })
}

async fn handle_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.snapshot.lock().await;
    let mut body = String::new();
    for record in &snapshot.records {
        body.push_str(&to_line_protocol(record));
        body.push('\n');
    }
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
}

async fn handle_index(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "bwprobe exporter",
        "version": bwprobe_core::VERSION,
        "targets": state.targets,
        "interval_secs": state.every.as_secs_f64(),
        "endpoints": {
            "/": "This API index",
            "/health": "Outcome counts of the last cycle",
            "/targets": "Last record per target, with its error if the probe failed",
            "/metrics": "Last cycle in InfluxDB line protocol",
        },
    }))
}

/// Build the axum router.
fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/health", get(handle_health))
        .route("/targets", get(handle_targets))
        .route("/metrics", get(handle_metrics))
        .with_state(state)
}

/// Run the exporter: probe every `every` in the background and serve the
/// latest cycle on `host:port`.
pub async fn run_server<R: Runner>(
    probe: Probe<R>,
    host: &str,
    port: u16,
    every: Duration,
) -> std::io::Result<()> {
    let state = Arc::new(AppState::new(&probe, every));
    tokio::spawn(collect_loop(Arc::new(probe), Arc::clone(&state)));

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("serving on http://{addr}");
    axum::serve(listener, build_router(state)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use bwprobe_core::{FieldValue, InvocationError, ProbeConfig};

    const GOOD_REPORT: &str = r#"{"end": {"streams": [{"sender": {
        "bytes": 100, "retransmits": 2, "bits_per_second": 5000000.0,
        "max_snd_cwnd": 4096, "max_rtt": 20000, "min_rtt": 5000, "mean_rtt": 10000
    }}]}}"#;

    /// Succeeds for host "up", fails for anything else.
    struct UpDownRunner;

    impl Runner for UpDownRunner {
        async fn run(
            &self,
            binary: &str,
            args: &[String],
            _timeout: Duration,
        ) -> Result<String, InvocationError> {
            if args.iter().any(|a| a == "up") {
                Ok(GOOD_REPORT.to_string())
            } else {
                Err(InvocationError::NotFound(binary.to_string()))
            }
        }
    }

    fn state_for(addrs: &[&str]) -> (Probe<UpDownRunner>, Arc<AppState>) {
        let config = ProbeConfig {
            server_addrs: addrs.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        let probe = Probe::with_runner(config, UpDownRunner).unwrap();
        let state = Arc::new(AppState::new(&probe, Duration::from_secs(60)));
        (probe, state)
    }

    #[tokio::test]
    async fn test_health_before_first_cycle() {
        let (_probe, state) = state_for(&["up"]);
        let Json(health) = handle_health(State(state)).await;
        assert_eq!(health.status, "starting");
        assert_eq!(health.cycles, 0);
        assert_eq!(health.targets, 1);
    }

    #[tokio::test]
    async fn test_health_reflects_last_cycle() {
        let (probe, state) = state_for(&["up", "down"]);
        collect_once(&probe, &state).await;
        let Json(health) = handle_health(State(Arc::clone(&state))).await;
        assert_eq!(health.status, "degraded");
        assert_eq!(health.cycles, 1);
        assert_eq!(health.succeeded, 1);
        assert_eq!(health.failed, 1);

        let (probe, state) = state_for(&["up"]);
        collect_once(&probe, &state).await;
        let Json(health) = handle_health(State(state)).await;
        assert_eq!(health.status, "healthy");
    }

    #[tokio::test]
    async fn test_targets_pair_records_with_errors() {
        let (probe, state) = state_for(&["up", "down:9000"]);
        collect_once(&probe, &state).await;
        let Json(resp) = handle_targets(State(state)).await;

        assert_eq!(resp.total, 2);
        let up = &resp.targets[0];
        assert_eq!(up.address, "up");
        assert_eq!(up.result_code, Some(0));
        assert_eq!(up.fields["max_rtt"], FieldValue::Float(20.0));
        assert!(up.error.is_none());

        let down = &resp.targets[1];
        assert_eq!(down.address, "down:9000");
        assert_eq!(down.result_code, Some(2));
        assert_eq!(down.fields.len(), 1);
        let error = down.error.as_ref().unwrap();
        assert_eq!(error.kind, "not_found");
    }

    #[tokio::test]
    async fn test_targets_without_a_cycle_have_no_result() {
        let (_probe, state) = state_for(&["up"]);
        let Json(resp) = handle_targets(State(state)).await;
        assert_eq!(resp.targets[0].result_code, None);
        assert!(resp.targets[0].fields.is_empty());
    }

    #[tokio::test]
    async fn test_metrics_are_line_protocol() {
        let (probe, state) = state_for(&["up", "down"]);
        collect_once(&probe, &state).await;
        let response = handle_metrics(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("iperf,address=up "));
        assert!(lines[0].contains("result_code=0i"));
        assert!(lines[1].starts_with("iperf,address=down result_code=2i "));
    }

    #[tokio::test]
    async fn test_index_lists_endpoints() {
        let (_probe, state) = state_for(&["up"]);
        let Json(index) = handle_index(State(state)).await;
        assert_eq!(index["targets"][0], "up");
        assert!(index["endpoints"]["/metrics"].is_string());
    }
}
