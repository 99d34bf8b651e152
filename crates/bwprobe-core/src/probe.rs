//! Per-target fan-out for one collection cycle.
//!
//! Architecture:
//! 1. Parse and validate every configured target up front
//! 2. Spawn one task per target: build args, run the tool, parse the report
//! 3. Join every task before the cycle returns
//! 4. Emit exactly one record per target, success or not
//! 5. Report failures on the error channel with their full kind
//!
//! Targets share nothing but the read-only configuration, so a slow or
//! failing target never affects the others.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::args::{ArgumentMode, build_args};
use crate::config::{Method, ProbeConfig};
use crate::error::{ConfigError, ProbeError};
use crate::report::{SenderMetrics, parse_report};
use crate::runner::{ExecRunner, Runner};
use crate::sink::{Accumulator, FieldValue, Fields, Tags};
use crate::target::Target;

/// Measurement name every record is emitted under.
pub const MEASUREMENT: &str = "iperf";
/// Extra time a run gets on top of `time_interval` before it is killed.
pub const TIMEOUT_GRACE: Duration = Duration::from_secs(5);

/// `result_code` of a successful probe.
pub const RESULT_OK: i64 = 0;
/// `result_code` of any failed probe, whatever the cause.
pub const RESULT_FAILED: i64 = 2;

/// Outcome of probing one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    pub address: String,
    pub result_code: i64,
    /// Present only on success.
    pub metrics: Option<SenderMetrics>,
}

impl ProbeResult {
    pub fn success(address: &str, metrics: SenderMetrics) -> Self {
        Self {
            address: address.to_string(),
            result_code: RESULT_OK,
            metrics: Some(metrics),
        }
    }

    pub fn failure(address: &str) -> Self {
        Self {
            address: address.to_string(),
            result_code: RESULT_FAILED,
            metrics: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result_code == RESULT_OK
    }

    pub fn tags(&self) -> Tags {
        Tags::from([("address".to_string(), self.address.clone())])
    }

    /// `result_code` plus, on success, the seven sender metrics.
    pub fn fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("result_code".to_string(), FieldValue::Int(self.result_code));
        if let Some(m) = &self.metrics {
            for (key, value) in m.to_pairs() {
                fields.insert(key.to_string(), FieldValue::Float(value));
            }
        }
        fields
    }
}

/// Counts for one finished cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleSummary {
    pub targets: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
}

/// Collection-cycle coordinator.
pub struct Probe<R: Runner = ExecRunner> {
    config: Arc<ProbeConfig>,
    mode: Arc<ArgumentMode>,
    targets: Vec<Target>,
    runner: Arc<R>,
}

impl Probe<ExecRunner> {
    /// Coordinator running the real binary.
    pub fn new(config: ProbeConfig) -> Result<Self, ConfigError> {
        Self::with_runner(config, ExecRunner)
    }
}

impl<R: Runner> Probe<R> {
    /// Coordinator with a custom runner.
    pub fn with_runner(config: ProbeConfig, runner: R) -> Result<Self, ConfigError> {
        config.validate()?;
        let targets = config.targets()?;
        Ok(Self {
            mode: Arc::new(config.argument_mode()),
            config: Arc::new(config),
            targets,
            runner: Arc::new(runner),
        })
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Argument list each target would be probed with.
    pub fn planned_args(&self) -> Vec<(&Target, Vec<String>)> {
        self.targets
            .iter()
            .map(|t| (t, build_args(t, &self.mode)))
            .collect()
    }

    /// Per-invocation timeout: `time_interval` plus [`TIMEOUT_GRACE`].
    pub fn timeout(&self) -> Duration {
        timeout_for(&self.config)
    }

    /// Run one collection cycle.
    ///
    /// Probes every target concurrently and returns once all of them have
    /// finished. Each target yields exactly one record on `acc`; failures are
    /// additionally reported through [`Accumulator::add_error`].
    pub async fn gather<A>(&self, acc: &mut A) -> CycleSummary
    where
        A: Accumulator + ?Sized,
    {
        let t0 = Instant::now();

        let handles: Vec<_> = self
            .targets
            .iter()
            .map(|target| {
                let config = Arc::clone(&self.config);
                let mode = Arc::clone(&self.mode);
                let runner = Arc::clone(&self.runner);
                let owned = target.clone();
                let handle = tokio::spawn(async move {
                    probe_target(runner.as_ref(), &config, &mode, &owned).await
                });
                (target, handle)
            })
            .collect();

        let mut summary = CycleSummary {
            targets: handles.len(),
            succeeded: 0,
            failed: 0,
            elapsed_ms: 0,
        };

        for (target, handle) in handles {
            let outcome = handle.await.unwrap_or_else(|e| {
                Err(ProbeError::Task {
                    address: target.address().to_string(),
                    message: e.to_string(),
                })
            });
            let result = match outcome {
                Ok(metrics) => {
                    summary.succeeded += 1;
                    ProbeResult::success(target.address(), metrics)
                }
                Err(err) => {
                    summary.failed += 1;
                    log::warn!("{err}");
                    acc.add_error(err);
                    ProbeResult::failure(target.address())
                }
            };
            acc.add_fields(MEASUREMENT, result.fields(), result.tags());
        }

        summary.elapsed_ms = t0.elapsed().as_millis() as u64;
        log::info!(
            "cycle finished: {} target(s), {} ok, {} failed in {:.2}s",
            summary.targets,
            summary.succeeded,
            summary.failed,
            summary.elapsed_ms as f64 / 1000.0
        );
        summary
    }
}

fn timeout_for(config: &ProbeConfig) -> Duration {
    Duration::from_secs(config.time_interval).saturating_add(TIMEOUT_GRACE)
}

/// Probe a single target: build arguments, run the tool, parse its report.
pub async fn probe_target<R: Runner>(
    runner: &R,
    config: &ProbeConfig,
    mode: &ArgumentMode,
    target: &Target,
) -> Result<SenderMetrics, ProbeError> {
    if config.method == Method::Native {
        return Err(ProbeError::Unsupported {
            address: target.address().to_string(),
            method: config.method.to_string(),
        });
    }

    let t0 = Instant::now();
    let args = build_args(target, mode);
    let output = runner
        .run(&config.binary, &args, timeout_for(config))
        .await
        .map_err(|source| ProbeError::Invocation {
            address: target.address().to_string(),
            source,
        })?;

    let metrics = parse_report(&output).map_err(|source| ProbeError::Report {
        address: target.address().to_string(),
        source,
    })?;
    log::debug!(
        "{}: {:.0} bit/s, {} retransmits in {:.2}s",
        target,
        metrics.bits_per_second,
        metrics.retransmits,
        t0.elapsed().as_secs_f64()
    );
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::error::{InvocationError, ReportError};
    use crate::sink::MemoryAccumulator;

    const GOOD_REPORT: &str = r#"{"end": {"streams": [{"sender": {
        "bytes": 100, "retransmits": 2, "bits_per_second": 5000000.0,
        "max_snd_cwnd": 4096, "max_rtt": 20000, "min_rtt": 5000, "mean_rtt": 10000
    }}]}}"#;

    /// Canned outcome per host, recording every call.
    #[derive(Default)]
    struct FakeRunner {
        outputs: HashMap<String, Result<String, String>>,
        delays: HashMap<String, Duration>,
        calls: Mutex<Vec<(String, Vec<String>, Duration)>>,
    }

    impl FakeRunner {
        fn ok(mut self, host: &str, out: &str) -> Self {
            self.outputs.insert(host.into(), Ok(out.into()));
            self
        }

        fn not_found(mut self, host: &str) -> Self {
            self.outputs.insert(host.into(), Err(host.into()));
            self
        }

        fn delayed(mut self, host: &str, d: Duration) -> Self {
            self.delays.insert(host.into(), d);
            self
        }
    }

    impl Runner for FakeRunner {
        async fn run(
            &self,
            binary: &str,
            args: &[String],
            timeout: Duration,
        ) -> Result<String, InvocationError> {
            self.calls
                .lock()
                .unwrap()
                .push((binary.to_string(), args.to_vec(), timeout));
            // Host follows "-c" in structured mode, or is the last token.
            let host = args
                .iter()
                .position(|a| a == "-c")
                .and_then(|i| args.get(i + 1))
                .or(args.last())
                .cloned()
                .unwrap_or_default();
            if let Some(d) = self.delays.get(&host) {
                tokio::time::sleep(*d).await;
            }
            match self.outputs.get(&host) {
                Some(Ok(out)) => Ok(out.clone()),
                Some(Err(_)) | None => Err(InvocationError::NotFound(binary.to_string())),
            }
        }
    }

    fn config(addrs: &[&str]) -> ProbeConfig {
        ProbeConfig {
            server_addrs: addrs.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_probe_result_fields() {
        let ok = ProbeResult::success(
            "a",
            SenderMetrics {
                bytes_sent: 100.0,
                retransmits: 2.0,
                bits_per_second: 5e6,
                max_snd_cwnd: 4096.0,
                max_rtt: 20.0,
                min_rtt: 5.0,
                mean_rtt: 10.0,
            },
        );
        let fields = ok.fields();
        assert_eq!(fields.len(), 8);
        assert_eq!(fields["result_code"], FieldValue::Int(0));
        assert_eq!(fields["max_rtt"], FieldValue::Float(20.0));

        let failed = ProbeResult::failure("a");
        assert_eq!(
            failed.fields(),
            Fields::from([("result_code".to_string(), FieldValue::Int(2))])
        );
        assert_eq!(failed.tags()["address"], "a");
    }

    #[test]
    fn test_construction_rejects_invalid_config() {
        assert!(Probe::new(ProbeConfig::default()).is_err());
        assert!(Probe::new(config(&["host:notaport"])).is_err());
    }

    #[test]
    fn test_timeout_is_interval_plus_grace() {
        let mut c = config(&["a"]);
        c.time_interval = 7;
        let probe = Probe::new(c).unwrap();
        assert_eq!(probe.timeout(), Duration::from_secs(12));
    }

    #[test]
    fn test_timeout_saturates_instead_of_overflowing() {
        let mut c = config(&["a"]);
        c.time_interval = u64::MAX;
        assert_eq!(timeout_for(&c), Duration::MAX);
        assert!(Probe::new(c).is_err());
    }

    #[test]
    fn test_planned_args_cover_every_target() {
        let probe = Probe::new(config(&["a", "b:9000"])).unwrap();
        let planned = probe.planned_args();
        assert_eq!(planned.len(), 2);
        assert_eq!(planned[1].1[..2], ["-p", "9000"]);
    }

    #[tokio::test]
    async fn test_successful_target_emits_all_metrics() {
        let runner = FakeRunner::default().ok("10.0.0.1", GOOD_REPORT);
        let probe = Probe::with_runner(config(&["10.0.0.1"]), runner).unwrap();
        let mut acc = MemoryAccumulator::new();
        let summary = probe.gather(&mut acc).await;

        assert_eq!(summary.succeeded, 1);
        assert!(acc.errors.is_empty());
        let r = acc.record_for("10.0.0.1").unwrap();
        assert_eq!(r.measurement, "iperf");
        assert_eq!(r.field("result_code"), Some(FieldValue::Int(0)));
        assert_eq!(r.field("bytes_sent"), Some(FieldValue::Float(100.0)));
        assert_eq!(r.field("mean_rtt"), Some(FieldValue::Float(10.0)));
        assert_eq!(r.fields.len(), 8);
    }

    #[tokio::test]
    async fn test_mixed_outcomes_emit_one_record_per_target() {
        let runner = FakeRunner::default()
            .ok("ok1", GOOD_REPORT)
            .ok("ok2", GOOD_REPORT)
            .not_found("bad1")
            .ok("garbled", "iperf3: parameter error")
            .ok("noend", r#"{"start": {}}"#);
        let addrs = ["ok1", "bad1", "ok2", "garbled", "noend", "unknown:7000"];
        let probe = Probe::with_runner(config(&addrs), runner).unwrap();
        let mut acc = MemoryAccumulator::new();
        let summary = probe.gather(&mut acc).await;

        assert_eq!(acc.records.len(), addrs.len());
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 4);
        for addr in addrs {
            let r = acc
                .record_for(addr)
                .unwrap_or_else(|| panic!("no record for {addr}"));
            let ok = addr.starts_with("ok");
            let expected_code = if ok { RESULT_OK } else { RESULT_FAILED };
            assert_eq!(r.field("result_code"), Some(FieldValue::Int(expected_code)));
            assert_eq!(r.fields.len(), if ok { 8 } else { 1 });
            assert_eq!(acc.errors_for(addr).count(), usize::from(!ok));
        }

        let kinds: Vec<&str> = ["bad1", "garbled", "noend"]
            .iter()
            .map(|a| acc.errors_for(a).next().unwrap().kind())
            .collect();
        assert_eq!(kinds, ["not_found", "format", "missing_data"]);
    }

    #[tokio::test]
    async fn test_targets_run_concurrently() {
        let delay = Duration::from_millis(300);
        let mut runner = FakeRunner::default();
        let addrs = ["a", "b", "c", "d", "e"];
        for a in addrs {
            runner = runner.ok(a, GOOD_REPORT).delayed(a, delay);
        }
        let probe = Probe::with_runner(config(&addrs), runner).unwrap();
        let mut acc = MemoryAccumulator::new();
        let t0 = Instant::now();
        probe.gather(&mut acc).await;
        let elapsed = t0.elapsed();

        assert_eq!(acc.records.len(), 5);
        // Serial execution would take 5 x 300ms.
        assert!(elapsed < delay * 3, "took {elapsed:?}");
        assert!(elapsed >= delay);
    }

    #[tokio::test]
    async fn test_gather_waits_for_slowest_target() {
        let runner = FakeRunner::default()
            .ok("fast", GOOD_REPORT)
            .ok("slow", GOOD_REPORT)
            .delayed("slow", Duration::from_millis(200));
        let probe = Probe::with_runner(config(&["slow", "fast"]), runner).unwrap();
        let mut acc = MemoryAccumulator::new();
        probe.gather(&mut acc).await;
        assert!(acc.record_for("slow").is_some());
        assert!(acc.record_for("fast").is_some());
    }

    #[tokio::test]
    async fn test_override_mode_passes_raw_arguments() {
        let runner = FakeRunner::default().ok("srv:9000", GOOD_REPORT);
        let mut c = config(&["srv:9000"]);
        c.arguments = vec!["-R".into(), "-t".into(), "3".into()];
        c.bytes = Some("1M".into());
        c.binary = "/usr/local/bin/iperf3".into();
        let probe = Probe::with_runner(c, runner).unwrap();
        let mut acc = MemoryAccumulator::new();
        probe.gather(&mut acc).await;
        assert_eq!(
            acc.record_for("srv:9000").unwrap().field("result_code"),
            Some(FieldValue::Int(RESULT_OK))
        );

        let calls = probe.runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (binary, args, timeout) = &calls[0];
        assert_eq!(binary, "/usr/local/bin/iperf3");
        assert_eq!(args, &["-R", "-t", "3", "srv:9000"]);
        assert_eq!(*timeout, Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_native_method_fails_every_target_explicitly() {
        let runner = FakeRunner::default().ok("a", GOOD_REPORT);
        let mut c = config(&["a", "b"]);
        c.method = Method::Native;
        let probe = Probe::with_runner(c, runner).unwrap();
        let mut acc = MemoryAccumulator::new();
        let summary = probe.gather(&mut acc).await;

        assert_eq!(summary.failed, 2);
        assert_eq!(acc.records.len(), 2);
        assert!(acc.errors.iter().all(|e| e.kind() == "unsupported"));
        assert!(probe.runner.calls.lock().unwrap().is_empty());
    }

    struct PanickingRunner;

    impl Runner for PanickingRunner {
        async fn run(
            &self,
            _binary: &str,
            args: &[String],
            _timeout: Duration,
        ) -> Result<String, InvocationError> {
            if args.iter().any(|a| a == "boom") {
                panic!("runner exploded");
            }
            Ok(GOOD_REPORT.to_string())
        }
    }

    #[tokio::test]
    async fn test_panicking_task_still_yields_a_record() {
        let probe = Probe::with_runner(config(&["boom", "fine"]), PanickingRunner).unwrap();
        let mut acc = MemoryAccumulator::new();
        probe.gather(&mut acc).await;

        assert_eq!(acc.records.len(), 2);
        assert_eq!(
            acc.record_for("boom").unwrap().field("result_code"),
            Some(FieldValue::Int(RESULT_FAILED))
        );
        assert_eq!(acc.errors_for("boom").next().unwrap().kind(), "task");
        assert_eq!(
            acc.record_for("fine").unwrap().field("result_code"),
            Some(FieldValue::Int(RESULT_OK))
        );
    }

    #[tokio::test]
    async fn test_probe_target_classifies_parse_failures() {
        let runner = FakeRunner::default().ok("h", "{}");
        let c = config(&["h"]);
        let err = probe_target(&runner, &c, &c.argument_mode(), &Target::parse("h").unwrap())
            .await
            .unwrap_err();
        match err {
            ProbeError::Report { address, source } => {
                assert_eq!(address, "h");
                assert_eq!(source, ReportError::MissingData("end".into()));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
