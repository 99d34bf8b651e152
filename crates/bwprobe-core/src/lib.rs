//! # bwprobe-core
//!
//! **Bandwidth probing for a fleet of iperf3 servers.**
//!
//! `bwprobe-core` runs the `iperf3` client once per configured server,
//! parses its JSON report and hands one normalized record per server to an
//! [`Accumulator`]: throughput, retransmits, congestion window and RTT
//! statistics, tagged with the server address.
//!
//! ## Quick Start
//!
//! ```no_run
//! use bwprobe_core::{MemoryAccumulator, Probe, ProbeConfig};
//!
//! # async fn run() -> Result<(), bwprobe_core::ConfigError> {
//! let config = ProbeConfig {
//!     server_addrs: vec!["34.93.220.137:80".into(), "10.0.0.7".into()],
//!     time_interval: 5,
//!     ..Default::default()
//! };
//! let probe = Probe::new(config)?;
//!
//! let mut acc = MemoryAccumulator::new();
//! let summary = probe.gather(&mut acc).await;
//! println!("{}/{} targets ok", summary.succeeded, summary.targets);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! Config → per target: Args → Runner → Report → Accumulator
//!
//! - [`args`] turns a target and the configuration into an argument list.
//!   Raw `arguments` replace the structured options entirely.
//! - [`runner`] executes the binary with a timeout of `time_interval + 5s`.
//! - [`report`] reads `end.streams[0].sender` and converts RTTs to ms.
//! - [`probe`] runs every target in its own task and joins them all.
//!
//! Every target yields exactly one record per cycle. Failed targets carry
//! `result_code = 2` and no metrics; the detailed error goes to
//! [`Accumulator::add_error`].

pub mod args;
pub mod config;
pub mod error;
pub mod format;
pub mod probe;
pub mod report;
pub mod runner;
pub mod sink;
pub mod target;

pub use args::{ArgumentMode, StructuredOptions, build_args};
pub use config::{
    DEFAULT_BINARY, DEFAULT_TIME_INTERVAL, MAX_TIME_INTERVAL, Method, ProbeConfig, Protocol,
    SAMPLE_CONFIG,
};
pub use error::{ConfigError, InvocationError, ProbeError, ReportError};
pub use probe::{
    CycleSummary, MEASUREMENT, Probe, ProbeResult, RESULT_FAILED, RESULT_OK, TIMEOUT_GRACE,
    probe_target,
};
pub use report::{METRIC_KEYS, SenderMetrics, parse_report};
pub use runner::{ExecRunner, Runner, resolve_binary};
pub use sink::{Accumulator, ErrorEntry, FieldValue, Fields, MemoryAccumulator, Record, Tags};
pub use target::{DEFAULT_PORT, Target};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
