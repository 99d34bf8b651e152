//! Error taxonomy for a probe cycle.
//!
//! Two kinds of failure can happen for a target: the tool could not be run
//! to completion ([`InvocationError`]) or its report could not be turned
//! into metrics ([`ReportError`]). Both are wrapped in a per-target
//! [`ProbeError`] before reaching the accumulator's error channel.

use std::time::Duration;

use thiserror::Error;

/// Failure to run the measurement binary to a successful exit.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("executable '{0}' not found in PATH")]
    NotFound(String),
    #[error("failed to start '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{binary}' exited with {status}{}", .detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
    Exited {
        binary: String,
        status: String,
        /// Error message the tool put in its own report, when it printed one.
        detail: Option<String>,
    },
    #[error("'{binary}' timed out after {}s", .timeout.as_secs_f64())]
    TimedOut { binary: String, timeout: Duration },
    #[error("i/o error while waiting for '{binary}': {source}")]
    Io {
        binary: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failure to turn a captured report into metrics.
#[derive(Debug, Error, PartialEq)]
pub enum ReportError {
    /// The text is not a JSON object, or a field has the wrong type.
    #[error("malformed report: {0}")]
    Format(String),
    /// A section or field the metrics are read from is absent.
    #[error("could not find '{0}' in the report")]
    MissingData(String),
}

/// A per-target failure, as reported on the error channel.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("host {address}: {source}")]
    Invocation {
        address: String,
        #[source]
        source: InvocationError,
    },
    #[error("{source}: {address}")]
    Report {
        address: String,
        #[source]
        source: ReportError,
    },
    #[error("host {address}: {method} method not implemented")]
    Unsupported { address: String, method: String },
    #[error("host {address}: probe task failed: {message}")]
    Task { address: String, message: String },
}

impl ProbeError {
    /// The target address this error belongs to.
    pub fn address(&self) -> &str {
        match self {
            Self::Invocation { address, .. }
            | Self::Report { address, .. }
            | Self::Unsupported { address, .. }
            | Self::Task { address, .. } => address,
        }
    }

    /// Short machine-friendly label for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Invocation { source, .. } => match source {
                InvocationError::NotFound(_) => "not_found",
                InvocationError::Spawn { .. } => "spawn",
                InvocationError::Exited { .. } => "exit_status",
                InvocationError::TimedOut { .. } => "timeout",
                InvocationError::Io { .. } => "io",
            },
            Self::Report { source, .. } => match source {
                ReportError::Format(_) => "format",
                ReportError::MissingData(_) => "missing_data",
            },
            Self::Unsupported { .. } => "unsupported",
            Self::Task { .. } => "task",
        }
    }
}

/// Invalid configuration, detected before any probe runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no server addresses configured")]
    NoTargets,
    #[error("invalid target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },
    #[error("time_interval must be at least 1 second")]
    ZeroInterval,
    #[error("time_interval {value}s exceeds the maximum of {max}s")]
    IntervalTooLong { value: u64, max: u64 },
    #[error("unknown protocol '{0}' (expected tcp, udp or sctp)")]
    UnknownProtocol(String),
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },
}
