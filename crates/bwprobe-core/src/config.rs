//! Probe configuration: what to measure, against which servers, and how.
//!
//! The on-disk surface uses the same keys as the sample configuration
//! ([`SAMPLE_CONFIG`]); `bind-dev` keeps its dash. Files ending in `.json`
//! are read as JSON, everything else as TOML.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::args::{ArgumentMode, StructuredOptions};
use crate::error::ConfigError;
use crate::target::Target;

/// Default measurement duration in seconds (`iperf3 --time`).
pub const DEFAULT_TIME_INTERVAL: u64 = 10;
/// Longest accepted measurement duration in seconds (iperf3's own cap).
pub const MAX_TIME_INTERVAL: u64 = 86_400;
/// Default measurement binary, resolved through `PATH`.
pub const DEFAULT_BINARY: &str = "iperf3";

/// Commented sample configuration.
pub const SAMPLE_CONFIG: &str = r#"## Server addresses to connect to (host or host:port, default port 5201)
server_addrs = ["34.93.220.137:80"]

## How to run the measurement; only "exec" is implemented
# method = "exec"

## Time interval in seconds for which iperf3 should run
time_interval = 10

## Target bandwidth in bits/sec (default 1 Mbit/sec for UDP, unlimited for TCP)
# bandwidth = "1M"

## Number of bytes to transmit (used instead of time_interval when set)
# bytes = "1M"

## Transport protocol: tcp (default), udp or sctp
# protocol = "udp"

## Measurement executable, looked up in PATH
# binary = "iperf3"

## Bind to a specific local address
# bind = "192.168.0.105"

## Bind to a specific device (requires a recent iperf3)
# bind-dev = "eth0"

## Raw arguments for iperf3. When not empty, these are passed as-is with the
## server address appended, and every other option above is ignored.
# arguments = ["-c", "3"]
"#;

/// Transport protocol passed to the measurement tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Protocol {
    /// The tool's default; no flag is emitted.
    #[default]
    Tcp,
    Udp,
    Sctp,
}

impl FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "sctp" => Ok(Self::Sctp),
            _ => Err(ConfigError::UnknownProtocol(s.to_string())),
        }
    }
}

impl TryFrom<String> for Protocol {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Protocol> for String {
    fn from(p: Protocol) -> Self {
        p.to_string()
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
            Self::Sctp => write!(f, "sctp"),
        }
    }
}

/// How a measurement is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Run the external binary.
    #[default]
    Exec,
    /// In-process measurement. Not implemented: every target fails with an
    /// `Unsupported` error.
    Native,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exec => write!(f, "exec"),
            Self::Native => write!(f, "native"),
        }
    }
}

/// Immutable configuration for a collection cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProbeConfig {
    /// Measurement duration in seconds; also sets the process timeout.
    pub time_interval: u64,
    /// Byte count to transmit, e.g. `"1M"`. Takes priority over `time_interval`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<String>,
    pub server_addrs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
    #[serde(rename = "bind-dev", skip_serializing_if = "Option::is_none")]
    pub bind_dev: Option<String>,
    pub protocol: Protocol,
    pub method: Method,
    pub binary: String,
    /// Raw argument override. Non-empty means every structured option is ignored.
    pub arguments: Vec<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            time_interval: DEFAULT_TIME_INTERVAL,
            bytes: None,
            bandwidth: None,
            server_addrs: Vec::new(),
            bind: None,
            bind_dev: None,
            protocol: Protocol::Tcp,
            method: Method::Exec,
            binary: DEFAULT_BINARY.to_string(),
            arguments: Vec::new(),
        }
    }
}

impl ProbeConfig {
    /// Load a configuration file. `.json` files are parsed as JSON, anything
    /// else as TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let parsed = if is_json {
            serde_json::from_str(&text).map_err(|e| e.to_string())
        } else {
            toml::from_str(&text).map_err(|e| e.to_string())
        };
        parsed.map_err(|message| ConfigError::Parse {
            path: display,
            message,
        })
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })
    }

    /// Parse every configured server address.
    pub fn targets(&self) -> Result<Vec<Target>, ConfigError> {
        self.server_addrs.iter().map(|a| Target::parse(a)).collect()
    }

    /// Check the configuration can drive a collection cycle.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_addrs.is_empty() {
            return Err(ConfigError::NoTargets);
        }
        if self.time_interval == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.time_interval > MAX_TIME_INTERVAL {
            return Err(ConfigError::IntervalTooLong {
                value: self.time_interval,
                max: MAX_TIME_INTERVAL,
            });
        }
        self.targets()?;
        if self.method == Method::Native {
            log::warn!("method \"native\" is not implemented; every target will report a failure");
        }
        if !self.arguments.is_empty() && self.has_structured_options() {
            log::warn!("'arguments' is set; structured options (bytes, bandwidth, bind, protocol) are ignored");
        }
        Ok(())
    }

    /// The argument construction mode for this configuration.
    pub fn argument_mode(&self) -> ArgumentMode {
        if !self.arguments.is_empty() {
            return ArgumentMode::Override(self.arguments.clone());
        }
        ArgumentMode::Structured(StructuredOptions {
            time_interval: self.time_interval,
            bytes: non_empty(&self.bytes),
            bandwidth: non_empty(&self.bandwidth),
            bind: non_empty(&self.bind),
            bind_dev: non_empty(&self.bind_dev),
            protocol: self.protocol,
        })
    }

    fn has_structured_options(&self) -> bool {
        [&self.bytes, &self.bandwidth, &self.bind, &self.bind_dev]
            .iter()
            .any(|o| non_empty(o).is_some())
            || self.protocol != Protocol::Tcp
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
