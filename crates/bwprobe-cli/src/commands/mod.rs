pub mod args;
pub mod gather;
pub mod parse;
pub mod sample;
pub mod server;
pub mod watch;

use std::path::PathBuf;
use std::time::Duration;

use bwprobe_core::format::{to_json_line, to_line_protocol};
use bwprobe_core::{
    ConfigError, CycleSummary, FieldValue, MemoryAccumulator, Probe, ProbeConfig, Protocol, Record,
};
use clap::{Args, ValueEnum};

/// Where the probe configuration comes from: an optional file, then flags.
#[derive(Args, Debug, Default, Clone)]
pub struct ProbeArgs {
    /// Configuration file (TOML, or JSON with a .json extension)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Server to probe, host or host:port (repeatable; replaces configured servers)
    #[arg(short = 't', long = "target")]
    pub targets: Vec<String>,

    /// Test duration in seconds; the run is killed 5s after this
    #[arg(long)]
    pub time: Option<u64>,

    /// Bytes to transmit instead of a timed test (e.g. "10M")
    #[arg(long)]
    pub bytes: Option<String>,

    /// Target bandwidth (e.g. "100M")
    #[arg(long)]
    pub bandwidth: Option<String>,

    /// Local address to bind
    #[arg(long)]
    pub bind: Option<String>,

    /// Local network device to bind
    #[arg(long)]
    pub bind_dev: Option<String>,

    /// Transport protocol: tcp, udp or sctp
    #[arg(long)]
    pub protocol: Option<String>,

    /// iperf3 binary name or path
    #[arg(long)]
    pub binary: Option<String>,

    /// Raw iperf3 arguments; replace every structured option, the server
    /// address is appended
    #[arg(last = true)]
    pub raw: Vec<String>,
}

impl ProbeArgs {
    /// The configuration file (or defaults) with flag overrides applied.
    pub fn to_config(&self) -> Result<ProbeConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => ProbeConfig::load(path)?,
            None => ProbeConfig::default(),
        };
        if !self.targets.is_empty() {
            config.server_addrs = self.targets.clone();
        }
        if let Some(t) = self.time {
            config.time_interval = t;
        }
        if let Some(p) = &self.protocol {
            config.protocol = p.parse::<Protocol>()?;
        }
        if let Some(b) = &self.binary {
            config.binary = b.clone();
        }
        if !self.raw.is_empty() {
            config.arguments = self.raw.clone();
        }
        override_opt(&mut config.bytes, &self.bytes);
        override_opt(&mut config.bandwidth, &self.bandwidth);
        override_opt(&mut config.bind, &self.bind);
        override_opt(&mut config.bind_dev, &self.bind_dev);
        Ok(config)
    }
}

fn override_opt(slot: &mut Option<String>, value: &Option<String>) {
    if value.is_some() {
        slot.clone_from(value);
    }
}

/// Build a probe from the arguments, or exit with status 2.
pub fn probe_or_exit(args: &ProbeArgs) -> Probe {
    match args.to_config().and_then(Probe::new) {
        Ok(probe) => probe,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    }
}

/// A multi-threaded tokio runtime, or exit.
pub fn runtime() -> tokio::runtime::Runtime {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error starting async runtime: {e}");
            std::process::exit(1);
        }
    }
}

/// One finished cycle as a JSON document.
pub fn cycle_json(summary: &CycleSummary, acc: &MemoryAccumulator) -> serde_json::Value {
    serde_json::json!({
        "summary": summary,
        "records": acc.records,
        "errors": acc.error_entries(),
    })
}

/// Record format on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One JSON object per line
    Json,
    /// InfluxDB line protocol
    Line,
    /// Human-readable table
    Table,
}

/// Render records in `format`, one line per record (plus a header for tables).
pub fn render(records: &[Record], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => records
            .iter()
            .filter_map(|r| to_json_line(r).ok())
            .map(|l| l + "\n")
            .collect(),
        OutputFormat::Line => records
            .iter()
            .map(|r| to_line_protocol(r) + "\n")
            .collect(),
        OutputFormat::Table => render_table(records),
    }
}

fn render_table(records: &[Record]) -> String {
    let mut out = format!(
        "{:<28} {:>4} {:>10} {:>6} {:>9} {:>24}\n",
        "ADDRESS", "CODE", "Mbit/s", "RETR", "CWND KB", "RTT min/mean/max (ms)"
    );
    for r in records {
        let get = |k: &str| r.field(k).map(|v| v.as_f64());
        let code = match r.field("result_code") {
            Some(FieldValue::Int(c)) => c.to_string(),
            Some(v) => v.to_string(),
            None => "-".to_string(),
        };
        let address = r.tag("address").unwrap_or("?");
        match (get("bits_per_second"), get("retransmits"), get("max_snd_cwnd")) {
            (Some(bps), Some(retr), Some(cwnd)) => {
                let rtt = format!(
                    "{:.2}/{:.2}/{:.2}",
                    get("min_rtt").unwrap_or_default(),
                    get("mean_rtt").unwrap_or_default(),
                    get("max_rtt").unwrap_or_default()
                );
                out.push_str(&format!(
                    "{address:<28} {code:>4} {:>10.2} {:>6} {:>9.1} {rtt:>24}\n",
                    bps / 1e6,
                    retr,
                    cwnd / 1024.0
                ));
            }
            _ => out.push_str(&format!(
                "{address:<28} {code:>4} {:>10} {:>6} {:>9} {:>24}\n",
                "-", "-", "-", "-"
            )),
        }
    }
    out
}

/// Pretty-print a value as JSON to stdout, or to `path` when given.
pub fn write_json(value: &serde_json::Value, path: Option<&std::path::Path>) {
    let text = match serde_json::to_string_pretty(value) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error serializing JSON: {e}");
            std::process::exit(1);
        }
    };
    match path {
        Some(p) => {
            if let Err(e) = std::fs::write(p, text + "\n") {
                eprintln!("Error writing {}: {e}", p.display());
                std::process::exit(1);
            }
            eprintln!("Results written to {}", p.display());
        }
        None => println!("{text}"),
    }
}

/// Parse a duration string like "5m", "30s", "1h", "100ms". Bare numbers
/// are seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    let (numeric, multiplier) = if let Some(rest) = s.strip_suffix("ms") {
        (rest, 1u64)
    } else if let Some(rest) = s.strip_suffix('s') {
        (rest, 1000)
    } else if let Some(rest) = s.strip_suffix('m') {
        (rest, 60_000)
    } else if let Some(rest) = s.strip_suffix('h') {
        (rest, 3_600_000)
    } else {
        (s, 1000)
    };

    let value: u64 = numeric
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration: {s}"))?;
    if value == 0 {
        return Err(format!("duration must be positive: {s}"));
    }
    let millis = value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("duration too large: {s}"))?;
    Ok(Duration::from_millis(millis))
}
