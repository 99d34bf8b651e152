//! Basic probe example.
//!
//! Probes the servers given on the command line once and prints each
//! record as it arrives, with failures on stderr.
//!
//! Run: `cargo run --example basic -- 10.0.0.1 iperf.example.net:5202`

use bwprobe_core::{Accumulator, Fields, Probe, ProbeConfig, ProbeError, Tags};

/// Prints records instead of storing them.
struct Printer;

impl Accumulator for Printer {
    fn add_fields(&mut self, measurement: &str, fields: Fields, tags: Tags) {
        let address = tags.get("address").map(String::as_str).unwrap_or("?");
        let fields: Vec<String> = fields.iter().map(|(k, v)| format!("{k}={v}")).collect();
        println!("{measurement} {address}: {}", fields.join(" "));
    }

    fn add_error(&mut self, error: ProbeError) {
        eprintln!("[{}] {error}", error.kind());
    }
}

#[tokio::main]
async fn main() {
    let servers: Vec<String> = std::env::args().skip(1).collect();
    let config = ProbeConfig {
        server_addrs: servers,
        time_interval: 5,
        ..Default::default()
    };

    let probe = match Probe::new(config) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    let summary = probe.gather(&mut Printer).await;
    println!(
        "\n{}/{} targets ok in {} ms",
        summary.succeeded, summary.targets, summary.elapsed_ms
    );
}
