//! `bwprobe parse`: extract the metrics from a saved `iperf3 --json` report.

use std::io::Read;
use std::path::Path;

use bwprobe_core::parse_report;

pub fn run(file: Option<&Path>) {
    let text = match read_input(file) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error reading report: {e}");
            std::process::exit(1);
        }
    };

    match parse_report(&text) {
        Ok(metrics) => {
            let value = serde_json::to_value(metrics).unwrap_or_default();
            super::write_json(&value, None);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn read_input(file: Option<&Path>) -> std::io::Result<String> {
    match file {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path),
        _ => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
    }
}
