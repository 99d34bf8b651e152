//! `bwprobe gather`: run one collection cycle.

use std::path::Path;

use bwprobe_core::MemoryAccumulator;

use super::{OutputFormat, ProbeArgs};

/// Probe every target once and print one record per target. Failed
/// targets are data, so the exit status is 0 unless the configuration is
/// invalid.
pub fn run(args: &ProbeArgs, format: OutputFormat, output: Option<&Path>) {
    let probe = super::probe_or_exit(args);

    let mut acc = MemoryAccumulator::new();
    let summary = super::runtime().block_on(probe.gather(&mut acc));

    print!("{}", super::render(&acc.records, format));
    if format == OutputFormat::Table {
        println!();
        println!(
            "{}/{} target(s) ok in {:.2}s",
            summary.succeeded,
            summary.targets,
            summary.elapsed_ms as f64 / 1000.0
        );
    }

    if let Some(path) = output {
        super::write_json(&super::cycle_json(&summary, &acc), Some(path));
    }
}
