//! `bwprobe serve`: HTTP exporter.

use std::time::Duration;

use super::ProbeArgs;

pub fn run(args: &ProbeArgs, host: &str, port: u16, every: Duration) {
    let probe = super::probe_or_exit(args);

    let base = format!("http://{host}:{port}");
    println!("bwprobe exporter v{}", bwprobe_core::VERSION);
    println!("   {base}");
    println!(
        "   {} target(s), probed every {:.0}s",
        probe.targets().len(),
        every.as_secs_f64()
    );
    println!();
    println!("   Endpoints:");
    println!("     GET /          API index (try: curl {base})");
    println!("     GET /health    Outcome counts of the last cycle");
    println!("     GET /targets   Last record per target, with its error");
    println!("     GET /metrics   Last cycle in InfluxDB line protocol");
    println!();

    let rt = super::runtime();
    if let Err(e) = rt.block_on(bwprobe_server::run_server(probe, host, port, every)) {
        eprintln!("Error: server on {host}:{port} failed: {e}");
        std::process::exit(1);
    }
}
