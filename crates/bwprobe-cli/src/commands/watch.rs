//! `bwprobe watch`: collection cycles on a fixed period until Ctrl+C.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bwprobe_core::MemoryAccumulator;

use super::{OutputFormat, ProbeArgs};

pub fn run(args: &ProbeArgs, every: Duration, format: OutputFormat, count: Option<u64>) {
    let probe = super::probe_or_exit(args);
    let rt = super::runtime();

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: could not install Ctrl+C handler: {e}");
    }

    eprintln!(
        "Probing {} target(s) every {:.0}s. Press Ctrl+C to stop.",
        probe.targets().len(),
        every.as_secs_f64()
    );

    let mut cycles = 0u64;
    while running.load(Ordering::SeqCst) {
        let started = Instant::now();
        let mut acc = MemoryAccumulator::new();
        rt.block_on(probe.gather(&mut acc));
        cycles += 1;

        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(super::render(&acc.records, format).as_bytes());
        let _ = stdout.flush();
        drop(stdout);

        if count.is_some_and(|n| cycles >= n) {
            break;
        }
        // Sleep in small steps so Ctrl+C is honored promptly.
        while running.load(Ordering::SeqCst) && started.elapsed() < every {
            let left = every.saturating_sub(started.elapsed());
            std::thread::sleep(left.min(Duration::from_millis(100)));
        }
    }

    eprintln!("Stopped after {cycles} cycle(s).");
}
