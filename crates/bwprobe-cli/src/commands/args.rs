//! `bwprobe args`: show the command line per target without running it.

use super::ProbeArgs;

pub fn run(args: &ProbeArgs) {
    let probe = super::probe_or_exit(args);
    let binary = &probe.config().binary;

    println!("timeout: {}s", probe.timeout().as_secs());
    for (target, argv) in probe.planned_args() {
        println!("{target}: {binary} {}", argv.join(" "));
    }
}
