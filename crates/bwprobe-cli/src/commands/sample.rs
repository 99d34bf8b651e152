//! `bwprobe sample-config`

pub fn run() {
    print!("{}", bwprobe_core::SAMPLE_CONFIG);
}
