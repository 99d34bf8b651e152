//! CLI for bwprobe: iperf3 bandwidth probes across a fleet of servers.

mod commands;

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};

use commands::{OutputFormat, ProbeArgs, parse_duration};

#[derive(Parser)]
#[command(name = "bwprobe")]
#[command(about = "bwprobe: run iperf3 against a set of servers and report throughput, retransmits and RTT")]
#[command(version = bwprobe_core::VERSION)]
struct Cli {
    /// Log more (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one collection cycle and print one record per target
    Gather {
        #[command(flatten)]
        probe: ProbeArgs,

        /// Record format on stdout
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,

        /// Also write the cycle (summary, records, errors) as JSON to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Run collection cycles on a fixed period until Ctrl+C
    Watch {
        #[command(flatten)]
        probe: ProbeArgs,

        /// Period between cycle starts (e.g. "30s", "5m")
        #[arg(long, default_value = "60s", value_parser = parse_duration)]
        every: Duration,

        /// Record format on stdout
        #[arg(long, value_enum, default_value = "line")]
        format: OutputFormat,

        /// Stop after this many cycles
        #[arg(long)]
        count: Option<u64>,
    },

    /// Print the iperf3 command line each target would be probed with
    Args {
        #[command(flatten)]
        probe: ProbeArgs,
    },

    /// Parse a saved `iperf3 --json` report and print the extracted metrics
    Parse {
        /// Report file; reads stdin when omitted or "-"
        file: Option<PathBuf>,
    },

    /// Print a commented sample configuration file
    SampleConfig,

    /// Serve periodic probe results over HTTP
    Serve {
        #[command(flatten)]
        probe: ProbeArgs,

        /// Port to listen on
        #[arg(long, default_value = "9273")]
        port: u16,

        /// Host to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Period between cycle starts (e.g. "30s", "5m")
        #[arg(long, default_value = "60s", value_parser = parse_duration)]
        every: Duration,
    },
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp_millis()
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Gather {
            probe,
            format,
            output,
        } => commands::gather::run(&probe, format, output.as_deref()),
        Commands::Watch {
            probe,
            every,
            format,
            count,
        } => commands::watch::run(&probe, every, format, count),
        Commands::Args { probe } => commands::args::run(&probe),
        Commands::Parse { file } => commands::parse::run(file.as_deref()),
        Commands::SampleConfig => commands::sample::run(),
        Commands::Serve {
            probe,
            port,
            host,
            every,
        } => commands::server::run(&probe, &host, port, every),
    }
}
