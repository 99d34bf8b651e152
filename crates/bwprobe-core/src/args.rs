//! Command-line construction for the measurement tool.
//!
//! Arguments come from exactly one of two places. A raw override list is
//! passed through untouched (only the target address is appended); no
//! structured option is merged into it. Without an override, the structured
//! options are combined in a fixed order:
//!
//! ```text
//! -p <port> -c <host> --json [--bandwidth B] [--bind A] [--bind-dev D]
//!     (--bytes N | --time T) [--udp | --sctp]
//! ```

use crate::config::Protocol;
use crate::target::Target;

/// Structured measurement options.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StructuredOptions {
    pub time_interval: u64,
    pub bytes: Option<String>,
    pub bandwidth: Option<String>,
    pub bind: Option<String>,
    pub bind_dev: Option<String>,
    pub protocol: Protocol,
}

/// Where the argument list comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentMode {
    /// Raw arguments, used verbatim with the target address appended.
    Override(Vec<String>),
    /// Arguments assembled from structured options.
    Structured(StructuredOptions),
}

/// Build the ordered argument list for one target.
pub fn build_args(target: &Target, mode: &ArgumentMode) -> Vec<String> {
    match mode {
        ArgumentMode::Override(raw) => {
            let mut args = raw.clone();
            args.push(target.address().to_string());
            args
        }
        ArgumentMode::Structured(opts) => structured_args(target, opts),
    }
}

fn structured_args(target: &Target, opts: &StructuredOptions) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-p".into(),
        target.port().to_string(),
        "-c".into(),
        target.host().to_string(),
        "--json".into(),
    ];

    let mut push_opt = |flag: &str, value: &Option<String>| {
        if let Some(v) = value {
            args.push(flag.to_string());
            args.push(v.clone());
        }
    };
    push_opt("--bandwidth", &opts.bandwidth);
    push_opt("--bind", &opts.bind);
    push_opt("--bind-dev", &opts.bind_dev);

    // Either a byte count or a duration, never both.
    match &opts.bytes {
        Some(bytes) => {
            args.push("--bytes".into());
            args.push(bytes.clone());
        }
        None => {
            args.push("--time".into());
            args.push(opts.time_interval.to_string());
        }
    }

    match opts.protocol {
        Protocol::Tcp => {}
        Protocol::Udp => args.push("--udp".into()),
        Protocol::Sctp => args.push("--sctp".into()),
    }

    args
}
