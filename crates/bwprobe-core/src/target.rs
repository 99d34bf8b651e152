//! Server endpoints to probe.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Port iperf3 servers listen on unless told otherwise.
pub const DEFAULT_PORT: u16 = 5201;

/// One configured server endpoint: `host`, `host:port`, `[v6]:port` or a bare
/// IPv6 literal.
///
/// The configured string is kept verbatim; it is the tag value on every
/// record for this target and the token appended in override mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    address: String,
    host: String,
    port: u16,
}

impl Target {
    /// Parse a target address, applying [`DEFAULT_PORT`] when no port is given.
    pub fn parse(address: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidTarget {
            target: address.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = address.trim();
        let (host, port) = if let Some(rest) = trimmed.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| invalid("unterminated '[' in IPv6 address"))?;
            let port = match tail {
                "" => None,
                t => Some(
                    t.strip_prefix(':')
                        .ok_or_else(|| invalid("unexpected text after ']'"))?,
                ),
            };
            (host, port)
        } else if trimmed.matches(':').count() > 1 {
            // Bare IPv6 literal, no room for a port.
            (trimmed, None)
        } else {
            match trimmed.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (trimmed, None),
            }
        };

        if host.is_empty() {
            return Err(invalid("empty host"));
        }
        let port = match port {
            None => DEFAULT_PORT,
            Some(p) => match p.parse::<u16>() {
                Ok(0) | Err(_) => return Err(invalid("port must be a number in 1-65535")),
                Ok(n) => n,
            },
        };

        Ok(Self {
            address: address.to_string(),
            host: host.to_string(),
            port,
        })
    }

    /// The address exactly as configured.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl FromStr for Target {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}
