use std::fmt;
use std::str::FromStr;

use crate::error::TargetParseError;

/// Port Factorio servers listen on unless told otherwise.
pub const DEFAULT_PORT: u16 = 34197;

/// A server to query, as given on the command line (`host[:port]`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl Target {
    /// Port 0 means "unspecified" and is replaced by [`DEFAULT_PORT`].
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port: if port == 0 { DEFAULT_PORT } else { port },
        }
    }
}

impl FromStr for Target {
    type Err = TargetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(TargetParseError::Empty);
        }

        let (host, port) = match s.split_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (s, None),
        };

        if host.is_empty() || host.contains('\n') {
            return Err(TargetParseError::InvalidHost(s.to_string()));
        }

        let port = match port {
            None => 0,
            Some(port) => {
                if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(TargetParseError::InvalidPort(s.to_string()));
                }
                port.parse::<u16>()
                    .map_err(|_| TargetParseError::InvalidPort(s.to_string()))?
            }
        };

        Ok(Target::new(host, port))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
