use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::scanner::ServerQueryResult;

/// Failure of a single server query.
///
/// Only [`QueryError::ProtocolDrift`] carries a result: by the time drift is
/// detected the players and mods sections have already been decoded.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("could not reach {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("no handshake reply from {address} within {waited:?}")]
    HandshakeTimeout { address: String, waited: Duration },

    #[error("reply does not match the known protocol layout (server name length {name_length})")]
    ProtocolDrift {
        name_length: u64,
        partial: Box<ServerQueryResult>,
    },
}

impl QueryError {
    /// The partially decoded result, if this failure kept one.
    pub fn partial_result(&self) -> Option<&ServerQueryResult> {
        match self {
            QueryError::ProtocolDrift { partial, .. } => Some(partial),
            _ => None,
        }
    }

    pub fn into_partial_result(self) -> Option<ServerQueryResult> {
        match self {
            QueryError::ProtocolDrift { partial, .. } => Some(*partial),
            _ => None,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TargetParseError {
    #[error("empty target")]
    Empty,
    #[error("invalid host in target {0:?}")]
    InvalidHost(String),
    #[error("invalid port in target {0:?}")]
    InvalidPort(String),
}
