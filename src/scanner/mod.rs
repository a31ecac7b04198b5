use std::fmt;
use std::io;
use std::time::Duration;

use serde::{Serialize, Serializer};
use tokio::time::{timeout, Instant};
use tracing::debug;

use crate::error::QueryError;
use crate::scanner::decoder::ProtocolDecoder;
use crate::scanner::parser::PacketParser;
use crate::scanner::reader::{FrameReader, Transport, UdpTransport};
use crate::scanner::spectrometer::Spectrum;
use crate::scanner::targets::Target;

pub mod decoder;
pub mod parser;
pub mod protocols;
pub mod reader;
pub mod spectrometer;
pub mod targets;

/// Timing limits for one query.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// How long to wait for the socket to be set up and for the probe reply.
    pub handshake_timeout: Duration,
    /// How long a single field read waits for its bytes.
    pub field_timeout: Duration,
    /// Idle time after which the reply is assumed to be complete.
    pub drain_quiescence: Duration,
    /// Upper bound on the whole exchange, handshake included.
    pub query_deadline: Duration,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_millis(100),
            field_timeout: Duration::from_millis(50),
            drain_quiescence: Duration::from_millis(100),
            query_deadline: Duration::from_secs(2),
        }
    }
}

/// A release number as the server reports it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServerVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl ServerVersion {
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self { major, minor, patch }
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Serialize for ServerVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModEntry {
    pub name: String,
    pub version: ServerVersion,
    /// Opaque; passed through as received. Serialized as lowercase hex.
    #[serde(serialize_with = "serialize_hash")]
    pub hash: [u8; 4],
}

fn serialize_hash<S: Serializer>(hash: &[u8; 4], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex(hash))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl ModEntry {
    pub fn hash_hex(&self) -> String {
        hex(&self.hash)
    }
}

/// Everything decoded from one server reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServerQueryResult {
    pub name: String,
    pub description: String,
    pub version: ServerVersion,
    pub tags: Vec<String>,
    /// The address the server advertises, or the one that was queried.
    pub address: String,
    pub players: Vec<String>,
    pub mods: Vec<ModEntry>,
    /// Every byte received after the probe, in order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub raw_response: Vec<u8>,
    #[serde(skip_serializing_if = "Spectrum::is_empty")]
    pub spectrum: Spectrum,
}

impl ServerQueryResult {
    /// Drop the raw capture and the string scan.
    pub fn strip_diagnostics(&mut self) {
        self.raw_response.clear();
        self.spectrum.clear();
    }
}

/// Query the server at `target` over UDP.
///
/// A reply that stops matching the known layout half way through yields
/// [`QueryError::ProtocolDrift`], which still carries what was decoded.
pub async fn query_server(
    target: &Target,
    config: &QueryConfig,
) -> Result<ServerQueryResult, QueryError> {
    let address = target.to_string();
    debug!(%address, "querying server");

    let transport = match timeout(config.handshake_timeout, UdpTransport::connect(&address)).await {
        Ok(Ok(transport)) => transport,
        Ok(Err(source)) => return Err(QueryError::Connect { address, source }),
        Err(_) => {
            return Err(QueryError::Connect {
                address,
                source: io::Error::new(io::ErrorKind::TimedOut, "dial timed out"),
            })
        }
    };

    query_over(transport, address, config).await
}

/// Run the query exchange over an already connected transport. `address` is
/// reported in the result unless the server advertises its own.
pub async fn query_over<T: Transport>(
    transport: T,
    address: String,
    config: &QueryConfig,
) -> Result<ServerQueryResult, QueryError> {
    let started = Instant::now();
    let reader = FrameReader::new(
        transport,
        config.field_timeout,
        started + config.query_deadline,
    );
    let decoder = ProtocolDecoder::new(PacketParser::new(reader), address, config);

    let outcome = decoder.run().await;
    debug!(elapsed = ?started.elapsed(), ok = outcome.is_ok(), "query finished");
    outcome
}
