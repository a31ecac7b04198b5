//! Walks a server reply section by section.
//!
//! The layout was worked out from captures; fields the decoder does not
//! understand are skipped by fixed counts or by filler runs. Every read
//! degrades to a zero value on timeout, so a truncated reply still yields
//! whatever was decoded before the gap.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::QueryError;
use crate::scanner::parser::{PacketParser, Width};
use crate::scanner::protocols::{self, FieldLayout};
use crate::scanner::reader::Transport;
use crate::scanner::spectrometer;
use crate::scanner::{ModEntry, QueryConfig, ServerQueryResult, ServerVersion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Handshake,
    Players,
    Mods,
    ServerInfo,
    Tags,
    Done,
    Drifted,
}

pub struct ProtocolDecoder<T> {
    parser: PacketParser<T>,
    stage: Stage,
    layout: FieldLayout,
    handshake_timeout: Duration,
    drain_quiescence: Duration,
    result: ServerQueryResult,
}

impl<T: Transport> ProtocolDecoder<T> {
    pub fn new(parser: PacketParser<T>, address: String, config: &QueryConfig) -> Self {
        Self {
            parser,
            stage: Stage::Handshake,
            layout: FieldLayout::BASE,
            handshake_timeout: config.handshake_timeout,
            drain_quiescence: config.drain_quiescence,
            result: ServerQueryResult {
                address,
                ..Default::default()
            },
        }
    }

    pub async fn run(mut self) -> Result<ServerQueryResult, QueryError> {
        self.handshake().await?;

        self.advance(Stage::Players);
        self.players().await;

        self.advance(Stage::Mods);
        self.mods().await;

        self.advance(Stage::ServerInfo);
        self.parser.discard_bytes(protocols::SERVER_INFO_LEAD).await;
        let name_length = self.parser.peek_int(Width::Four).await;
        if name_length >= protocols::MAX_NAME_LENGTH {
            self.advance(Stage::Drifted);
            warn!(
                address = %self.result.address,
                name_length,
                "reply does not match the known layout, returning partial result"
            );
            let partial = self.finish().await;
            return Err(QueryError::ProtocolDrift {
                name_length,
                partial: Box::new(partial),
            });
        }
        self.server_info().await;

        self.advance(Stage::Tags);
        self.tags().await;

        self.advance(Stage::Done);
        Ok(self.finish().await)
    }

    fn advance(&mut self, next: Stage) {
        debug_assert!(next > self.stage, "{:?} -> {:?}", self.stage, next);
        debug!(from = ?self.stage, to = ?next, "decoder stage");
        self.stage = next;
    }

    async fn handshake(&mut self) -> Result<(), QueryError> {
        let address = self.result.address.clone();
        let reader = self.parser.reader_mut();

        reader
            .send(&protocols::PROBE)
            .await
            .map_err(|source| QueryError::Connect {
                address: address.clone(),
                source,
            })?;

        let until = reader.clamp(self.handshake_timeout);
        let started = Instant::now();
        let timed_out = || QueryError::HandshakeTimeout {
            address: address.clone(),
            waited: started.elapsed(),
        };
        match reader.wait_for(protocols::HANDSHAKE_REPLY_LEN, until).await {
            Ok(true) => {}
            Ok(false) => return Err(timed_out()),
            Err(source) => {
                return Err(QueryError::Connect {
                    address: address.clone(),
                    source,
                })
            }
        }
        let reply = reader
            .consume(protocols::HANDSHAKE_REPLY_LEN)
            .await
            .ok_or_else(timed_out)?;
        let dropped = reader.discard_pending();
        if dropped > 0 {
            debug!(dropped, "ignoring tail of handshake datagram");
        }

        let v = protocols::VERSION_OFFSET;
        let version = ServerVersion::new(reply[v], reply[v + 1], reply[v + 2]);
        let e = protocols::ECHO_OFFSET;
        let echo = [reply[e], reply[e + 1], reply[e + 2], reply[e + 3]];

        self.result.version = version;
        self.layout = protocols::layout_for(version);
        debug!(%version, layout = ?self.layout, "handshake reply");

        reader
            .send(&protocols::continuation(echo))
            .await
            .map_err(|source| QueryError::Connect { address, source })?;

        self.parser.discard_bytes(protocols::SESSION_PREAMBLE).await;
        self.parser.skip_while(protocols::ZERO_FILL).await;
        self.parser.read_string(Width::Four).await;
        if self.layout.extra_preamble_field {
            self.parser.read_string(Width::Four).await;
        }
        self.parser.skip_while(protocols::ZERO_FILL).await;

        Ok(())
    }

    async fn players(&mut self) {
        self.parser.discard_bytes(protocols::PLAYERS_LEAD).await;
        self.parser.skip_while(protocols::FF_FILL).await;
        // Host player name, not reported.
        self.parser.read_string(Width::One).await;
        self.parser.discard_bytes(protocols::HOST_NAME_TRAILER).await;

        let count = self.parser.read_int(Width::One).await;
        for _ in 0..count {
            if self.parser.reader().deadline_expired() {
                break;
            }
            self.parser.discard_bytes(protocols::PLAYER_ID).await;
            let (_, name) = self.parser.read_string(Width::One).await;
            self.result.players.push(name);
            self.parser.discard_bytes(protocols::PLAYER_TRAILER).await;
        }
    }

    async fn mods(&mut self) {
        self.parser.discard_bytes(protocols::MODS_LEAD).await;
        self.parser.skip_while(protocols::ZERO_FILL).await;
        self.parser.skip_while(protocols::FF_FILL).await;

        let count = self.parser.read_int(Width::Four).await;
        for _ in 0..count {
            let (length, name) = self.parser.read_string(Width::One).await;
            if length == 0 {
                break;
            }

            let major = self.parser.read_int(Width::One).await as u8;
            let minor = self.parser.read_int(Width::One).await as u8;
            let patch = self.parser.read_int(Width::One).await as u8;

            let mut hash = [0u8; 4];
            if let Some(bytes) = self.parser.read_bytes(hash.len()).await {
                hash.copy_from_slice(&bytes);
            }

            self.result.mods.push(ModEntry {
                name,
                version: ServerVersion::new(major, minor, patch),
                hash,
            });
        }
    }

    async fn server_info(&mut self) {
        let (_, name) = self.parser.read_string(Width::Four).await;
        self.parser.discard_bytes(protocols::NAME_TRAILER).await;
        let (_, description) = self.parser.read_string(Width::Four).await;
        if self.layout.description_trailer > 0 {
            self.parser.discard_bytes(self.layout.description_trailer).await;
        }
        self.parser.skip_while(protocols::ZERO_FILL).await;

        let (_, advertised) = self.parser.read_string(Width::Four).await;
        if !advertised.is_empty() {
            self.result.address = advertised;
        }

        self.result.name = name;
        self.result.description = description;
    }

    async fn tags(&mut self) {
        let count = self.parser.read_int(Width::Four).await;
        for _ in 0..count {
            if self.parser.reader().deadline_expired() {
                break;
            }
            let (_, tag) = self.parser.read_string(Width::Four).await;
            self.result.tags.push(tag);
        }
    }

    /// Collect trailing datagrams, close the socket and attach the
    /// diagnostics.
    async fn finish(mut self) -> ServerQueryResult {
        self.parser.drain_remaining(self.drain_quiescence).await;
        let capture = self.parser.into_reader().into_capture();

        let mut result = self.result;
        result.spectrum = spectrometer::scan(&capture);
        result.raw_response = capture;
        result
    }
}
