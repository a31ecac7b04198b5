//! Wire constants for the Factorio server query exchange.
//!
//! Most of the lengths and literals here were recovered from packet captures
//! and have no known meaning. They are opaque: change none of them.

use super::ServerVersion;

/// First datagram of every session.
pub const PROBE: [u8; 12] = [0x02, 0xa8, 0x76, 0x00, 0x00, 0x00, 0x8a, 0x74, 0x39, 0x22, 0x5b, 0x86];

/// Bytes of the probe reply the decoder looks at. Anything past this in the
/// same datagram is dropped.
pub const HANDSHAKE_REPLY_LEN: usize = 32;

/// Offset of the major, minor and patch bytes in the probe reply.
pub const VERSION_OFFSET: usize = 3;

/// Offset of the four session bytes echoed back in the continuation.
pub const ECHO_OFFSET: usize = 12;

pub const CONTINUATION_LEN: usize = 60;

const CONTINUATION_HEADER: [u8; 7] = [0x04, 0xa9, 0x76, 0x39, 0x22, 0x5b, 0x86];

// Carries the literal player name "John Doe" (1-byte length prefix) and the
// "base" mod marker.
const CONTINUATION_TRAILER: [u8; 49] = [
    0x6b, 0x39, 0x34, 0x9d, 0x08, 0x4a, 0x6f, 0x68, 0x6e, 0x20, 0x44, 0x6f, 0x65, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x6e, 0xae, 0x93, 0xd3, 0x01, 0x00, 0x00,
    0x00, 0x04, 0x62, 0x61, 0x73, 0x65, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00,
];

/// Second datagram, which the server needs before it sends the session body.
pub fn continuation(echo: [u8; 4]) -> [u8; CONTINUATION_LEN] {
    let mut payload = [0u8; CONTINUATION_LEN];
    let trailer_start = CONTINUATION_HEADER.len() + echo.len();
    payload[..CONTINUATION_HEADER.len()].copy_from_slice(&CONTINUATION_HEADER);
    payload[CONTINUATION_HEADER.len()..trailer_start].copy_from_slice(&echo);
    payload[trailer_start..].copy_from_slice(&CONTINUATION_TRAILER);
    payload
}

/// Filler bytes skipped between sections.
pub const ZERO_FILL: u8 = 0x00;
pub const FF_FILL: u8 = 0xff;

// Skip counts, in the order the decoder meets them.
pub const SESSION_PREAMBLE: usize = 8;
pub const PLAYERS_LEAD: usize = 1;
pub const HOST_NAME_TRAILER: usize = 2;
pub const PLAYER_ID: usize = 1;
pub const PLAYER_TRAILER: usize = 1;
pub const MODS_LEAD: usize = 10;
pub const SERVER_INFO_LEAD: usize = 10;
pub const NAME_TRAILER: usize = 5;

/// A server name length at or above this means the reply is laid out in a way
/// this decoder does not know.
pub const MAX_NAME_LENGTH: u64 = 255;

/// Fields whose presence depends on the server release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLayout {
    /// A second length-prefixed field follows the first one in the session
    /// preamble.
    pub extra_preamble_field: bool,
    /// Bytes to skip after the server description.
    pub description_trailer: usize,
}

impl FieldLayout {
    pub const BASE: FieldLayout = FieldLayout {
        extra_preamble_field: false,
        description_trailer: 0,
    };
}

/// Inclusive range of server releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionRange {
    pub first: ServerVersion,
    pub last: ServerVersion,
}

impl VersionRange {
    pub fn contains(&self, version: ServerVersion) -> bool {
        self.first <= version && version <= self.last
    }
}

/// Releases whose replies differ from [`FieldLayout::BASE`]. The first
/// matching entry wins.
pub const LAYOUTS: &[(VersionRange, FieldLayout)] = &[(
    VersionRange {
        first: ServerVersion::new(0, 15, 19),
        last: ServerVersion::new(0, 15, u8::MAX),
    },
    FieldLayout {
        extra_preamble_field: true,
        description_trailer: 4,
    },
)];

pub fn layout_for(version: ServerVersion) -> FieldLayout {
    LAYOUTS
        .iter()
        .find(|(range, _)| range.contains(version))
        .map(|(_, layout)| *layout)
        .unwrap_or(FieldLayout::BASE)
}
