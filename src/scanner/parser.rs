use std::time::Duration;

use bytes::{Buf, Bytes};

use super::reader::{FrameReader, Transport};

/// Width of a little-endian integer on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    One = 1,
    Two = 2,
    Four = 4,
    Eight = 8,
}

impl Width {
    pub const fn bytes(self) -> usize {
        self as usize
    }

    /// Decode the first `self.bytes()` bytes of `bytes` as an unsigned
    /// little-endian integer.
    pub fn decode(self, mut bytes: &[u8]) -> u64 {
        bytes.get_uint_le(self.bytes())
    }
}

/// Field-level primitives over a [`FrameReader`].
///
/// None of these fail: when the bytes they need do not show up in time they
/// return a zero value and the caller carries on.
pub struct PacketParser<T> {
    reader: FrameReader<T>,
}

impl<T: Transport> PacketParser<T> {
    pub fn new(reader: FrameReader<T>) -> Self {
        Self { reader }
    }

    pub fn reader(&self) -> &FrameReader<T> {
        &self.reader
    }

    pub fn reader_mut(&mut self) -> &mut FrameReader<T> {
        &mut self.reader
    }

    pub fn into_reader(self) -> FrameReader<T> {
        self.reader
    }

    pub async fn read_int(&mut self, width: Width) -> u64 {
        match self.reader.consume(width.bytes()).await {
            Some(bytes) => width.decode(&bytes),
            None => 0,
        }
    }

    pub async fn peek_int(&mut self, width: Width) -> u64 {
        match self.reader.peek(width.bytes()).await {
            Some(bytes) => width.decode(bytes),
            None => 0,
        }
    }

    /// Read a string prefixed by its length. Returns `(0, "")` if either part
    /// times out.
    pub async fn read_string(&mut self, prefix: Width) -> (usize, String) {
        let Ok(length) = usize::try_from(self.read_int(prefix).await) else {
            return (0, String::new());
        };

        match self.reader.consume(length).await {
            Some(bytes) => (length, String::from_utf8_lossy(&bytes).into_owned()),
            None => (0, String::new()),
        }
    }

    pub async fn read_bytes(&mut self, n: usize) -> Option<Bytes> {
        self.reader.consume(n).await
    }

    pub async fn discard_bytes(&mut self, n: usize) {
        self.reader.consume(n).await;
    }

    /// Consume bytes while they equal `value`. Returns how many were skipped.
    pub async fn skip_while(&mut self, value: u8) -> usize {
        let mut skipped = 0;
        loop {
            match self.reader.peek(1).await {
                Some(next) if next[0] == value => {}
                _ => return skipped,
            }
            self.reader.consume(1).await;
            skipped += 1;
        }
    }

    pub async fn drain_remaining(&mut self, quiescence: Duration) {
        self.reader.drain_remaining(quiescence).await;
    }
}
