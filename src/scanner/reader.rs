//! Buffered datagram reader with bounded waits.
//!
//! The session body has no end marker and several sections of unknown length,
//! so nothing here blocks indefinitely: every wait is bounded by a per-field
//! timeout and by the overall query deadline, whichever comes first.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{trace, warn};

/// Largest datagram we expect from a server.
const MAX_DATAGRAM: usize = 65536;

/// A datagram pipe to the server.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, datagram: &[u8]) -> io::Result<()>;

    /// Wait for the next datagram.
    async fn recv(&mut self) -> io::Result<Vec<u8>>;
}

/// A UDP socket connected to a single server.
pub struct UdpTransport {
    socket: UdpSocket,
    buf: Box<[u8]>,
}

impl UdpTransport {
    /// Resolve `address`, then bind and connect a socket of the matching
    /// family.
    pub async fn connect(address: &str) -> io::Result<Self> {
        let remote = tokio::net::lookup_host(address)
            .await?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "address resolved to nothing"))?;

        let local = if remote.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };

        let socket = UdpSocket::bind(local).await?;
        socket.connect(remote).await?;

        Ok(Self {
            socket,
            buf: vec![0u8; MAX_DATAGRAM].into_boxed_slice(),
        })
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        self.socket.send(datagram).await.map(|_| ())
    }

    async fn recv(&mut self) -> io::Result<Vec<u8>> {
        let len = self.socket.recv(&mut self.buf).await?;
        Ok(self.buf[..len].to_vec())
    }
}

/// In-memory transport fed by a [`FeedPeer`].
///
/// Once the peer is dropped `recv` never completes, like a server that went
/// quiet.
pub struct ByteFeed {
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
}

/// The far end of a [`ByteFeed`].
pub struct FeedPeer {
    inbound: mpsc::UnboundedSender<Vec<u8>>,
    outbound: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl ByteFeed {
    pub fn pair() -> (ByteFeed, FeedPeer) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        (
            ByteFeed {
                inbound: inbound_rx,
                outbound: outbound_tx,
            },
            FeedPeer {
                inbound: inbound_tx,
                outbound: outbound_rx,
            },
        )
    }
}

impl FeedPeer {
    /// Queue one datagram for the reader.
    pub fn push(&self, datagram: impl Into<Vec<u8>>) {
        // The feed may already be gone, in which case nobody is listening.
        let _ = self.inbound.send(datagram.into());
    }

    /// Datagrams the reader has sent so far.
    pub fn sent(&mut self) -> Vec<Vec<u8>> {
        let mut sent = Vec::new();
        while let Ok(datagram) = self.outbound.try_recv() {
            sent.push(datagram);
        }
        sent
    }
}

#[async_trait]
impl Transport for ByteFeed {
    async fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        let _ = self.outbound.send(datagram.to_vec());
        Ok(())
    }

    async fn recv(&mut self) -> io::Result<Vec<u8>> {
        match self.inbound.recv().await {
            Some(datagram) => Ok(datagram),
            None => std::future::pending().await,
        }
    }
}

/// Reads bytes off a [`Transport`] and records every consumed byte.
pub struct FrameReader<T> {
    transport: T,
    pending: BytesMut,
    capture: Vec<u8>,
    field_timeout: Duration,
    deadline: Instant,
    /// Set after a receive error; no further receives are attempted.
    broken: bool,
}

impl<T: Transport> FrameReader<T> {
    pub fn new(transport: T, field_timeout: Duration, deadline: Instant) -> Self {
        Self {
            transport,
            pending: BytesMut::new(),
            capture: Vec::new(),
            field_timeout,
            deadline,
            broken: false,
        }
    }

    /// Bytes received but not consumed yet.
    pub fn available(&self) -> usize {
        self.pending.len()
    }

    /// Every byte consumed so far, in arrival order.
    pub fn capture(&self) -> &[u8] {
        &self.capture
    }

    pub fn deadline_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub async fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        self.transport.send(datagram).await
    }

    /// Wait up to the field timeout for `n` bytes to be buffered.
    ///
    /// Returns false if they did not arrive in time or the transport failed.
    pub async fn wait_until_available(&mut self, n: usize) -> bool {
        let until = self.clamp(self.field_timeout);
        match self.wait_for(n, until).await {
            Ok(ready) => {
                if !ready {
                    trace!(wanted = n, buffered = self.pending.len(), "field timed out");
                }
                ready
            }
            Err(e) => {
                warn!("receive failed, treating reply as finished: {e}");
                false
            }
        }
    }

    /// Wait until `n` bytes are buffered or `until` passes, surfacing
    /// transport errors.
    pub async fn wait_for(&mut self, n: usize, until: Instant) -> io::Result<bool> {
        while self.pending.len() < n {
            if self.broken {
                return Ok(false);
            }
            match timeout_at(until, self.transport.recv()).await {
                Ok(Ok(datagram)) => {
                    trace!(len = datagram.len(), "datagram received");
                    self.pending.extend_from_slice(&datagram);
                }
                Ok(Err(e)) => {
                    self.broken = true;
                    return Err(e);
                }
                Err(_) => return Ok(false),
            }
        }
        Ok(true)
    }

    /// The earlier of `now + timeout` and the query deadline.
    pub fn clamp(&self, timeout: Duration) -> Instant {
        (Instant::now() + timeout).min(self.deadline)
    }

    /// Look at the next `n` bytes without consuming them.
    pub async fn peek(&mut self, n: usize) -> Option<&[u8]> {
        if !self.wait_until_available(n).await {
            return None;
        }
        Some(&self.pending[..n])
    }

    /// Consume the next `n` bytes, appending them to the capture.
    pub async fn consume(&mut self, n: usize) -> Option<Bytes> {
        if !self.wait_until_available(n).await {
            return None;
        }
        Some(self.take(n))
    }

    fn take(&mut self, n: usize) -> Bytes {
        let bytes = self.pending.split_to(n).freeze();
        self.capture.extend_from_slice(&bytes);
        bytes
    }

    /// Drop whatever is buffered without recording it. Returns the number of
    /// bytes dropped.
    pub fn discard_pending(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    /// Consume everything that arrives until a full `quiescence` window passes
    /// with nothing new.
    pub async fn drain_remaining(&mut self, quiescence: Duration) {
        loop {
            let buffered = self.pending.len();
            if buffered > 0 {
                self.take(buffered);
            }

            let until = self.clamp(quiescence);
            match self.wait_for(1, until).await {
                Ok(true) => continue,
                Ok(false) => break,
                Err(e) => {
                    warn!("receive failed while draining: {e}");
                    break;
                }
            }
        }
    }

    /// Close the transport and hand back the capture.
    pub fn into_capture(self) -> Vec<u8> {
        self.capture
    }
}
