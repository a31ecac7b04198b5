//! A stub Factorio server for end-to-end tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use factorio_query::Target;

/// Describes the reply a stub server sends.
#[derive(Debug, Clone)]
pub struct ServerReply {
    pub version: [u8; 3],
    pub echo: [u8; 4],
    pub players: Vec<String>,
    pub mods: Vec<(String, [u8; 3], [u8; 4])>,
    /// Written in place of the real name length when set.
    pub name_length: Option<u32>,
    pub name: String,
    pub description: String,
    pub address: String,
    pub tags: Vec<String>,
}

impl Default for ServerReply {
    fn default() -> Self {
        Self {
            version: [0, 17, 1],
            echo: [0x5e, 0x55, 0x10, 0x4e],
            players: vec!["Alice".into()],
            mods: Vec::new(),
            name_length: None,
            name: "TestServer".into(),
            description: "A test server".into(),
            address: "10.0.0.5:34197".into(),
            tags: vec!["vanilla".into(), "pve".into()],
        }
    }
}

fn lstr1(out: &mut Vec<u8>, text: &str) {
    out.push(text.len() as u8);
    out.extend_from_slice(text.as_bytes());
}

fn lstr4(out: &mut Vec<u8>, text: &str) {
    out.extend_from_slice(&(text.len() as u32).to_le_bytes());
    out.extend_from_slice(text.as_bytes());
}

impl ServerReply {
    fn extended(&self) -> bool {
        self.version[0] == 0 && self.version[1] == 15 && self.version[2] >= 19
    }

    pub fn handshake(&self) -> Vec<u8> {
        let mut reply = vec![0x01; 32];
        reply[3..6].copy_from_slice(&self.version);
        reply[12..16].copy_from_slice(&self.echo);
        reply
    }

    pub fn body(&self) -> Vec<u8> {
        let mut out = vec![0xaa; 8];
        out.extend([0, 0, 0]);
        lstr4(&mut out, "session");
        if self.extended() {
            lstr4(&mut out, "extra");
        }
        out.extend([0, 0]);

        out.push(0x01);
        out.extend([0xff, 0xff, 0xff]);
        lstr1(&mut out, "server");
        out.extend([0, 0]);
        out.push(self.players.len() as u8);
        for (id, player) in self.players.iter().enumerate() {
            out.push(id as u8 + 1);
            lstr1(&mut out, player);
            out.push(0);
        }

        out.extend([0x11; 10]);
        out.push(0xff);
        out.extend_from_slice(&(self.mods.len() as u32).to_le_bytes());
        for (name, version, hash) in &self.mods {
            lstr1(&mut out, name);
            out.extend_from_slice(version);
            out.extend_from_slice(hash);
        }

        out.extend([0x22; 10]);
        let name_length = self.name_length.unwrap_or(self.name.len() as u32);
        out.extend_from_slice(&name_length.to_le_bytes());
        out.extend_from_slice(self.name.as_bytes());
        out.extend([0x09; 5]);
        lstr4(&mut out, &self.description);
        if self.extended() {
            out.extend([0x33; 4]);
        }
        out.extend([0, 0]);
        lstr4(&mut out, &self.address);

        out.extend_from_slice(&(self.tags.len() as u32).to_le_bytes());
        for tag in &self.tags {
            lstr4(&mut out, tag);
        }
        out
    }
}

/// A UDP server that answers the probe and the continuation with a canned
/// reply. The body is sent in small datagrams with short gaps between them.
pub struct StubPeer {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<Vec<u8>>>>,
    task: JoinHandle<()>,
}

impl StubPeer {
    pub async fn spawn(reply: ServerReply) -> Self {
        Self::spawn_raw(reply.handshake(), reply.body(), 16).await
    }

    /// Never answers anything.
    pub async fn silent() -> Self {
        Self::spawn_with(None, Vec::new(), 1).await
    }

    pub async fn spawn_raw(handshake: Vec<u8>, body: Vec<u8>, chunk: usize) -> Self {
        Self::spawn_with(Some(handshake), body, chunk).await
    }

    async fn spawn_with(handshake: Option<Vec<u8>>, body: Vec<u8>, chunk: usize) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&received);

        let task = tokio::spawn(async move {
            let mut buf = [0u8; 2048];
            loop {
                let Ok((len, from)) = socket.recv_from(&mut buf).await else {
                    return;
                };
                let datagram = buf[..len].to_vec();
                let kind = datagram.first().copied();
                log.lock().unwrap().push(datagram);

                let Some(handshake) = &handshake else {
                    continue;
                };
                match kind {
                    Some(0x02) => {
                        let _ = socket.send_to(handshake, from).await;
                    }
                    Some(0x04) => {
                        for piece in body.chunks(chunk) {
                            let _ = socket.send_to(piece, from).await;
                            tokio::time::sleep(Duration::from_millis(2)).await;
                        }
                    }
                    _ => {}
                }
            }
        });

        Self {
            addr,
            received,
            task,
        }
    }

    pub fn target(&self) -> Target {
        Target::new("127.0.0.1", self.addr.port())
    }

    pub fn received(&self) -> Vec<Vec<u8>> {
        self.received.lock().unwrap().clone()
    }
}

impl Drop for StubPeer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
