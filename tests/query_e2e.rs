//! End-to-end queries against a stub server on localhost.

mod common;

use std::net::UdpSocket as StdUdpSocket;
use std::time::{Duration, Instant};

use common::{ServerReply, StubPeer};
use factorio_query::scanner::protocols;
use factorio_query::{query_server, QueryConfig, QueryError, Target};

fn config() -> QueryConfig {
    QueryConfig::default()
}

#[tokio::test]
async fn decodes_well_formed_reply() {
    let reply = ServerReply::default();
    let peer = StubPeer::spawn(reply.clone()).await;

    let result = query_server(&peer.target(), &config()).await.unwrap();

    assert_eq!(result.version.to_string(), "0.17.1");
    assert_eq!(result.players, vec!["Alice"]);
    assert!(result.mods.is_empty());
    assert_eq!(result.name, "TestServer");
    assert_eq!(result.description, "A test server");
    assert_eq!(result.address, "10.0.0.5:34197");
    assert_eq!(result.tags, vec!["vanilla", "pve"]);

    let mut expected_capture = reply.handshake();
    expected_capture.extend(reply.body());
    assert_eq!(result.raw_response, expected_capture);
}

#[tokio::test]
async fn sends_probe_then_continuation_with_echo() {
    let reply = ServerReply {
        echo: [0xca, 0xfe, 0xba, 0xbe],
        ..Default::default()
    };
    let peer = StubPeer::spawn(reply).await;

    query_server(&peer.target(), &config()).await.unwrap();

    let received = peer.received();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0], protocols::PROBE);
    assert_eq!(received[1].len(), protocols::CONTINUATION_LEN);
    assert_eq!(received[1], protocols::continuation([0xca, 0xfe, 0xba, 0xbe]));
}

#[tokio::test]
async fn drift_returns_players_and_mods_decoded_so_far() {
    let reply = ServerReply {
        name_length: Some(300),
        mods: vec![("base".into(), [0, 17, 1], [0xde, 0xad, 0xbe, 0xef])],
        ..Default::default()
    };
    let peer = StubPeer::spawn(reply).await;
    let target = peer.target();

    let err = query_server(&target, &config()).await.unwrap_err();
    let QueryError::ProtocolDrift { name_length, ref partial } = err else {
        panic!("expected drift, got {err:?}");
    };

    assert_eq!(name_length, 300);
    assert_eq!(partial.players, vec!["Alice"]);
    assert_eq!(partial.mods.len(), 1);
    assert_eq!(partial.mods[0].name, "base");
    assert_eq!(partial.mods[0].version.to_string(), "0.17.1");
    assert_eq!(partial.mods[0].hash, [0xde, 0xad, 0xbe, 0xef]);
    assert!(partial.name.is_empty());
    assert!(partial.description.is_empty());
    assert!(partial.tags.is_empty());
    assert_eq!(partial.version.to_string(), "0.17.1");
    assert_eq!(partial.address, target.to_string());

    // The rest of the reply was still captured and scanned.
    assert!(partial
        .spectrum
        .get(&4)
        .unwrap()
        .iter()
        .any(|s| s.text == "A test server"));
}

#[tokio::test]
async fn extended_layout_for_late_0_15_releases() {
    let reply = ServerReply {
        version: [0, 15, 40],
        players: vec!["Alice".into(), "Bob".into(), "Carol".into()],
        mods: vec![
            ("base".into(), [0, 15, 40], [0x10, 0x20, 0x30, 0x40]),
            ("Squeak Through".into(), [1, 8, 0], [0xaa, 0xbb, 0xcc, 0xdd]),
        ],
        tags: vec!["modded".into()],
        ..Default::default()
    };
    let peer = StubPeer::spawn(reply).await;

    let result = query_server(&peer.target(), &config()).await.unwrap();

    assert_eq!(result.version.to_string(), "0.15.40");
    assert_eq!(result.players, vec!["Alice", "Bob", "Carol"]);
    assert_eq!(result.mods.len(), 2);
    assert_eq!(result.mods[1].name, "Squeak Through");
    assert_eq!(result.mods[1].version.to_string(), "1.8.0");
    assert_eq!(result.mods[1].hash_hex(), "aabbccdd");
    assert_eq!(result.name, "TestServer");
    assert_eq!(result.description, "A test server");
    assert_eq!(result.tags, vec!["modded"]);
}

#[tokio::test]
async fn silent_server_times_out_without_result() {
    let peer = StubPeer::silent().await;

    let started = Instant::now();
    let err = query_server(&peer.target(), &config()).await.unwrap_err();

    assert!(matches!(err, QueryError::HandshakeTimeout { .. }), "{err:?}");
    assert!(err.partial_result().is_none());
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(peer.received().len(), 1);
}

#[tokio::test]
async fn closed_port_fails_fast() {
    let port = {
        let socket = StdUdpSocket::bind("127.0.0.1:0").unwrap();
        socket.local_addr().unwrap().port()
    };

    let started = Instant::now();
    let err = query_server(&Target::new("127.0.0.1", port), &config())
        .await
        .unwrap_err();

    assert!(
        matches!(err, QueryError::Connect { .. } | QueryError::HandshakeTimeout { .. }),
        "{err:?}"
    );
    assert!(err.partial_result().is_none());
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn unresolvable_host_is_a_connect_error() {
    let err = query_server(&Target::new("host.invalid", 34197), &config())
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::Connect { .. }), "{err:?}");
}

#[tokio::test]
async fn concurrent_queries_are_independent() {
    let first = StubPeer::spawn(ServerReply {
        name: "First".into(),
        players: vec!["Alice".into()],
        ..Default::default()
    })
    .await;
    let second = StubPeer::spawn(ServerReply {
        name: "Second".into(),
        players: vec!["Bob".into(), "Carol".into()],
        ..Default::default()
    })
    .await;

    let config = config();
    let (first_target, second_target) = (first.target(), second.target());
    let (a, b) = tokio::join!(
        query_server(&first_target, &config),
        query_server(&second_target, &config),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.name, "First");
    assert_eq!(a.players, vec!["Alice"]);
    assert_eq!(b.name, "Second");
    assert_eq!(b.players, vec!["Bob", "Carol"]);
}

#[tokio::test]
async fn handshake_datagram_tail_is_dropped() {
    let reply = ServerReply::default();
    let mut handshake = reply.handshake();
    handshake.extend_from_slice(b"trailing junk");
    let peer = StubPeer::spawn_raw(handshake, reply.body(), 32).await;

    let result = query_server(&peer.target(), &config()).await.unwrap();
    assert_eq!(result.name, "TestServer");
    assert_eq!(&result.raw_response[..32], &reply.handshake()[..]);
}
