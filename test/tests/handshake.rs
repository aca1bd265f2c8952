//! Connections behind the stateless handshake
//!
//! No data flows until both sides finish the cookie exchange, after which
//! both seed their packet and channel sequences from the cookie.

use tether_shared::{ChannelError, ChannelKind, CloseReason, ConnectionEvent};
use tether_test::{closed_with, fast_config, init_logger, ConnectionPair, Direction};

fn initialized_count(events: &[ConnectionEvent]) -> usize {
    events
        .iter()
        .filter(|event| **event == ConnectionEvent::Initialized)
        .count()
}

#[test]
fn handshake_completes_and_data_flows() {
    init_logger();

    let mut pair = ConnectionPair::with_handshake(fast_config());
    assert!(!pair.client.is_initialized());
    assert!(!pair.server.is_initialized());
    assert!(pair.client.take_events().is_empty());

    assert!(pair.run_until_initialized(10), "handshake never completed");
    assert_eq!(initialized_count(&pair.client.take_events()), 1);
    assert_eq!(initialized_count(&pair.server.take_events()), 1);

    // both sides agree on where each direction starts
    assert_eq!(pair.client.out_packet_id(), pair.server.in_packet_id() + 1);
    assert_eq!(pair.server.out_packet_id(), pair.client.in_packet_id() + 1);

    pair.tick();
    pair.client
        .create_channel(ChannelKind::Control, None)
        .expect("control channel");
    pair.client
        .send_on_channel(0, b"hello", true)
        .expect("control hello");
    pair.run(4);

    assert_eq!(initialized_count(&pair.client.take_events()), 0);
    assert_eq!(pair.server_payloads(0), vec![b"hello".to_vec()]);
    assert_eq!(
        pair.client.channel(0).map(|channel| channel.num_outstanding()),
        Some(0)
    );
}

#[test]
fn handshake_survives_a_lost_challenge() {
    init_logger();

    let mut pair = ConnectionPair::with_handshake(fast_config());
    // the server's first datagram is its challenge
    pair.link.drop_datagram(Direction::ServerToClient, 0);

    assert!(
        !pair.run_until_initialized(5),
        "handshake cannot finish before the client resends"
    );
    // the client resends its request once a second
    assert!(pair.run_until_initialized(40), "handshake never recovered");
}

#[test]
fn send_before_handshake_closes() {
    init_logger();

    let mut pair = ConnectionPair::with_handshake(fast_config());
    pair.client
        .create_channel(ChannelKind::Control, None)
        .expect("control channel");

    assert_eq!(
        pair.client.send_on_channel(0, b"too early", true),
        Err(ChannelError::HandshakePending)
    );
    assert_eq!(pair.client.close_reason(), Some(CloseReason::HandshakeNotReady));
    assert_eq!(
        closed_with(&pair.client.take_events()),
        Some(CloseReason::HandshakeNotReady)
    );
}

#[test]
fn handshake_survives_a_retransmitted_challenge() {
    init_logger();

    let mut pair = ConnectionPair::with_handshake(fast_config());
    pair.tick_client(0.05);
    // the server answers, but its challenge is still in flight when the
    // client resends its request
    pair.server.tick(0.05);
    pair.tick_client(1.0);
    pair.server.tick(0.05);
    assert_eq!(pair.link.sent_count(Direction::ServerToClient), 2);

    // both challenges arrive together and the client answers each
    let inbound = pair.client.inbound_queue();
    assert_eq!(pair.link.deliver(Direction::ServerToClient, &inbound), 2);

    assert!(pair.run_until_initialized(20), "handshake never completed");
    assert_eq!(pair.client.out_packet_id(), pair.server.in_packet_id() + 1);
    assert_eq!(pair.server.out_packet_id(), pair.client.in_packet_id() + 1);

    pair.tick();
    pair.client
        .create_channel(ChannelKind::Control, None)
        .expect("control channel");
    pair.client
        .send_on_channel(0, b"hello", true)
        .expect("control hello");
    pair.run(4);
    assert_eq!(pair.server_payloads(0), vec![b"hello".to_vec()]);
}

#[test]
fn server_ignores_data_before_handshake() {
    init_logger();

    let mut pair = ConnectionPair::with_handshake(fast_config());

    // a data packet with the handshake bit clear, ahead of any handshake
    pair.server.inbound_queue().push(&[0b0000_0110]);
    pair.tick_server(0.05);

    assert!(!pair.server.is_closed());
    assert!(!pair.server.is_initialized());
    assert_eq!(pair.server.stats().in_packets_lost, 0);
}
