//! Replayed packets are dropped without touching state, and acks are idempotent
//! even when every datagram arrives twice.

use tether_shared::ChannelKind;
use tether_test::{fast_config, init_logger, ConnectionPair, Direction, LinkConditions, TICK};

#[test]
fn replayed_packet_is_dropped() {
    init_logger();

    let mut pair = ConnectionPair::new(fast_config());
    pair.open_control();
    let index = pair
        .client
        .create_channel(ChannelKind::Actor, None)
        .expect("actor channel");

    pair.client
        .send_on_channel(index, b"once", true)
        .expect("reliable send");
    pair.tick_client(TICK);
    let captured = pair
        .link
        .last_delivered(Direction::ClientToServer)
        .expect("client packet delivered");
    pair.tick_server(TICK);
    assert_eq!(pair.server_payloads(index), vec![b"once".to_vec()]);

    let in_packet_id = pair.server.in_packet_id();
    let out_of_order = pair.server.stats().out_of_order_packets;
    let in_reliable = pair.server.channel(index).map(|channel| channel.in_reliable());

    pair.server.inbound_queue().push(&captured);
    pair.tick_server(TICK);

    assert!(pair.server_payloads(index).is_empty());
    assert_eq!(pair.server.in_packet_id(), in_packet_id);
    assert_eq!(
        pair.server.channel(index).map(|channel| channel.in_reliable()),
        in_reliable
    );
    // only the diagnostic counter notices the replay
    assert_eq!(pair.server.stats().out_of_order_packets, out_of_order + 1);
    assert!(!pair.server.is_closed());
}

#[test]
fn duplicated_datagrams_deliver_once() {
    init_logger();

    let mut pair = ConnectionPair::new(fast_config());
    pair.open_control();
    pair.link.set_conditions(LinkConditions {
        duplicate: 1.0,
        ..Default::default()
    });

    let index = pair
        .client
        .create_channel(ChannelKind::Actor, None)
        .expect("actor channel");
    for number in 0..5u8 {
        pair.client
            .send_on_channel(index, &[number], true)
            .expect("reliable send");
        pair.tick();
    }
    pair.run(6);

    let expected: Vec<Vec<u8>> = (0..5u8).map(|number| vec![number]).collect();
    assert_eq!(pair.server_payloads(index), expected);
    assert_eq!(
        pair.client.channel(index).map(|channel| channel.num_outstanding()),
        Some(0)
    );
    assert_eq!(pair.client.stats().out_packets_lost, 0);
    assert!(pair.server.stats().out_of_order_packets >= 5);
}

#[test]
fn repeated_ack_changes_nothing() {
    init_logger();

    let mut pair = ConnectionPair::new(fast_config());
    pair.open_control();
    let index = pair
        .client
        .create_channel(ChannelKind::Actor, None)
        .expect("actor channel");
    pair.client
        .send_on_channel(index, b"payload", true)
        .expect("reliable send");
    pair.run(4);

    // the server's latest packet, carrying acks the client processes next tick
    let captured = pair
        .link
        .last_delivered(Direction::ServerToClient)
        .expect("server packet delivered");
    pair.tick_client(TICK);

    let out_ack = pair.client.out_ack_packet_id();
    assert_eq!(
        pair.client.channel(index).map(|channel| channel.num_outstanding()),
        Some(0)
    );

    pair.client.inbound_queue().push(&captured);
    pair.tick_client(TICK);

    assert_eq!(pair.client.out_ack_packet_id(), out_ack);
    assert_eq!(
        pair.client.channel(index).map(|channel| channel.num_outstanding()),
        Some(0)
    );
    assert_eq!(pair.client.stats().out_packets_lost, 0);
    assert!(!pair.client.is_closed());
}
