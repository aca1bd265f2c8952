//! A reliable message split over three packets, with the middle packet lost once
//!
//! Server sends on channel 2, the client buffers fragments 1 and 3, the server
//! learns about the loss from the ack gap and resends fragment 2, and only then
//! does the client reassemble and the server release its window.

use tether_shared::ChannelKind;
use tether_test::{fast_config, init_logger, ConnectionPair, Direction, TICK};

#[test]
fn three_packet_message_with_middle_packet_lost() {
    init_logger();

    let mut pair = ConnectionPair::new(fast_config());
    pair.open_control();

    let index = pair
        .server
        .create_channel(ChannelKind::Actor, Some(2))
        .expect("server actor channel");
    let message: Vec<u8> = (0..2500u32).map(|value| (value % 251) as u8).collect();

    let first = pair.link.sent_count(Direction::ServerToClient);
    pair.link.drop_datagram(Direction::ServerToClient, first + 1);

    let range = pair
        .server
        .send_on_channel(index, &message, true)
        .expect("fragmented send");
    assert_eq!(range.last - range.first, 2, "expected three packets");
    assert_eq!(
        pair.server.channel(index).map(|channel| channel.num_outstanding()),
        Some(3)
    );

    // fragments 1 and 3 reach the client, fragment 2 is lost
    pair.tick();
    pair.tick_client(TICK);
    {
        let channel = pair.client.channel(index).expect("opened by fragment 1");
        assert_eq!(channel.num_queued(), 1, "fragment 3 waits for fragment 2");
    }
    assert!(pair.client_payloads(index).is_empty());

    // the ack for packet 3 uncovers the gap, fragment 2 is resent
    pair.tick_server(TICK);
    assert_eq!(pair.server.stats().out_packets_lost, 1);
    assert_eq!(
        pair.server.channel(index).map(|channel| channel.num_outstanding()),
        Some(3),
        "nothing is released while fragment 2 is unacked"
    );

    pair.tick_client(TICK);
    assert_eq!(pair.client_payloads(index), vec![message]);

    pair.tick_server(TICK);
    let channel = pair.server.channel(index).expect("channel still open");
    assert_eq!(channel.num_outstanding(), 0);
    assert!(channel.is_open_acked());
}
