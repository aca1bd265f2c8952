//! Hand-built packets that a connection must refuse
//!
//! Each test feeds raw datagrams straight into a server connection and checks
//! whether it closes, with which reason, and whether it answered at all.

use tether_serde::{BitWrite, BitWriter};
use tether_shared::{
    write_packet_id, ChannelKind, CloseReason, Connection, ConnectionConfig, HostType,
    PacketProcessor, Segment, SegmentFlags,
};
use tether_test::{fast_config, init_logger, LocalWire};

fn server() -> (Connection, LocalWire) {
    let wire = LocalWire::new();
    let connection = Connection::new(
        HostType::Server,
        fast_config(),
        PacketProcessor::new(),
        Box::new(wire.clone()),
    )
    .expect("server connection");
    (connection, wire)
}

fn segment(index: usize, kind: Option<ChannelKind>, sequence: i32, flags: SegmentFlags) -> Segment {
    let mut payload = BitWriter::new();
    payload.write_byte(0xAB);
    Segment {
        channel_index: index,
        kind,
        sequence,
        packet_id: -1,
        flags,
        payload,
    }
}

fn packet(packet_id: i32, segments: &[Segment]) -> Vec<u8> {
    let layout = ConnectionConfig {
        bandwidth_bytes_per_second: 1_000_000,
        ..Default::default()
    }
    .segment_layout();

    let mut writer = BitWriter::new();
    write_packet_id(&mut writer, packet_id);
    for segment in segments {
        segment.write_header(&mut writer, &layout);
        writer.write_bits(&segment.payload);
    }
    writer.write_bit(true);
    writer.into_bytes()
}

fn control_open() -> Segment {
    segment(
        0,
        Some(ChannelKind::Control),
        1,
        SegmentFlags {
            open: true,
            reliable: true,
            ..Default::default()
        },
    )
}

// ========== Framing ==========

#[test]
fn test_packet_without_terminator_closes() {
    init_logger();
    let (mut server, _) = server();

    server.received_raw_packet(&[0xFF, 0xFF, 0x00]);

    assert_eq!(server.close_reason(), Some(CloseReason::MalformedPacket));
}

#[test]
fn test_truncated_segment_header_closes() {
    init_logger();
    let (mut server, _) = server();

    let mut writer = BitWriter::new();
    write_packet_id(&mut writer, 0);
    // segment discriminator and control bit, then nothing
    writer.write_bit(false);
    writer.write_bit(false);
    writer.write_bit(true);
    server.received_raw_packet(&writer.into_bytes());

    assert_eq!(server.close_reason(), Some(CloseReason::MalformedPacket));
}

#[test]
fn test_well_formed_control_open_is_accepted() {
    init_logger();
    let (mut server, wire) = server();

    server.received_raw_packet(&packet(0, &[control_open()]));
    server.tick(0.01);

    assert!(!server.is_closed());
    assert_eq!(server.in_packet_id(), 0);
    assert!(server.channel(0).is_some());
    assert_eq!(wire.sent_count(), 1, "the ack goes out on the next tick");
}

// ========== Channel Types ==========

#[test]
fn test_missing_channel_type_is_a_security_violation() {
    init_logger();
    let (mut server, _) = server();

    // reliable and opening, so a type is on the wire, but it is zero
    let untyped = segment(
        0,
        None,
        1,
        SegmentFlags {
            open: true,
            reliable: true,
            ..Default::default()
        },
    );
    server.received_raw_packet(&packet(0, &[untyped]));

    assert_eq!(server.close_reason(), Some(CloseReason::SecurityViolation));
}

// ========== Control Channel ==========

#[test]
fn test_data_before_control_withholds_the_ack() {
    init_logger();
    let (mut server, wire) = server();

    let early = segment(
        2,
        Some(ChannelKind::Actor),
        1,
        SegmentFlags {
            open: true,
            reliable: true,
            ..Default::default()
        },
    );
    server.received_raw_packet(&packet(0, &[early]));
    server.tick(0.01);

    assert!(!server.is_closed());
    assert!(server.channel(2).is_none());
    assert!(server.receive_segments().is_empty());
    assert_eq!(wire.sent_count(), 0);
}

#[test]
fn test_control_close_before_open_is_illegal() {
    init_logger();
    let (mut server, _) = server();

    let close = segment(
        0,
        Some(ChannelKind::Control),
        1,
        SegmentFlags {
            close: true,
            reliable: true,
            ..Default::default()
        },
    );
    server.received_raw_packet(&packet(0, &[close]));

    assert_eq!(server.close_reason(), Some(CloseReason::IllegalSegment));
}

#[test]
fn test_reliable_data_on_unopened_channel_is_refused() {
    init_logger();
    let (mut server, _) = server();

    server.received_raw_packet(&packet(0, &[control_open()]));
    // actor channels only open with the open flag
    let unopened = segment(
        2,
        Some(ChannelKind::Actor),
        1,
        SegmentFlags {
            reliable: true,
            ..Default::default()
        },
    );
    server.received_raw_packet(&packet(1, &[unopened]));

    assert!(!server.is_closed());
    assert!(server.channel(2).is_none());
    assert_eq!(server.in_packet_id(), 1);
}
