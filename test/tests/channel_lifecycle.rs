//! Channel open, close, reopen and dormancy across a connection pair, and the
//! connection closing when its control channel goes away.

use tether_shared::{ChannelError, ChannelKind, CloseReason, ConnectionEvent};
use tether_test::{closed_with, fast_config, init_logger, ConnectionPair};

fn opened(events: &[ConnectionEvent], index: usize) -> bool {
    events
        .iter()
        .any(|event| matches!(event, ConnectionEvent::ChannelOpened { index: opened, .. } if *opened == index))
}

fn closed(events: &[ConnectionEvent], index: usize) -> Option<bool> {
    events.iter().find_map(|event| match event {
        ConnectionEvent::ChannelClosed {
            index: closed,
            dormant,
        } if *closed == index => Some(*dormant),
        _ => None,
    })
}

#[test]
fn open_close_and_reopen() {
    init_logger();

    let mut pair = ConnectionPair::new(fast_config());
    pair.open_control();
    pair.client.take_events();
    pair.server.take_events();

    let index = pair
        .client
        .create_channel(ChannelKind::Actor, None)
        .expect("actor channel");
    pair.client
        .send_on_channel(index, b"first", true)
        .expect("opening send");
    pair.run(4);

    assert!(opened(&pair.server.take_events(), index));
    assert_eq!(pair.server_payloads(index), vec![b"first".to_vec()]);
    assert_eq!(
        pair.server.channel(index).map(|channel| channel.kind()),
        Some(ChannelKind::Actor)
    );

    // only the opening side may close
    assert_eq!(
        pair.server.close_channel(index),
        Err(ChannelError::NotOpenedLocally { index })
    );

    pair.client.close_channel(index).expect("close");
    assert_eq!(
        pair.client.send_on_channel(index, b"late", true),
        Err(ChannelError::Closing { index })
    );
    pair.run(4);

    assert_eq!(closed(&pair.server.take_events(), index), Some(false));
    assert_eq!(closed(&pair.client.take_events(), index), Some(false));
    assert!(pair.server.channel(index).is_none());
    assert!(pair.client.channel(index).is_none());

    // the reopened channel continues the old sequence at that index
    assert_eq!(pair.client.num_channels(), 1);
    let reopened = pair
        .client
        .create_channel(ChannelKind::File, Some(index))
        .expect("reopen");
    assert_eq!(reopened, index);
    assert_eq!(
        pair.client.channel(index).map(|channel| channel.out_reliable()),
        Some(2)
    );
    pair.client
        .send_on_channel(index, b"second", true)
        .expect("reopening send");
    pair.run(4);

    assert_eq!(pair.server_payloads(index), vec![b"second".to_vec()]);
    assert_eq!(
        pair.server.channel(index).map(|channel| channel.kind()),
        Some(ChannelKind::File)
    );
    assert!(!pair.client.is_closed());
    assert!(!pair.server.is_closed());
}

#[test]
fn dormant_channel_closes_with_dormant_flag() {
    init_logger();

    let mut pair = ConnectionPair::new(fast_config());
    pair.open_control();

    let index = pair
        .client
        .create_channel(ChannelKind::Actor, None)
        .expect("actor channel");
    pair.client
        .send_on_channel(index, b"state", true)
        .expect("opening send");
    pair.run(4);
    pair.client.take_events();
    pair.server.take_events();

    assert_eq!(
        pair.client.set_channel_pending_dormancy(0),
        Err(ChannelError::DormancyUnsupported {
            kind: ChannelKind::Control
        })
    );
    pair.client
        .set_channel_pending_dormancy(index)
        .expect("actor channels support dormancy");
    pair.run(4);

    assert_eq!(closed(&pair.server.take_events(), index), Some(true));
    assert_eq!(closed(&pair.client.take_events(), index), Some(true));
    assert!(pair.server.channel(index).is_none());
}

#[test]
fn flushing_dormancy_before_the_tick_keeps_the_channel() {
    init_logger();

    let mut pair = ConnectionPair::new(fast_config());
    pair.open_control();

    let index = pair
        .client
        .create_channel(ChannelKind::Actor, None)
        .expect("actor channel");
    pair.client
        .send_on_channel(index, b"state", true)
        .expect("opening send");
    pair.run(4);

    pair.client
        .set_channel_pending_dormancy(index)
        .expect("pending dormancy");
    pair.client
        .flush_channel_dormancy(index)
        .expect("flush dormancy");
    pair.run(4);

    let channel = pair.client.channel(index).expect("still open");
    assert!(!channel.is_dormant());
    assert!(!channel.is_closing());
}

#[test]
fn control_channel_close_ends_both_connections() {
    init_logger();

    let mut pair = ConnectionPair::new(fast_config());
    pair.open_control();

    pair.client.close_channel(0).expect("control close");
    pair.run(4);

    assert!(pair.server.is_closed());
    assert!(pair.client.is_closed());
    assert_eq!(
        closed_with(&pair.server.take_events()),
        Some(CloseReason::ControlChannelClosed)
    );
    assert_eq!(
        closed_with(&pair.client.take_events()),
        Some(CloseReason::ControlChannelClosed)
    );
}

#[test]
fn remote_voice_channel_opens_from_either_side() {
    init_logger();

    let mut pair = ConnectionPair::new(fast_config());
    pair.open_control();

    let index = pair
        .server
        .create_channel(ChannelKind::Voice, None)
        .expect("voice channel");
    assert_eq!(index, 1);
    pair.server
        .send_on_channel(index, b"voice", true)
        .expect("voice send");
    pair.run(4);

    assert_eq!(pair.client_payloads(index), vec![b"voice".to_vec()]);
    assert_eq!(
        pair.client.create_channel(ChannelKind::Voice, None),
        Err(ChannelError::ChannelInUse { index: 1 })
    );
}
