//! Connection timeouts: silence closes an open connection, keep-alives hold
//! an idle one open, and pending destruction shortens the wait.

use tether_shared::CloseReason;
use tether_test::{closed_with, fast_config, init_logger, ConnectionPair, Direction};

#[test]
fn silent_peer_times_out() {
    init_logger();

    let mut pair = ConnectionPair::new(fast_config());
    pair.open_control();
    pair.client.take_events();

    // the server never ticks again, so nothing reaches the client
    for _ in 0..29 {
        pair.tick_client(1.0);
    }
    assert!(!pair.client.is_closed());

    for _ in 0..3 {
        pair.tick_client(1.0);
    }
    assert!(pair.client.is_closed());
    assert_eq!(pair.client.close_reason(), Some(CloseReason::Timeout));
    assert_eq!(
        closed_with(&pair.client.take_events()),
        Some(CloseReason::Timeout)
    );
}

#[test]
fn keep_alives_hold_an_idle_connection_open() {
    init_logger();

    let mut pair = ConnectionPair::new(fast_config());
    pair.open_control();

    // forty idle seconds, longer than the connection timeout
    for _ in 0..160 {
        pair.tick_client(0.25);
        pair.tick_server(0.25);
    }
    assert!(!pair.client.is_closed());
    assert!(!pair.server.is_closed());
}

#[test]
fn pending_destroy_uses_the_short_timeout() {
    init_logger();

    let mut pair = ConnectionPair::new(fast_config());
    pair.open_control();

    pair.client.set_pending_destroy();
    assert_eq!(pair.client.timeout_value(), 2.0);

    for _ in 0..3 {
        pair.tick_client(0.5);
    }
    assert!(!pair.client.is_closed());

    for _ in 0..3 {
        pair.tick_client(0.5);
    }
    assert_eq!(pair.client.close_reason(), Some(CloseReason::Timeout));
}

#[test]
fn closed_connection_ignores_further_ticks() {
    init_logger();

    let mut pair = ConnectionPair::new(fast_config());
    pair.open_control();
    pair.client.close(CloseReason::Explicit);
    let sent = pair.link.sent_count(Direction::ClientToServer);

    pair.run(10);
    assert_eq!(
        pair.link.sent_count(Direction::ClientToServer),
        sent
    );
    assert_eq!(pair.client.close_reason(), Some(CloseReason::Explicit));
}
