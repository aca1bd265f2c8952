//! Flow control keeps a connection within its bandwidth budget
//!
//! A sender that tries to push far more than the configured bandwidth is
//! refused with `Saturated`, and its queued bits stay bounded by one packet.

use tether_shared::{ChannelError, ChannelKind, ConnectionConfig, MIN_BANDWIDTH_BYTES_PER_SECOND};
use tether_test::{init_logger, ConnectionPair};

#[test]
fn saturated_sender_stays_within_budget() {
    init_logger();

    let config = ConnectionConfig {
        bandwidth_bytes_per_second: MIN_BANDWIDTH_BYTES_PER_SECOND,
        ..Default::default()
    };
    let packet_bound = ((config.max_packet_size + config.packet_overhead) * 8) as i64;
    let mut pair = ConnectionPair::new(config);
    pair.open_control();
    let index = pair
        .client
        .create_channel(ChannelKind::File, None)
        .expect("file channel");

    let payload = vec![0x5A; 200];
    let mut accepted = 0usize;
    let mut saturated = 0usize;

    // two seconds of traffic
    for _ in 0..40 {
        for _ in 0..10 {
            match pair.client.send_on_channel(index, &payload, true) {
                Ok(_) => accepted += 1,
                Err(ChannelError::Saturated { .. }) => saturated += 1,
                Err(error) => panic!("unexpected send error: {error}"),
            }
        }
        pair.tick();
        assert!(
            pair.client.queued_bits() <= packet_bound,
            "queued bits {} exceed one packet",
            pair.client.queued_bits()
        );
    }

    assert!(saturated > 0, "flow control never pushed back");
    // budget for two seconds, the banked allowance and one packet of burst
    let budget_bytes = MIN_BANDWIDTH_BYTES_PER_SECOND as usize * 2 + 2 * 1052;
    assert!(
        accepted * payload.len() <= budget_bytes,
        "{} bytes accepted against a budget of {}",
        accepted * payload.len(),
        budget_bytes
    );
}

#[test]
fn fast_connection_is_never_saturated() {
    init_logger();

    let config = ConnectionConfig {
        bandwidth_bytes_per_second: 1_000_000,
        ..Default::default()
    };
    let mut pair = ConnectionPair::new(config);
    pair.open_control();
    let index = pair
        .client
        .create_channel(ChannelKind::File, None)
        .expect("file channel");

    for number in 0..20u8 {
        pair.client
            .send_on_channel(index, &[number; 64], true)
            .expect("send within budget");
        pair.tick();
    }
    assert!(pair.client.is_net_ready());
}
