//! Packet processor stages that fail on the way out
//!
//! A packet lost inside the pipeline must behave like one lost on the wire:
//! its reliable segments are resent once the peer acks a later packet.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tether_shared::{BitWriter, ChannelKind, PacketProcessor, PacketStage, ProcessorError};
use tether_test::{fast_config, init_logger, ConnectionPair};

/// Passes packets through untouched, failing the next outgoing one on demand
struct FlakyStage {
    fail_next: Arc<AtomicBool>,
}

impl PacketStage for FlakyStage {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn process_outgoing(&mut self, packet: BitWriter) -> Result<BitWriter, ProcessorError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ProcessorError::StageFailed {
                stage: "flaky",
                reason: "out of buffers".to_string(),
            });
        }
        Ok(packet)
    }

    fn process_incoming(&mut self, packet: BitWriter) -> Result<Option<BitWriter>, ProcessorError> {
        Ok(Some(packet))
    }
}

fn flaky_pair() -> (ConnectionPair, Arc<AtomicBool>) {
    let fail_next = Arc::new(AtomicBool::new(false));
    let server_stage = FlakyStage {
        fail_next: Arc::new(AtomicBool::new(false)),
    };
    let client_stage = FlakyStage {
        fail_next: fail_next.clone(),
    };
    let pair = ConnectionPair::with_processors(
        fast_config(),
        PacketProcessor::new().with_stage(server_stage),
        PacketProcessor::new().with_stage(client_stage),
    );
    (pair, fail_next)
}

#[test]
fn segments_in_a_failed_flush_are_resent() {
    init_logger();

    let (mut pair, fail_next) = flaky_pair();
    pair.open_control();
    let index = pair
        .client
        .create_channel(ChannelKind::File, None)
        .expect("file channel");
    pair.client
        .send_on_channel(index, b"A", true)
        .expect("opening send");
    pair.run(4);
    assert_eq!(pair.server_payloads(index), vec![b"A".to_vec()]);

    let before = pair.client.out_packet_id();
    fail_next.store(true, Ordering::SeqCst);
    pair.client
        .send_on_channel(index, b"B", true)
        .expect("reliable send");
    pair.tick();
    assert!(!fail_next.load(Ordering::SeqCst), "the flush never reached the stage");
    assert!(
        pair.client.out_packet_id() > before,
        "a failed flush still spends its packet id"
    );

    pair.client
        .send_on_channel(index, b"C", true)
        .expect("reliable send");
    pair.run(40);

    assert_eq!(
        pair.server_payloads(index),
        vec![b"B".to_vec(), b"C".to_vec()]
    );
    assert_eq!(
        pair.client.channel(index).map(|channel| channel.num_outstanding()),
        Some(0)
    );
    // the spent id shows up as a gap on the receiving side
    assert!(pair.server.stats().in_packets_lost >= 1);
    assert!(!pair.client.is_closed());
    assert!(!pair.server.is_closed());
}
