pub mod error;
pub mod stateless_handshake;

use log::trace;

use tether_serde::{packet_bit_length, BitWrite, BitWriter};

use crate::types::PacketId;

pub use error::ProcessorError;
pub use stateless_handshake::{HandshakeConfig, StatelessHandshake};

/// One transform between the connection and the wire: a handshake, an
/// encryption layer, a compressor.
///
/// Outgoing packets pass the stages first to last, incoming packets last to
/// first. A stage may also originate packets of its own, which the processor
/// hands to the connection for sending.
pub trait PacketStage: Send {
    fn name(&self) -> &'static str;

    fn process_outgoing(&mut self, packet: BitWriter) -> Result<BitWriter, ProcessorError>;

    /// `Ok(None)` means the stage consumed the packet
    fn process_incoming(&mut self, packet: BitWriter) -> Result<Option<BitWriter>, ProcessorError>;

    fn is_initialized(&self) -> bool {
        true
    }

    fn tick(&mut self, _delta_seconds: f64) -> Result<(), ProcessorError> {
        Ok(())
    }

    /// Packets the stage wants sent, before later stages transform them
    fn drain_self_originated(&mut self) -> Vec<BitWriter> {
        Vec::new()
    }

    /// Upper bound on the bits this stage adds to a packet
    fn reserved_bits(&self) -> usize {
        0
    }

    /// Negotiated `(incoming, outgoing)` packet sequences, once known
    fn initial_sequences(&self) -> Option<(PacketId, PacketId)> {
        None
    }
}

/// The ordered stage pipeline of one connection
#[derive(Default)]
pub struct PacketProcessor {
    stages: Vec<Box<dyn PacketStage>>,
}

impl PacketProcessor {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    pub fn with_stage<S: PacketStage + 'static>(mut self, stage: S) -> Self {
        self.add_stage(Box::new(stage));
        self
    }

    pub fn add_stage(&mut self, stage: Box<dyn PacketStage>) {
        self.stages.push(stage);
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn is_fully_initialized(&self) -> bool {
        self.stages.iter().all(|stage| stage.is_initialized())
    }

    /// Bits the connection must leave free in every packet
    pub fn reserved_bits(&self) -> usize {
        if self.stages.is_empty() {
            return 0;
        }
        1 + self.stages.iter().map(|stage| stage.reserved_bits()).sum::<usize>()
    }

    pub fn initial_sequences(&self) -> Option<(PacketId, PacketId)> {
        self.stages.iter().find_map(|stage| stage.initial_sequences())
    }

    pub fn tick(&mut self, delta_seconds: f64) -> Result<(), ProcessorError> {
        for stage in self.stages.iter_mut() {
            stage.tick(delta_seconds)?;
        }
        Ok(())
    }

    pub fn process_outgoing(&mut self, packet: &BitWriter) -> Result<Vec<u8>, ProcessorError> {
        if self.stages.is_empty() {
            return Ok(packet.to_bytes());
        }
        let mut packet = packet.clone();
        for stage in self.stages.iter_mut() {
            packet = stage.process_outgoing(packet)?;
        }
        Ok(terminate(packet))
    }

    pub fn process_incoming(&mut self, bytes: &[u8]) -> Result<Option<BitWriter>, ProcessorError> {
        if self.stages.is_empty() {
            return Ok(Some(BitWriter::from_bytes(bytes)));
        }

        let num_bits = packet_bit_length(bytes).ok_or(ProcessorError::MissingTerminator)?;
        let mut packet = BitWriter::from_bits(bytes, num_bits)
            .map_err(|_| ProcessorError::MissingTerminator)?;

        for stage in self.stages.iter_mut().rev() {
            match stage.process_incoming(packet)? {
                Some(next) => packet = next,
                None => {
                    trace!("Packet consumed by stage '{}'", stage.name());
                    return Ok(None);
                }
            }
        }
        Ok(Some(packet))
    }

    /// Stage-originated packets, run through every stage after their origin
    /// and ready for the wire
    pub fn drain_self_originated_packets(&mut self) -> Result<Vec<Vec<u8>>, ProcessorError> {
        let mut output = Vec::new();
        for origin in 0..self.stages.len() {
            for mut packet in self.stages[origin].drain_self_originated() {
                for stage in self.stages[origin + 1..].iter_mut() {
                    packet = stage.process_outgoing(packet)?;
                }
                output.push(terminate(packet));
            }
        }
        Ok(output)
    }
}

fn terminate(mut packet: BitWriter) -> Vec<u8> {
    packet.write_bit(true);
    packet.into_bytes()
}
