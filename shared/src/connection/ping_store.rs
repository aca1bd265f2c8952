use crate::types::PacketId;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SentPacket {
    pub packet_id: PacketId,
    /// Connection time the packet was flushed at
    pub sent_time: f64,
    /// Outgoing rate when it was flushed, in KB/s
    pub out_kbytes_per_second: u32,
}

/// Ring of recently sent packets, for turning acks into lag samples
pub struct PingStore {
    slots: Vec<Option<SentPacket>>,
}

impl PingStore {
    /// `size` must be a power of two
    pub fn new(size: usize) -> Self {
        Self {
            slots: vec![None; size],
        }
    }

    fn slot(&self, packet_id: PacketId) -> usize {
        (packet_id as usize) & (self.slots.len() - 1)
    }

    pub fn record(&mut self, packet_id: PacketId, sent_time: f64, out_kbytes_per_second: u32) {
        let slot = self.slot(packet_id);
        self.slots[slot] = Some(SentPacket {
            packet_id,
            sent_time,
            out_kbytes_per_second,
        });
    }

    /// The record for `packet_id`, if its slot has not been reused. A record
    /// is handed out once.
    pub fn take(&mut self, packet_id: PacketId) -> Option<SentPacket> {
        let slot = self.slot(packet_id);
        match self.slots[slot] {
            Some(sent) if sent.packet_id == packet_id => self.slots[slot].take(),
            _ => None,
        }
    }
}
