use crate::types::PacketId;

/// Keeps track of the acks this side owes the peer and of how far the
/// peer has acked this side's packets.
///
/// Every ack is written twice: once when its packet arrives, and once more
/// after the packet carrying it has been flushed, in case that one is lost.
pub struct AckManager {
    queued_acks: Vec<PacketId>,
    resend_acks: Vec<PacketId>,
    out_ack_packet_id: PacketId,
}

impl AckManager {
    pub fn new() -> Self {
        Self {
            queued_acks: Vec::new(),
            resend_acks: Vec::new(),
            out_ack_packet_id: -1,
        }
    }

    /// Highest outgoing packet id the peer has acked
    pub fn out_ack_packet_id(&self) -> PacketId {
        self.out_ack_packet_id
    }

    pub fn reset(&mut self, out_ack_packet_id: PacketId) {
        self.out_ack_packet_id = out_ack_packet_id;
        self.queued_acks.clear();
        self.resend_acks.clear();
    }

    /// Remembers an ack written for the first time
    pub fn queue(&mut self, packet_id: PacketId) {
        self.queued_acks.push(packet_id);
    }

    /// Acks due for their second write
    pub fn take_resend(&mut self) -> Vec<PacketId> {
        std::mem::take(&mut self.resend_acks)
    }

    /// Called when a packet is flushed: everything it acked becomes due for
    /// a resend
    pub fn promote_queued(&mut self) {
        self.resend_acks.append(&mut self.queued_acks);
    }

    /// Records an incoming ack. Returns every outgoing packet id skipped
    /// over since the previous highest ack, oldest first. Those were lost.
    pub fn register_ack(&mut self, packet_id: PacketId) -> Vec<PacketId> {
        if packet_id <= self.out_ack_packet_id {
            return Vec::new();
        }
        let naks = ((self.out_ack_packet_id + 1)..packet_id).collect();
        self.out_ack_packet_id = packet_id;
        naks
    }
}

impl Default for AckManager {
    fn default() -> Self {
        Self::new()
    }
}
