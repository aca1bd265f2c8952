/// Absolute outgoing/incoming packet id. Travels on the wire wrapped by
/// `MAX_PACKET_ID` and is reconstructed on receipt.
pub type PacketId = i32;
/// Absolute per-channel reliable sequence, wrapped on the wire by the
/// configured channel sequence modulus.
pub type ChannelSequence = i32;
pub type ChannelIndex = usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HostType {
    Server,
    Client,
}

impl HostType {
    pub fn invert(self) -> Self {
        match self {
            HostType::Server => HostType::Client,
            HostType::Client => HostType::Server,
        }
    }
}

/// The inclusive range of packet ids a multi-segment send was written into
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketIdRange {
    pub first: PacketId,
    pub last: PacketId,
}

impl PacketIdRange {
    pub fn single(packet_id: PacketId) -> Self {
        Self {
            first: packet_id,
            last: packet_id,
        }
    }

    pub fn extend(self, packet_id: PacketId) -> Self {
        Self {
            first: self.first.min(packet_id),
            last: self.last.max(packet_id),
        }
    }

    pub fn contains(&self, packet_id: PacketId) -> bool {
        self.first <= packet_id && packet_id <= self.last
    }
}
