use crate::{
    channel::error::SegmentError,
    packet::Segment,
    types::{ChannelSequence, PacketId},
};

/// A fragmented message being reassembled. Holds the initial fragment with
/// every later payload appended to it.
#[derive(Debug)]
pub struct PartialAssembly {
    segment: Segment,
    last_packet_id: PacketId,
}

impl PartialAssembly {
    pub fn begin(fragment: Segment, max_bytes: usize) -> Result<Self, SegmentError> {
        check_alignment(&fragment)?;
        let assembly = Self {
            last_packet_id: fragment.packet_id,
            segment: fragment,
        };
        assembly.check_size(max_bytes)?;
        Ok(assembly)
    }

    pub fn is_reliable(&self) -> bool {
        self.segment.flags.reliable
    }

    pub fn is_complete(&self) -> bool {
        self.segment.flags.partial_final
    }

    pub fn sequence(&self) -> ChannelSequence {
        self.segment.sequence
    }

    pub fn num_bytes(&self) -> usize {
        self.segment.payload.num_bytes()
    }

    /// Whether `fragment` is the next piece of this message. Reliable
    /// fragments must be consecutive. Unreliable fragments carry their packet
    /// id as sequence, and several may share one packet.
    pub fn continues(&self, fragment: &Segment) -> bool {
        if self.is_complete() || fragment.flags.reliable != self.is_reliable() {
            return false;
        }
        let next = fragment.sequence == self.segment.sequence + 1;
        if self.is_reliable() {
            next
        } else {
            next || fragment.sequence == self.segment.sequence
        }
    }

    pub fn append(&mut self, fragment: Segment, max_bytes: usize) -> Result<(), SegmentError> {
        check_alignment(&fragment)?;

        self.segment.payload.write_bits(&fragment.payload);
        self.segment.sequence = fragment.sequence;
        self.last_packet_id = fragment.packet_id;

        if fragment.flags.partial_final {
            let flags = &mut self.segment.flags;
            flags.partial_final = true;
            flags.close = fragment.flags.close;
            flags.dormant = fragment.flags.dormant;
            flags.replication_paused = fragment.flags.replication_paused;
            flags.has_must_be_mapped = fragment.flags.has_must_be_mapped;
        }

        self.check_size(max_bytes)
    }

    /// The reassembled segment, with the id of the packet its last fragment
    /// arrived in
    pub fn finish(self) -> (Segment, PacketId) {
        (self.segment, self.last_packet_id)
    }

    fn check_size(&self, max_bytes: usize) -> Result<(), SegmentError> {
        let bytes = self.num_bytes();
        if bytes > max_bytes {
            return Err(SegmentError::PartialTooLarge {
                index: self.segment.channel_index,
                bytes,
                max_bytes,
            });
        }
        Ok(())
    }
}

fn check_alignment(fragment: &Segment) -> Result<(), SegmentError> {
    let bits = fragment.payload.num_bits();
    if !fragment.flags.partial_final && bits % 8 != 0 {
        return Err(SegmentError::UnalignedPartial {
            index: fragment.channel_index,
            bits,
        });
    }
    Ok(())
}
