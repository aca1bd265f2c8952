use tether_serde::{wrapped_bit_count, BitReader, BitWrite, BitWriter};

use crate::{
    channel::channel_kind::ChannelKind,
    constants::CHANNEL_TYPE_MAX,
    packet::error::PacketError,
    types::{ChannelIndex, ChannelSequence, PacketId},
    wrapping_number::{read_relative, write_wrapped},
};

/// Flags carried in every segment header
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SegmentFlags {
    pub open: bool,
    pub close: bool,
    /// Only meaningful alongside `close`
    pub dormant: bool,
    pub reliable: bool,
    pub partial: bool,
    pub partial_initial: bool,
    pub partial_final: bool,
    pub replication_paused: bool,
    pub has_exports: bool,
    pub has_must_be_mapped: bool,
}

impl SegmentFlags {
    pub fn is_control(&self) -> bool {
        self.open || self.close
    }
}

/// The connection-wide moduli a segment header is encoded against
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SegmentLayout {
    pub max_channels: u32,
    pub max_channel_sequence: u32,
    pub max_payload_bits: u32,
    pub internal_ack: bool,
}

impl SegmentLayout {
    /// Largest header any segment can need under this layout
    pub fn max_header_bits(&self) -> usize {
        let bits = 1 // ack discriminator
            + 1 + 3 // control, open, close, dormant
            + 1 + 1 // replication paused, reliable
            + wrapped_bit_count(self.max_channels)
            + 1 + 1 + 1 // exports, must be mapped, partial
            + wrapped_bit_count(self.max_channel_sequence)
            + 2 // partial initial, partial final
            + wrapped_bit_count(CHANNEL_TYPE_MAX)
            + wrapped_bit_count(self.max_payload_bits);
        bits as usize
    }
}

/// One framed message on one channel
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub channel_index: ChannelIndex,
    /// Present on the wire only for reliable or opening segments
    pub kind: Option<ChannelKind>,
    /// The reliable sequence, or for an unreliable segment the packet id it
    /// arrived in
    pub sequence: ChannelSequence,
    /// Packet the segment was last written into or read from
    pub packet_id: PacketId,
    pub flags: SegmentFlags,
    pub payload: BitWriter,
}

impl Segment {
    pub fn new(
        channel_index: ChannelIndex,
        kind: ChannelKind,
        flags: SegmentFlags,
        payload: BitWriter,
    ) -> Self {
        Self {
            channel_index,
            kind: Some(kind),
            sequence: 0,
            packet_id: -1,
            flags,
            payload,
        }
    }

    /// Writes the header, discriminator included. The payload is appended
    /// separately so it never has to be copied into a temporary buffer.
    pub fn write_header(&self, writer: &mut BitWriter, layout: &SegmentLayout) {
        let flags = &self.flags;

        writer.write_bit(false);

        let control = flags.is_control();
        writer.write_bit(control);
        if control {
            writer.write_bit(flags.open);
            writer.write_bit(flags.close);
            if flags.close {
                writer.write_bit(flags.dormant);
            }
        }

        writer.write_bit(flags.replication_paused);
        writer.write_bit(flags.reliable);
        writer.write_int_wrapped(self.channel_index as u32, layout.max_channels);
        writer.write_bit(flags.has_exports);
        writer.write_bit(flags.has_must_be_mapped);
        writer.write_bit(flags.partial);

        if flags.reliable && !layout.internal_ack {
            write_wrapped(writer, self.sequence, layout.max_channel_sequence);
        }

        if flags.partial {
            writer.write_bit(flags.partial_initial);
            writer.write_bit(flags.partial_final);
        }

        if flags.reliable || flags.open {
            let channel_type = self.kind.map_or(0, ChannelKind::to_wire);
            writer.write_int_wrapped(channel_type, CHANNEL_TYPE_MAX);
        }

        writer.write_int_wrapped(self.payload.num_bits() as u32, layout.max_payload_bits);
    }

    /// Reads a segment whose ack discriminator has already been consumed.
    /// `in_reliable` yields the last processed reliable sequence of a
    /// channel, the reference its wrapped sequence is rebuilt against.
    pub fn read<F>(
        reader: &mut BitReader,
        packet_id: PacketId,
        layout: &SegmentLayout,
        in_reliable: F,
    ) -> Result<Self, PacketError>
    where
        F: Fn(ChannelIndex) -> ChannelSequence,
    {
        let mut flags = SegmentFlags::default();

        let control = reader.read_bit().map_err(|_| PacketError::TruncatedSegment)?;
        if control {
            flags.open = reader.read_bit().map_err(|_| PacketError::TruncatedSegment)?;
            flags.close = reader.read_bit().map_err(|_| PacketError::TruncatedSegment)?;
            if flags.close {
                flags.dormant = reader.read_bit().map_err(|_| PacketError::TruncatedSegment)?;
            }
        }

        flags.replication_paused = reader.read_bit().map_err(|_| PacketError::TruncatedSegment)?;
        flags.reliable = reader.read_bit().map_err(|_| PacketError::TruncatedSegment)?;

        let channel_index = reader
            .read_int_wrapped(layout.max_channels)
            .map_err(|_| PacketError::TruncatedSegment)? as usize;
        if channel_index >= layout.max_channels as usize {
            reader.set_error();
            return Err(PacketError::InvalidChannelIndex {
                index: channel_index,
                max_channels: layout.max_channels as usize,
            });
        }

        flags.has_exports = reader.read_bit().map_err(|_| PacketError::TruncatedSegment)?;
        flags.has_must_be_mapped = reader.read_bit().map_err(|_| PacketError::TruncatedSegment)?;
        flags.partial = reader.read_bit().map_err(|_| PacketError::TruncatedSegment)?;

        let sequence = if !flags.reliable {
            packet_id
        } else if layout.internal_ack {
            in_reliable(channel_index) + 1
        } else {
            read_relative(reader, in_reliable(channel_index), layout.max_channel_sequence)
                .map_err(|_| PacketError::TruncatedSegment)?
        };

        if flags.partial {
            flags.partial_initial = reader.read_bit().map_err(|_| PacketError::TruncatedSegment)?;
            flags.partial_final = reader.read_bit().map_err(|_| PacketError::TruncatedSegment)?;
        }

        let kind = if flags.reliable || flags.open {
            let channel_type = reader
                .read_int_wrapped(CHANNEL_TYPE_MAX)
                .map_err(|_| PacketError::TruncatedSegment)?;
            match ChannelKind::from_wire(channel_type) {
                Some(kind) => Some(kind),
                None => {
                    reader.set_error();
                    return Err(PacketError::UnknownChannelType { channel_type });
                }
            }
        } else {
            None
        };

        let payload_bits = reader
            .read_int_wrapped(layout.max_payload_bits)
            .map_err(|_| PacketError::TruncatedSegment)? as usize;
        if payload_bits > reader.bits_left() {
            let bits_left = reader.bits_left();
            reader.set_error();
            return Err(PacketError::PayloadOverflow {
                payload_bits,
                bits_left,
            });
        }
        let payload = reader
            .read_bits(payload_bits)
            .map_err(|_| PacketError::TruncatedSegment)?;

        Ok(Self {
            channel_index,
            kind,
            sequence,
            packet_id,
            flags,
            payload,
        })
    }
}
