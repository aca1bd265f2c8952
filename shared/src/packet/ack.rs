use tether_serde::{BitReader, BitWrite, BitWriter};

use crate::{
    packet::error::PacketError,
    types::{HostType, PacketId},
    wrapping_number::{read_packet_id, write_packet_id},
};

/// One acknowledged packet, with the feedback piggybacked on it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AckRecord {
    pub packet_id: PacketId,
    pub has_frame_time: bool,
    /// Server frame time in milliseconds. Only a server ever writes it.
    pub frame_time_ms: Option<u8>,
    /// The acking side's inbound rate, in KB/s
    pub remote_kbytes_per_second: u32,
}

impl AckRecord {
    /// Writes the ack entry, discriminator included. `sender` is the host
    /// writing the entry.
    pub fn write(&self, writer: &mut BitWriter, sender: HostType) {
        writer.write_bit(true);
        write_packet_id(writer, self.packet_id);
        writer.write_bit(self.has_frame_time);
        if self.has_frame_time && sender == HostType::Server {
            writer.write_byte(self.frame_time_ms.unwrap_or(0));
        }
        writer.write_int_packed(self.remote_kbytes_per_second);
    }

    /// Reads an ack entry whose discriminator was already consumed. The
    /// acked id is rebuilt against the last id the reader saw acked.
    pub fn read(
        reader: &mut BitReader,
        reference: PacketId,
        sender: HostType,
    ) -> Result<Self, PacketError> {
        let packet_id = read_packet_id(reader, reference).map_err(|_| PacketError::TruncatedAck)?;
        let has_frame_time = reader.read_bit().map_err(|_| PacketError::TruncatedAck)?;
        let frame_time_ms = if has_frame_time && sender == HostType::Server {
            Some(reader.read_byte().map_err(|_| PacketError::TruncatedAck)?)
        } else {
            None
        };
        let remote_kbytes_per_second =
            reader.read_int_packed().map_err(|_| PacketError::TruncatedAck)?;

        Ok(Self {
            packet_id,
            has_frame_time,
            frame_time_ms,
            remote_kbytes_per_second,
        })
    }

    /// Encoded size, discriminator included
    pub fn bit_length(&self, sender: HostType) -> usize {
        let mut writer = BitWriter::new();
        self.write(&mut writer, sender);
        writer.num_bits()
    }
}
