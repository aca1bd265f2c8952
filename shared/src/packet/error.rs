use thiserror::Error;

/// Malformed wire input. Every variant closes the connection: a
/// well-behaved peer cannot produce any of them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    /// Empty datagram
    #[error("Received a zero-length packet (SECURITY: a well-behaved peer never sends one)")]
    ZeroLength,

    /// No terminator bit in the final byte
    #[error("Packet's last byte is zero so it carries no terminator bit (SECURITY: corrupt or malicious packet)")]
    MissingTerminator,

    /// The packet ended inside its packet id
    #[error("Packet ended before its packet id could be read")]
    TruncatedPacketId,

    /// The packet ended inside an ack entry
    #[error("Packet ended inside an ack entry (SECURITY: corrupt or malicious packet)")]
    TruncatedAck,

    /// The packet ended inside a segment header
    #[error("Packet ended inside a segment header (SECURITY: corrupt or malicious packet)")]
    TruncatedSegment,

    /// Declared payload runs past the end of the packet
    #[error("Segment declares {payload_bits} payload bits but only {bits_left} remain (SECURITY: corrupt or malicious packet)")]
    PayloadOverflow { payload_bits: usize, bits_left: usize },

    /// Channel index outside the channel table
    #[error("Segment addresses channel {index}, outside the table of {max_channels} channels (SECURITY: corrupt or malicious packet)")]
    InvalidChannelIndex { index: usize, max_channels: usize },

    /// Channel type that maps to no known channel kind
    #[error("Segment carries unknown channel type {channel_type} (SECURITY: corrupt or malicious packet)")]
    UnknownChannelType { channel_type: u32 },

    /// Ack entry arriving on a connection that never exchanges acks
    #[error("Received an ack entry on a connection that does not use acks")]
    UnexpectedAck,
}
