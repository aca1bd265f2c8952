use thiserror::Error;

use crate::{
    channel::error::{ChannelError, SegmentError},
    packet::error::PacketError,
    packet_processor::error::ProcessorError,
    transport::error::TransportError,
};

/// Settings that cannot work together
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A modulus or ring size that must be a power of two
    #[error("{field} must be a power of two, got {value}")]
    NotPowerOfTwo { field: &'static str, value: usize },

    /// A size or count that must be positive
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    /// A packet too small to hold one full segment header and a byte of payload
    #[error("max_packet_size of {max_packet_size} bytes is below the minimum of {min_bytes} bytes")]
    PacketTooSmall {
        max_packet_size: usize,
        min_bytes: usize,
    },

    /// Packets larger than the datagram size the protocol is tuned for
    #[error("max_packet_size of {max_packet_size} bytes exceeds the maximum of {max_bytes} bytes")]
    PacketTooLarge {
        max_packet_size: usize,
        max_bytes: usize,
    },

    /// The reliable window must stay within half the sequence space, or
    /// wrapped sequences become ambiguous
    #[error("reliable_buffer of {reliable_buffer} needs max_channel_sequence above {min_sequence}, got {max_channel_sequence}")]
    SequenceSpaceTooSmall {
        reliable_buffer: usize,
        max_channel_sequence: u32,
        min_sequence: usize,
    },

    /// The packet processor reserves so much of each packet that no segment
    /// fits in what remains
    #[error("max_packet_size of {max_packet_size} bytes leaves no room for a segment after {reserved_bits} reserved processor bits")]
    ProcessorOverhead {
        max_packet_size: usize,
        reserved_bits: usize,
    },

    /// The table cannot hold the reserved control and voice channels
    #[error("max_channels must be at least {min_channels}, got {max_channels}")]
    TooFewChannels {
        max_channels: usize,
        min_channels: usize,
    },
}

/// Any error a connection can report, for callers that do not care which
/// layer raised it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// Config error
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Channel error
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Segment error
    #[error("Segment error: {0}")]
    Segment(#[from] SegmentError),

    /// Packet error
    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),

    /// Processor error
    #[error("Packet processor error: {0}")]
    Processor(#[from] ProcessorError),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}
