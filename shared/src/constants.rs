use crate::types::ChannelIndex;

// Packet framing

/// Packet ids travel modulo this value
pub const MAX_PACKET_ID: u32 = 16384;
/// Bits taken by the wrapped packet id at the head of every packet
pub const PACKET_HEADER_BITS: usize = 14;
/// The terminator bit closing every packet
pub const PACKET_TRAILER_BITS: usize = 1;
/// Upper bound on the encoded size of one ack entry
pub const MAX_ACK_BITS: usize = 1 + PACKET_HEADER_BITS + 1 + 8 + 5 * 8;

// Channels

pub const CONTROL_CHANNEL_INDEX: ChannelIndex = 0;
pub const VOICE_CHANNEL_INDEX: ChannelIndex = 1;
/// First index handed out when a channel is created without an explicit index
pub const FIRST_DYNAMIC_CHANNEL_INDEX: ChannelIndex = 2;
/// Channel types travel modulo this value
pub const CHANNEL_TYPE_MAX: u32 = 8;

pub const DEFAULT_MAX_CHANNELS: usize = 10240;
pub const DEFAULT_MAX_CHANNEL_SEQUENCE: u32 = 1024;
pub const DEFAULT_RELIABLE_BUFFER: usize = 256;
pub const DEFAULT_MAX_PARTIAL_BYTES: usize = 64 * 1024;
pub const DEFAULT_PARTIAL_RELIABLE_THRESHOLD: usize = 8;

// Flow control & statistics

pub const MIN_BANDWIDTH_BYTES_PER_SECOND: u32 = 1800;
pub const DEFAULT_BANDWIDTH_BYTES_PER_SECOND: u32 = 10_000;
/// UDP/IP header bytes charged against the bandwidth budget for each packet
pub const DEFAULT_PACKET_OVERHEAD_BYTES: usize = 28;
/// Seconds between statistics snapshots
pub const STAT_PERIOD: f64 = 1.0;
pub const DEFAULT_ACK_HISTORY_SIZE: usize = 256;
