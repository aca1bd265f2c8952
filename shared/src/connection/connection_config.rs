use tether_serde::MTU_SIZE_BYTES;

use crate::{
    connection::error::ConfigError,
    constants::{
        DEFAULT_ACK_HISTORY_SIZE, DEFAULT_BANDWIDTH_BYTES_PER_SECOND, DEFAULT_MAX_CHANNELS,
        DEFAULT_MAX_CHANNEL_SEQUENCE, DEFAULT_MAX_PARTIAL_BYTES, DEFAULT_PACKET_OVERHEAD_BYTES,
        DEFAULT_PARTIAL_RELIABLE_THRESHOLD, DEFAULT_RELIABLE_BUFFER, FIRST_DYNAMIC_CHANNEL_INDEX,
        MIN_BANDWIDTH_BYTES_PER_SECOND, PACKET_HEADER_BITS, PACKET_TRAILER_BITS,
    },
    packet::SegmentLayout,
};

/// Thresholds for closing a connection whose peer keeps misbehaving
#[derive(Clone, Debug)]
pub struct SecurityConfig {
    pub enabled: bool,
    /// Seconds between rate checks
    pub check_interval: f64,
    /// A single check window at or above this rate closes at once
    pub max_events_per_second: f64,
    pub sustained_events_per_second: f64,
    /// Consecutive windows above the sustained rate tolerated before closing
    pub max_sustained_periods: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval: 0.5,
            max_events_per_second: 60.0,
            sustained_events_per_second: 5.0,
            max_sustained_periods: 10,
        }
    }
}

/// Contains Config properties which will be used by a Server or Client
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Largest datagram written, in bytes
    pub max_packet_size: usize,
    /// Outgoing budget, raised to the protocol minimum when set lower
    pub bandwidth_bytes_per_second: u32,
    /// Seconds of silence before an empty packet is sent
    pub keep_alive_interval: f64,
    /// Timeout while the connection is still pending, in seconds
    pub initial_connect_timeout: f64,
    /// Timeout once open, in seconds
    pub connection_timeout: f64,
    /// Timeout once the connection is marked for destruction, in seconds
    pub pending_destroy_timeout: f64,
    /// Packets remembered for lag measurement, a power of two
    pub ack_history_size: usize,
    pub max_channels: usize,
    /// Channel sequences travel modulo this, a power of two
    pub max_channel_sequence: u32,
    /// Reliable segments a channel may have outstanding or queued
    pub reliable_buffer: usize,
    /// Fragment count from which a payload is sent reliably
    pub partial_reliable_threshold: usize,
    /// Bytes charged against the bandwidth budget for each packet sent
    pub packet_overhead: usize,
    pub max_partial_bytes: usize,
    /// For transports that never lose packets: no ids, no acks
    pub internal_ack: bool,
    /// Client asks the server to piggyback its frame time on acks
    pub request_server_frame_time: bool,
    pub security: SecurityConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_packet_size: MTU_SIZE_BYTES,
            bandwidth_bytes_per_second: DEFAULT_BANDWIDTH_BYTES_PER_SECOND,
            keep_alive_interval: 0.2,
            initial_connect_timeout: 60.0,
            connection_timeout: 30.0,
            pending_destroy_timeout: 2.0,
            ack_history_size: DEFAULT_ACK_HISTORY_SIZE,
            max_channels: DEFAULT_MAX_CHANNELS,
            max_channel_sequence: DEFAULT_MAX_CHANNEL_SEQUENCE,
            reliable_buffer: DEFAULT_RELIABLE_BUFFER,
            partial_reliable_threshold: DEFAULT_PARTIAL_RELIABLE_THRESHOLD,
            packet_overhead: DEFAULT_PACKET_OVERHEAD_BYTES,
            max_partial_bytes: DEFAULT_MAX_PARTIAL_BYTES,
            internal_ack: false,
            request_server_frame_time: true,
            security: SecurityConfig::default(),
        }
    }
}

impl ConnectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ack_history_size == 0 || !self.ack_history_size.is_power_of_two() {
            return Err(ConfigError::NotPowerOfTwo {
                field: "ack_history_size",
                value: self.ack_history_size,
            });
        }
        if self.max_channel_sequence == 0 || !self.max_channel_sequence.is_power_of_two() {
            return Err(ConfigError::NotPowerOfTwo {
                field: "max_channel_sequence",
                value: self.max_channel_sequence as usize,
            });
        }
        if self.reliable_buffer == 0 {
            return Err(ConfigError::Zero {
                field: "reliable_buffer",
            });
        }
        if self.max_partial_bytes == 0 {
            return Err(ConfigError::Zero {
                field: "max_partial_bytes",
            });
        }
        if self.max_channels <= FIRST_DYNAMIC_CHANNEL_INDEX {
            return Err(ConfigError::TooFewChannels {
                max_channels: self.max_channels,
                min_channels: FIRST_DYNAMIC_CHANNEL_INDEX + 1,
            });
        }

        let min_sequence = self.reliable_buffer * 2;
        if (self.max_channel_sequence as usize) < min_sequence {
            return Err(ConfigError::SequenceSpaceTooSmall {
                reliable_buffer: self.reliable_buffer,
                max_channel_sequence: self.max_channel_sequence,
                min_sequence,
            });
        }

        if self.max_packet_size > MTU_SIZE_BYTES {
            return Err(ConfigError::PacketTooLarge {
                max_packet_size: self.max_packet_size,
                max_bytes: MTU_SIZE_BYTES,
            });
        }
        let min_bytes = self.min_packet_bytes();
        if self.max_packet_size < min_bytes {
            return Err(ConfigError::PacketTooSmall {
                max_packet_size: self.max_packet_size,
                min_bytes,
            });
        }

        Ok(())
    }

    /// Bandwidth actually used for flow control
    pub fn effective_bandwidth(&self) -> u32 {
        self.bandwidth_bytes_per_second
            .max(MIN_BANDWIDTH_BYTES_PER_SECOND)
    }

    pub fn segment_layout(&self) -> SegmentLayout {
        SegmentLayout {
            max_channels: self.max_channels as u32,
            max_channel_sequence: self.max_channel_sequence,
            max_payload_bits: (self.max_packet_size * 8) as u32,
            internal_ack: self.internal_ack,
        }
    }

    /// Packet framing, one full segment header and a byte of payload
    pub(crate) fn min_send_bits(&self) -> usize {
        PACKET_HEADER_BITS + PACKET_TRAILER_BITS + self.segment_layout().max_header_bits() + 8
    }

    // plus a byte of slack for processor stages
    fn min_packet_bytes(&self) -> usize {
        (self.min_send_bits() + 8).div_ceil(8)
    }
}
