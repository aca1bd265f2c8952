//! # Tether Shared
//! Reliable, ordered, multi-channel connections over an unreliable packet
//! transport. A [`Connection`] turns application sends into packets of
//! acks and segments, and turns packets from the peer back into complete
//! messages.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

#[macro_use]
extern crate cfg_if;

pub use tether_serde::{BitReader, BitWrite, BitWriter, SerdeErr, MTU_SIZE_BITS, MTU_SIZE_BYTES};

mod channel;
mod connection;
mod constants;
mod packet;
mod packet_processor;
mod sequence_list;
mod transport;
mod types;
mod wrapping_number;

pub use channel::{
    channel_kind::ChannelKind,
    error::{ChannelError, SegmentError},
    Channel, ChannelReceive, ChannelTable, ReceiveLimits, ReceivedSegment, SendLimits,
    SendOptions, SequenceCounters,
};
pub use connection::{
    ack_manager::AckManager,
    bandwidth_monitor::{BandwidthMonitor, ConnectionStats},
    flow_control::FlowControl,
    ping_store::{PingStore, SentPacket},
    security_tracker::SecurityTracker,
    CloseReason, ConfigError, Connection, ConnectionConfig, ConnectionError, ConnectionEvent,
    ConnectionState, SecurityConfig,
};
pub use constants::*;
pub use packet::{AckRecord, PacketError, Segment, SegmentFlags, SegmentLayout};
pub use packet_processor::{
    HandshakeConfig, PacketProcessor, PacketStage, ProcessorError, StatelessHandshake,
};
pub use sequence_list::{SequenceError, SequenceList};
pub use transport::{InboundQueue, PacketSender, TransportError};
pub use types::{ChannelIndex, ChannelSequence, HostType, PacketId, PacketIdRange};
pub use wrapping_number::{read_packet_id, read_relative, write_packet_id, write_wrapped};

cfg_if! {
    if #[cfg(feature = "transport_udp")] {
        pub use transport::udp::{bind as bind_udp, UdpPacketReceiver, UdpPacketSender};
    }
}
