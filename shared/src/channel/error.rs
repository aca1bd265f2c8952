use thiserror::Error;

use crate::{
    channel::channel_kind::ChannelKind,
    types::{ChannelIndex, ChannelSequence},
};

/// Local misuse of the channel API. None of these put anything on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// No channel lives at the index
    #[error("No channel open at index {index}")]
    UnknownChannel { index: ChannelIndex },

    /// A channel already lives at the index
    #[error("Channel index {index} is already in use")]
    ChannelInUse { index: ChannelIndex },

    /// Index outside the channel table
    #[error("Channel index {index} is outside the table of {max_channels} channels")]
    IndexOutOfRange {
        index: ChannelIndex,
        max_channels: usize,
    },

    /// Reserved index requested for the wrong kind, or a reserved kind placed
    /// at the wrong index
    #[error("Channel index {index} cannot hold a {kind} channel. Index 0 is reserved for Control and index 1 for Voice")]
    ReservedIndex {
        index: ChannelIndex,
        kind: ChannelKind,
    },

    /// Every non-control channel needs the control channel at index 0
    #[error("Cannot open a {kind} channel before the control channel exists")]
    ControlChannelMissing { kind: ChannelKind },

    /// Nothing free to hand out
    #[error("No free channel index left for a {kind} channel")]
    TableFull { kind: ChannelKind },

    /// Only the side that opened a channel may close it, except for control
    #[error("Channel {index} was opened by the remote side and cannot be closed locally")]
    NotOpenedLocally { index: ChannelIndex },

    /// The channel already sent its close
    #[error("Channel {index} is closing and accepts no further sends")]
    Closing { index: ChannelIndex },

    /// The connection is closed
    #[error("Connection is closed")]
    ConnectionClosed,

    /// The packet processor has not finished its handshake yet
    #[error("Cannot send before the connection handshake completes")]
    HandshakePending,

    /// Flow control refused the send
    #[error("Channel {index} is saturated, retry after the next tick")]
    Saturated { index: ChannelIndex },

    /// Payload larger than a reassembled message may ever be
    #[error("Payload of {bytes} bytes exceeds the maximum of {max_bytes} bytes")]
    PayloadTooLarge { bytes: usize, max_bytes: usize },

    /// A channel opened with an unreliable segment is temporary and never
    /// carries reliable data
    #[error("Channel {index} was opened unreliably and cannot carry reliable segments")]
    ReliableOnTemporary { index: ChannelIndex },

    /// An unreliable open only survives on the wire alongside a close or as
    /// the head of a partial
    #[error("Channel {index} must be opened reliably unless the opening send also closes it or is fragmented")]
    UnreliableOpen { index: ChannelIndex },

    /// Not enough room in the outstanding reliable window. Closes the
    /// connection.
    #[error("Channel {index} has {outstanding} outstanding reliable segments and cannot queue {needed} more")]
    ReliableBufferOverflow {
        index: ChannelIndex,
        outstanding: usize,
        needed: usize,
    },

    /// Dormancy requested on a kind that has none
    #[error("{kind} channels do not support dormancy")]
    DormancyUnsupported { kind: ChannelKind },

    /// A single segment larger than an empty packet
    #[error("Segment of {bits} bits cannot fit an empty packet of {max_bits} free bits")]
    SegmentTooLarge { bits: usize, max_bits: usize },
}

/// Channel protocol violations by the peer. The segment is rejected and the
/// ack for its packet withheld, so the peer retransmits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SegmentError {
    /// Non-control traffic before the control channel exists
    #[error("Received a segment for channel {index} before the control channel exists")]
    ControlChannelMissing { index: ChannelIndex },

    /// Unreliable segment for a missing channel that is no temporary open
    #[error("Received an unreliable segment for missing channel {index} that does not open it (SECURITY: only open+close or open+partial may create a channel unreliably)")]
    InvalidTemporaryOpen { index: ChannelIndex },

    /// Open that the channel table refused
    #[error("Peer tried to open channel {index} with a channel kind the index cannot hold")]
    IllegalOpen { index: ChannelIndex },

    /// Data for a remote channel whose open was never processed
    #[error("Received data for channel {index} before its open segment (sequence {sequence})")]
    NotOpen {
        index: ChannelIndex,
        sequence: ChannelSequence,
    },

    /// Too many out-of-order reliable segments queued
    #[error("Channel {index} already queues {queued} out-of-order reliable segments (SECURITY: peer is flooding the reorder buffer)")]
    ReliableBufferFull { index: ChannelIndex, queued: usize },

    /// Fragment that does not continue the partial in progress
    #[error("Partial segment {sequence} on channel {index} does not continue the partial in progress")]
    PartialMismatch {
        index: ChannelIndex,
        sequence: ChannelSequence,
    },

    /// An unreliable fragment would replace an unfinished reliable partial
    #[error("Unreliable partial segment on channel {index} tried to replace an unfinished reliable partial")]
    UnreliableOverReliablePartial { index: ChannelIndex },

    /// Non-final fragment not ending on a byte boundary
    #[error("Non-final partial segment on channel {index} carries {bits} bits, which is not byte aligned")]
    UnalignedPartial { index: ChannelIndex, bits: usize },

    /// Reassembled message past the size cap
    #[error("Partial message on channel {index} grew to {bytes} bytes, above the maximum of {max_bytes} (SECURITY: possible memory exhaustion attempt)")]
    PartialTooLarge {
        index: ChannelIndex,
        bytes: usize,
        max_bytes: usize,
    },
}
