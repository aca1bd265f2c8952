use std::fmt;

use crate::{channel::ChannelKind, types::ChannelIndex};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Pending,
    Open,
    /// Terminal
    Closed,
}

/// Why a connection closed. The only failure information that reaches the
/// application.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CloseReason {
    Explicit,
    Timeout,
    MalformedPacket,
    IllegalSegment,
    SecurityViolation,
    HandshakeNotReady,
    ReliableBufferOverflow,
    ControlChannelClosed,
    ExcessErrorRate,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CloseReason::Explicit => "closed explicitly",
            CloseReason::Timeout => "timed out",
            CloseReason::MalformedPacket => "received a malformed packet",
            CloseReason::IllegalSegment => "received an illegal segment",
            CloseReason::SecurityViolation => "peer violated the protocol",
            CloseReason::HandshakeNotReady => "tried to send before the handshake completed",
            CloseReason::ReliableBufferOverflow => "reliable buffer overflowed",
            CloseReason::ControlChannelClosed => "control channel closed",
            CloseReason::ExcessErrorRate => "peer caused too many errors",
        };
        f.write_str(text)
    }
}

/// Lifecycle notifications, drained with `Connection::take_events`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Packet sequences are set and data may flow
    Initialized,
    ChannelOpened {
        index: ChannelIndex,
        kind: ChannelKind,
    },
    ChannelClosed {
        index: ChannelIndex,
        dormant: bool,
    },
    Closed {
        reason: CloseReason,
    },
}
