use std::fmt;

/// The closed set of channel kinds a connection can carry. Reliability and
/// framing are identical for every kind, the kind only decides which
/// capabilities the channel exposes and how its payload is interpreted
/// further up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Connection-level control traffic, always at index 0
    Control,
    /// Object replication traffic
    Actor,
    /// Bulk transfer
    File,
    /// Voice, at its fixed index and openable from either side
    Voice,
}

impl ChannelKind {
    pub fn to_wire(self) -> u32 {
        match self {
            ChannelKind::Control => 1,
            ChannelKind::Actor => 2,
            ChannelKind::File => 3,
            ChannelKind::Voice => 4,
        }
    }

    pub fn from_wire(value: u32) -> Option<Self> {
        match value {
            1 => Some(ChannelKind::Control),
            2 => Some(ChannelKind::Actor),
            3 => Some(ChannelKind::File),
            4 => Some(ChannelKind::Voice),
            _ => None,
        }
    }

    pub fn is_control(self) -> bool {
        self == ChannelKind::Control
    }

    /// Both peers may send the open for this kind
    pub fn opens_from_either_side(self) -> bool {
        self == ChannelKind::Voice
    }

    /// Whether the channel can go dormant instead of closing outright
    pub fn supports_dormancy(self) -> bool {
        self == ChannelKind::Actor
    }

    /// Whether the channel takes part in the per-tick pass
    pub fn ticks(self) -> bool {
        matches!(self, ChannelKind::Actor | ChannelKind::File)
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelKind::Control => "Control",
            ChannelKind::Actor => "Actor",
            ChannelKind::File => "File",
            ChannelKind::Voice => "Voice",
        };
        f.write_str(name)
    }
}
