pub mod channel;
pub mod channel_kind;
pub mod channel_table;
pub mod error;
pub mod partial;

pub use channel::{
    Channel, ChannelReceive, ReceiveLimits, ReceivedSegment, SendLimits, SendOptions,
    SequenceCounters,
};
pub use channel_kind::ChannelKind;
pub use channel_table::ChannelTable;
pub use error::{ChannelError, SegmentError};
