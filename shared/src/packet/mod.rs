pub mod ack;
pub mod error;
pub mod segment;

pub use ack::AckRecord;
pub use error::PacketError;
pub use segment::{Segment, SegmentFlags, SegmentLayout};
