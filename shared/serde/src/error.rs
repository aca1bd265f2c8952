use thiserror::Error;

/// Raised when a read runs past the end of a bit stream, or a write runs
/// past a writer's capacity. Readers and writers also latch the condition
/// so later checks can observe it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("bit stream overflow: not enough bits to complete the operation")]
pub struct SerdeErr;
