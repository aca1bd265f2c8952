use thiserror::Error;

/// Errors raised at the boundary between a connection and its socket
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The socket refused or failed to send a datagram
    #[error("Failed to send packet of {len} bytes: {reason}")]
    SendFailed { len: usize, reason: String },

    /// The socket failed while receiving
    #[error("Failed to receive packet: {reason}")]
    ReceiveFailed { reason: String },

    /// The other end of an in-process link is gone
    #[error("Packet link is disconnected")]
    Disconnected,

    /// The socket could not be bound or configured
    #[error("Failed to bind socket to {address}: {reason}")]
    BindFailed { address: String, reason: String },
}
