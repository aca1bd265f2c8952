use thiserror::Error;

/// Failures of the pre-transport processing stages. Any of these on an
/// incoming packet is treated as a security violation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessorError {
    /// Empty datagram or one whose last byte is zero
    #[error("Processed packet has no terminator bit (SECURITY: corrupt or malicious packet)")]
    MissingTerminator,

    /// Handshake packet cut short
    #[error("Handshake packet ended after {bits} bits (SECURITY: corrupt or malicious packet)")]
    MalformedHandshake { bits: usize },

    /// Handshake message this side never expects to receive
    #[error("Received a {kind} handshake packet, which this side never expects")]
    UnexpectedHandshake { kind: &'static str },

    /// Cookie that was not signed by either live secret
    #[error("Handshake cookie failed verification against secret {secret_id} (SECURITY: forged or corrupted cookie)")]
    InvalidCookie { secret_id: u8 },

    /// The system random source failed while generating a secret
    #[error("Could not draw handshake secret from the system random source")]
    RandomUnavailable,

    /// A user supplied stage failed
    #[error("Packet stage '{stage}' failed: {reason}")]
    StageFailed { stage: &'static str, reason: String },
}
