pub mod error;

cfg_if! {
    if #[cfg(feature = "transport_udp")] {
        pub mod udp;
    } else {}
}

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, PoisonError},
};

pub use error::TransportError;

/// Where a connection hands its finished datagrams
pub trait PacketSender: Send + Sync {
    /// Sends one datagram to the remote peer
    fn send(&self, payload: &[u8]) -> Result<(), TransportError>;
}

/// Datagrams waiting to be processed by a connection. The socket side
/// pushes from any thread, the connection drains at the start of its tick.
#[derive(Clone, Default)]
pub struct InboundQueue {
    packets: Arc<Mutex<VecDeque<Box<[u8]>>>>,
}

impl InboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, payload: &[u8]) {
        self.packets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(payload.into());
    }

    pub fn drain(&self) -> Vec<Box<[u8]>> {
        self.packets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.packets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A sender that pushes straight into another connection's inbound queue
impl PacketSender for InboundQueue {
    fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        self.push(payload);
        Ok(())
    }
}
