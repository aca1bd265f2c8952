use std::{
    io::ErrorKind,
    net::{SocketAddr, UdpSocket},
    sync::Arc,
};

use log::warn;

use tether_serde::MTU_SIZE_BYTES;

use crate::transport::{InboundQueue, PacketSender, TransportError};

/// Binds a non-blocking UDP socket shared by a sender and a receiver
pub fn bind(address: SocketAddr) -> Result<Arc<UdpSocket>, TransportError> {
    let bind_failed = |error: std::io::Error| TransportError::BindFailed {
        address: address.to_string(),
        reason: error.to_string(),
    };
    let socket = UdpSocket::bind(address).map_err(bind_failed)?;
    socket.set_nonblocking(true).map_err(bind_failed)?;
    Ok(Arc::new(socket))
}

/// Sends every datagram of one connection to its remote address
pub struct UdpPacketSender {
    socket: Arc<UdpSocket>,
    remote: SocketAddr,
}

impl UdpPacketSender {
    pub fn new(socket: Arc<UdpSocket>, remote: SocketAddr) -> Self {
        Self { socket, remote }
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }
}

impl PacketSender for UdpPacketSender {
    fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        self.socket
            .send_to(payload, self.remote)
            .map(|_| ())
            .map_err(|error| TransportError::SendFailed {
                len: payload.len(),
                reason: error.to_string(),
            })
    }
}

/// Reads datagrams off a non-blocking socket
pub struct UdpPacketReceiver {
    socket: Arc<UdpSocket>,
    buffer: [u8; MTU_SIZE_BYTES],
}

impl UdpPacketReceiver {
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self {
            socket,
            buffer: [0; MTU_SIZE_BYTES],
        }
    }

    /// The next datagram and its sender, or `None` when nothing is waiting
    pub fn receive(&mut self) -> Result<Option<(SocketAddr, &[u8])>, TransportError> {
        match self.socket.recv_from(&mut self.buffer) {
            Ok((len, address)) => Ok(Some((address, &self.buffer[..len]))),
            Err(error) if error.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(error) => Err(TransportError::ReceiveFailed {
                reason: error.to_string(),
            }),
        }
    }

    /// Moves every waiting datagram from `remote` into `queue`. Datagrams
    /// from anyone else are dropped. Returns how many were queued.
    pub fn pump(&mut self, remote: SocketAddr, queue: &InboundQueue) -> Result<usize, TransportError> {
        let mut count = 0;
        while let Some((address, payload)) = self.receive()? {
            if address != remote {
                warn!("Dropping datagram from unexpected address {}", address);
                continue;
            }
            queue.push(payload);
            count += 1;
        }
        Ok(count)
    }
}
