/// In-memory link for E2E testing
/// Carries datagrams between a server and a client connection without network I/O,
/// with optional loss, duplication and reordering
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use tether_shared::{InboundQueue, PacketSender, TransportError};

/// Which way a datagram travels
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    ClientToServer,
    ServerToClient,
}

/// Probabilities applied to every delivered datagram, each in `0.0..=1.0`
#[derive(Clone, Copy, Debug, Default)]
pub struct LinkConditions {
    pub loss: f64,
    pub duplicate: f64,
    pub reorder: f64,
}

impl LinkConditions {
    pub fn perfect() -> Self {
        Self::default()
    }

    pub fn lossy(loss: f64) -> Self {
        Self {
            loss,
            ..Default::default()
        }
    }
}

#[derive(Default)]
struct WireState {
    queue: VecDeque<(usize, Box<[u8]>)>,
    sent: usize,
}

/// One direction of the link. Connections send into it, the link delivers
/// out of it. Every datagram is numbered in send order, starting at 0.
#[derive(Clone, Default)]
pub struct LocalWire {
    state: Arc<Mutex<WireState>>,
}

impl LocalWire {
    pub fn new() -> Self {
        Self::default()
    }

    /// Datagrams sent into this wire so far, delivered or not
    pub fn sent_count(&self) -> usize {
        self.state.lock().unwrap().sent
    }

    /// Datagrams waiting for delivery
    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }

    pub fn take(&self) -> Vec<(usize, Box<[u8]>)> {
        self.state.lock().unwrap().queue.drain(..).collect()
    }
}

impl PacketSender for LocalWire {
    fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        let number = state.sent;
        state.sent += 1;
        state.queue.push_back((number, payload.into()));
        Ok(())
    }
}

/// Both directions between one server and one client
pub struct LocalLink {
    client_to_server: LocalWire,
    server_to_client: LocalWire,
    conditions: LinkConditions,
    rng: fastrand::Rng,
    drops: HashSet<(Direction, usize)>,
    last_delivered: Option<(Direction, Box<[u8]>)>,
}

impl LocalLink {
    pub fn new(conditions: LinkConditions) -> Self {
        Self {
            client_to_server: LocalWire::new(),
            server_to_client: LocalWire::new(),
            conditions,
            rng: fastrand::Rng::with_seed(7),
            drops: HashSet::new(),
            last_delivered: None,
        }
    }

    /// The sender to hand a connection on the given side
    pub fn wire(&self, direction: Direction) -> LocalWire {
        match direction {
            Direction::ClientToServer => self.client_to_server.clone(),
            Direction::ServerToClient => self.server_to_client.clone(),
        }
    }

    pub fn set_conditions(&mut self, conditions: LinkConditions) {
        self.conditions = conditions;
    }

    /// Drops the datagram with the given send number, once
    pub fn drop_datagram(&mut self, direction: Direction, number: usize) {
        self.drops.insert((direction, number));
    }

    /// Drops whatever datagram is sent next in the given direction
    pub fn drop_next(&mut self, direction: Direction) {
        let number = self.wire(direction).sent_count();
        self.drop_datagram(direction, number);
    }

    pub fn sent_count(&self, direction: Direction) -> usize {
        self.wire(direction).sent_count()
    }

    /// The most recent datagram that reached its destination
    pub fn last_delivered(&self, direction: Direction) -> Option<Box<[u8]>> {
        match &self.last_delivered {
            Some((delivered_direction, payload)) if *delivered_direction == direction => {
                Some(payload.clone())
            }
            _ => None,
        }
    }

    /// Moves every pending datagram of one direction into `destination`,
    /// applying the link conditions. Returns how many were delivered.
    pub fn deliver(&mut self, direction: Direction, destination: &InboundQueue) -> usize {
        let mut in_flight = Vec::new();
        for (number, payload) in self.wire(direction).take() {
            if self.drops.remove(&(direction, number)) {
                log::trace!("Link dropping {:?} datagram {}", direction, number);
                continue;
            }
            if self.conditions.loss > 0.0 && self.rng.f64() < self.conditions.loss {
                continue;
            }
            if self.conditions.duplicate > 0.0 && self.rng.f64() < self.conditions.duplicate {
                in_flight.push(payload.clone());
            }
            in_flight.push(payload);
        }

        if self.conditions.reorder > 0.0 {
            for index in 0..in_flight.len().saturating_sub(1) {
                if self.rng.f64() < self.conditions.reorder {
                    in_flight.swap(index, index + 1);
                }
            }
        }

        let delivered = in_flight.len();
        for payload in in_flight {
            destination.push(&payload);
            self.last_delivered = Some((direction, payload));
        }
        delivered
    }
}
