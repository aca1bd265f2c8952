use tether_shared::{
    ChannelIndex, ChannelKind, Connection, ConnectionConfig, ConnectionEvent, HandshakeConfig,
    HostType, PacketProcessor, StatelessHandshake,
};

use crate::local_link::{Direction, LinkConditions, LocalLink};

/// Default tick length, in seconds
pub const TICK: f64 = 0.05;

const CLIENT_PEER_ID: &[u8] = b"127.0.0.1:12345";

/// Config with enough bandwidth that flow control never gets in the way
pub fn fast_config() -> ConnectionConfig {
    ConnectionConfig {
        bandwidth_bytes_per_second: 1_000_000,
        ..Default::default()
    }
}

/// A server and a client connection joined by a [`LocalLink`]
pub struct ConnectionPair {
    pub server: Connection,
    pub client: Connection,
    pub link: LocalLink,
}

impl ConnectionPair {
    /// Pair with empty packet processors: both sides are initialized at once
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_processors(config, PacketProcessor::new(), PacketProcessor::new())
    }

    /// Pair that runs the stateless handshake before any data flows
    pub fn with_handshake(config: ConnectionConfig) -> Self {
        let server_handshake =
            StatelessHandshake::server(HandshakeConfig::default(), CLIENT_PEER_ID.to_vec())
                .expect("server handshake");
        let client_handshake = StatelessHandshake::client(HandshakeConfig::default());
        Self::with_processors(
            config,
            PacketProcessor::new().with_stage(server_handshake),
            PacketProcessor::new().with_stage(client_handshake),
        )
    }

    pub fn with_processors(
        config: ConnectionConfig,
        server_processor: PacketProcessor,
        client_processor: PacketProcessor,
    ) -> Self {
        let link = LocalLink::new(LinkConditions::perfect());
        let server = Connection::new(
            HostType::Server,
            config.clone(),
            server_processor,
            Box::new(link.wire(Direction::ServerToClient)),
        )
        .expect("server connection");
        let client = Connection::new(
            HostType::Client,
            config,
            client_processor,
            Box::new(link.wire(Direction::ClientToServer)),
        )
        .expect("client connection");

        Self {
            server,
            client,
            link,
        }
    }

    /// Ticks the client and delivers what it sent
    pub fn tick_client(&mut self, delta_seconds: f64) {
        self.client.tick(delta_seconds);
        let inbound = self.server.inbound_queue();
        self.link.deliver(Direction::ClientToServer, &inbound);
    }

    /// Ticks the server and delivers what it sent
    pub fn tick_server(&mut self, delta_seconds: f64) {
        self.server.tick(delta_seconds);
        let inbound = self.client.inbound_queue();
        self.link.deliver(Direction::ServerToClient, &inbound);
    }

    pub fn tick(&mut self) {
        self.tick_client(TICK);
        self.tick_server(TICK);
    }

    pub fn run(&mut self, ticks: usize) {
        for _ in 0..ticks {
            self.tick();
        }
    }

    /// Ticks until both sides report an initialized connection, giving up
    /// after `max_ticks`
    pub fn run_until_initialized(&mut self, max_ticks: usize) -> bool {
        for _ in 0..max_ticks {
            if self.client.is_initialized() && self.server.is_initialized() {
                return true;
            }
            self.tick();
        }
        self.client.is_initialized() && self.server.is_initialized()
    }

    /// Opens the control channel from the client and lets the server learn
    /// about it. Both connections are marked open.
    pub fn open_control(&mut self) {
        self.tick();
        self.client
            .create_channel(ChannelKind::Control, None)
            .expect("control channel");
        self.client
            .send_on_channel(0, b"hello", true)
            .expect("control hello");
        self.run(4);

        assert!(
            self.server.channel(0).is_some(),
            "server never saw the control channel"
        );
        self.client.set_open();
        self.server.set_open();
    }

    /// Payloads the server received on `index` since the last call. Segments
    /// on other channels are discarded.
    pub fn server_payloads(&mut self, index: ChannelIndex) -> Vec<Vec<u8>> {
        payloads(&mut self.server, index)
    }

    /// Payloads the client received on `index` since the last call
    pub fn client_payloads(&mut self, index: ChannelIndex) -> Vec<Vec<u8>> {
        payloads(&mut self.client, index)
    }
}

fn payloads(connection: &mut Connection, index: ChannelIndex) -> Vec<Vec<u8>> {
    connection
        .receive_segments()
        .into_iter()
        .filter(|segment| segment.channel_index == index)
        .map(|segment| segment.payload_bytes().to_vec())
        .collect()
}

/// The close reason a connection reported through its events, if any
pub fn closed_with(events: &[ConnectionEvent]) -> Option<tether_shared::CloseReason> {
    events.iter().find_map(|event| match event {
        ConnectionEvent::Closed { reason } => Some(*reason),
        _ => None,
    })
}
