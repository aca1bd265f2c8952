use log::{info, trace, warn};
use ring::{
    hmac,
    rand::{SecureRandom, SystemRandom},
};

use tether_serde::{BitReader, BitWrite, BitWriter};

use crate::{
    packet_processor::{error::ProcessorError, PacketStage},
    types::{HostType, PacketId},
};

const COOKIE_BYTES: usize = 32;
const SECRET_BYTES: usize = 64;
/// Packet ids seeded from the cookie stay below the packet id modulus
const SEQUENCE_MASK: u16 = 0x3FFF;
/// Challenges a client keeps answering for while it waits for an ack
const MAX_ANSWERED_COOKIES: usize = 4;

#[derive(Clone, Debug)]
pub struct HandshakeConfig {
    /// Seconds between client retransmissions of an unanswered handshake packet
    pub resend_interval: f64,
    /// Seconds between server secret rotations
    pub secret_update_time: f64,
    /// Seconds a challenge cookie stays acceptable
    pub cookie_lifetime: f64,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            resend_interval: 1.0,
            secret_update_time: 15.0,
            cookie_lifetime: 30.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HandshakeKind {
    ChallengeRequest,
    Challenge,
    Response,
    Ack,
}

impl HandshakeKind {
    fn to_wire(self) -> u32 {
        match self {
            HandshakeKind::ChallengeRequest => 0,
            HandshakeKind::Challenge => 1,
            HandshakeKind::Response => 2,
            HandshakeKind::Ack => 3,
        }
    }

    fn from_wire(value: u32) -> Self {
        match value {
            0 => HandshakeKind::ChallengeRequest,
            1 => HandshakeKind::Challenge,
            2 => HandshakeKind::Response,
            _ => HandshakeKind::Ack,
        }
    }

    fn name(self) -> &'static str {
        match self {
            HandshakeKind::ChallengeRequest => "ChallengeRequest",
            HandshakeKind::Challenge => "Challenge",
            HandshakeKind::Response => "Response",
            HandshakeKind::Ack => "Ack",
        }
    }
}

/// Every handshake packet shares one layout, so a challenge request is
/// exactly as large as the challenge it asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct HandshakePacket {
    kind: HandshakeKind,
    secret_id: u8,
    timestamp_ms: u64,
    cookie: [u8; COOKIE_BYTES],
}

impl HandshakePacket {
    fn request() -> Self {
        Self {
            kind: HandshakeKind::ChallengeRequest,
            secret_id: 0,
            timestamp_ms: 0,
            cookie: [0; COOKIE_BYTES],
        }
    }

    fn with_kind(self, kind: HandshakeKind) -> Self {
        Self { kind, ..self }
    }

    fn write(&self) -> BitWriter {
        let mut writer = BitWriter::new();
        writer.write_bit(true);
        writer.write_int(self.kind.to_wire(), 2);
        writer.write_bit(self.secret_id == 1);
        writer.write_int(self.timestamp_ms as u32, 32);
        writer.write_int((self.timestamp_ms >> 32) as u32, 32);
        writer.write_bytes(&self.cookie);
        writer
    }

    /// Reads a handshake packet whose leading handshake bit was consumed
    fn read(reader: &mut BitReader) -> Result<Self, ProcessorError> {
        let bits = reader.num_bits();
        let malformed = |_| ProcessorError::MalformedHandshake { bits };

        let kind = HandshakeKind::from_wire(reader.read_int(2).map_err(malformed)?);
        let secret_id = u8::from(reader.read_bit().map_err(malformed)?);
        let low = u64::from(reader.read_int(32).map_err(malformed)?);
        let high = u64::from(reader.read_int(32).map_err(malformed)?);
        let cookie_bytes = reader.read_bytes(COOKIE_BYTES).map_err(malformed)?;
        let mut cookie = [0; COOKIE_BYTES];
        cookie.copy_from_slice(&cookie_bytes);

        Ok(Self {
            kind,
            secret_id,
            timestamp_ms: low | (high << 32),
            cookie,
        })
    }
}

struct Secrets {
    random: SystemRandom,
    keys: [hmac::Key; 2],
    active: u8,
    last_rotation: f64,
}

impl Secrets {
    fn new() -> Result<Self, ProcessorError> {
        let random = SystemRandom::new();
        let keys = [random_key(&random)?, random_key(&random)?];
        Ok(Self {
            random,
            keys,
            active: 0,
            last_rotation: 0.0,
        })
    }

    fn rotate(&mut self, now: f64) -> Result<(), ProcessorError> {
        let next = self.active ^ 1;
        self.keys[usize::from(next)] = random_key(&self.random)?;
        self.active = next;
        self.last_rotation = now;
        trace!("Rotated handshake secret to slot {}", next);
        Ok(())
    }

    fn key(&self, secret_id: u8) -> &hmac::Key {
        &self.keys[usize::from(secret_id & 1)]
    }
}

fn random_key(random: &SystemRandom) -> Result<hmac::Key, ProcessorError> {
    let mut secret = [0; SECRET_BYTES];
    random
        .fill(&mut secret)
        .map_err(|_| ProcessorError::RandomUnavailable)?;
    Ok(hmac::Key::new(hmac::HMAC_SHA256, &secret))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HandshakeState {
    AwaitingChallenge,
    AwaitingAck,
    Initialized,
}

/// A cookie handshake in two round trips. The server signs a timestamp and
/// the peer's id with a rotating secret and keeps nothing until the client
/// echoes a valid cookie back. Both sides then seed their packet sequences
/// from the cookie.
///
/// On the wire every packet gains a leading bit: 1 for handshake packets, 0
/// for connection data.
pub struct StatelessHandshake {
    host: HostType,
    config: HandshakeConfig,
    time: f64,
    state: HandshakeState,
    cookie: Option<[u8; COOKIE_BYTES]>,
    answered: Vec<[u8; COOKIE_BYTES]>,
    last_sent: Option<HandshakePacket>,
    last_send_time: f64,
    secrets: Option<Secrets>,
    peer_id: Vec<u8>,
    outgoing: Vec<BitWriter>,
}

impl StatelessHandshake {
    /// The connecting side. Queues its first challenge request immediately.
    pub fn client(config: HandshakeConfig) -> Self {
        let mut handshake = Self::new(HostType::Client, config, Vec::new(), None);
        handshake.send(HandshakePacket::request());
        handshake
    }

    /// The accepting side. `peer_id` identifies the remote, usually its
    /// address, and is bound into every cookie.
    pub fn server(config: HandshakeConfig, peer_id: Vec<u8>) -> Result<Self, ProcessorError> {
        let secrets = Secrets::new()?;
        Ok(Self::new(HostType::Server, config, peer_id, Some(secrets)))
    }

    fn new(
        host: HostType,
        config: HandshakeConfig,
        peer_id: Vec<u8>,
        secrets: Option<Secrets>,
    ) -> Self {
        Self {
            host,
            config,
            time: 0.0,
            state: HandshakeState::AwaitingChallenge,
            cookie: None,
            answered: Vec::new(),
            last_sent: None,
            last_send_time: 0.0,
            secrets,
            peer_id,
            outgoing: Vec::new(),
        }
    }

    fn now_ms(&self) -> u64 {
        (self.time * 1000.0) as u64
    }

    fn send(&mut self, packet: HandshakePacket) {
        trace!("Sending handshake {}", packet.kind.name());
        self.outgoing.push(packet.write());
        self.last_sent = Some(packet);
        self.last_send_time = self.time;
    }

    fn sign(&self, secrets: &Secrets, secret_id: u8, timestamp_ms: u64) -> [u8; COOKIE_BYTES] {
        let tag = hmac::sign(secrets.key(secret_id), &self.cookie_message(timestamp_ms));
        let mut cookie = [0; COOKIE_BYTES];
        cookie.copy_from_slice(tag.as_ref());
        cookie
    }

    fn cookie_message(&self, timestamp_ms: u64) -> Vec<u8> {
        let mut message = Vec::with_capacity(8 + self.peer_id.len());
        message.extend_from_slice(&timestamp_ms.to_le_bytes());
        message.extend_from_slice(&self.peer_id);
        message
    }

    fn unexpected(kind: HandshakeKind) -> ProcessorError {
        ProcessorError::UnexpectedHandshake { kind: kind.name() }
    }

    fn server_receive(&mut self, packet: HandshakePacket) -> Result<(), ProcessorError> {
        match packet.kind {
            HandshakeKind::ChallengeRequest => {
                if self.state == HandshakeState::Initialized {
                    trace!("Ignoring challenge request on an initialized connection");
                    return Ok(());
                }
                self.send_challenge()
            }
            HandshakeKind::Response => self.server_receive_response(packet),
            kind => Err(Self::unexpected(kind)),
        }
    }

    fn send_challenge(&mut self) -> Result<(), ProcessorError> {
        let Some(secrets) = &self.secrets else {
            return Err(Self::unexpected(HandshakeKind::ChallengeRequest));
        };
        let timestamp_ms = self.now_ms();
        let challenge = HandshakePacket {
            kind: HandshakeKind::Challenge,
            secret_id: secrets.active,
            timestamp_ms,
            cookie: self.sign(secrets, secrets.active, timestamp_ms),
        };
        self.send(challenge);
        Ok(())
    }

    fn server_receive_response(&mut self, packet: HandshakePacket) -> Result<(), ProcessorError> {
        if self.state == HandshakeState::Initialized {
            if self.cookie == Some(packet.cookie) {
                trace!("Re-acking repeated handshake response");
                self.send(packet.with_kind(HandshakeKind::Ack));
            } else {
                warn!("Ignoring handshake response with a foreign cookie on an initialized connection");
            }
            return Ok(());
        }

        let Some(secrets) = &self.secrets else {
            return Err(Self::unexpected(HandshakeKind::Response));
        };
        let message = self.cookie_message(packet.timestamp_ms);
        if hmac::verify(secrets.key(packet.secret_id), &message, &packet.cookie).is_err() {
            return Err(ProcessorError::InvalidCookie {
                secret_id: packet.secret_id,
            });
        }

        let now_ms = self.now_ms();
        let lifetime_ms = (self.config.cookie_lifetime * 1000.0) as u64;
        if packet.timestamp_ms > now_ms || now_ms - packet.timestamp_ms > lifetime_ms {
            info!(
                "Handshake cookie from {} ms expired, sending a fresh challenge",
                packet.timestamp_ms
            );
            return self.send_challenge();
        }

        info!("Handshake complete (server)");
        self.state = HandshakeState::Initialized;
        self.cookie = Some(packet.cookie);
        self.send(packet.with_kind(HandshakeKind::Ack));
        Ok(())
    }

    fn client_receive(&mut self, packet: HandshakePacket) -> Result<(), ProcessorError> {
        match packet.kind {
            HandshakeKind::Challenge => {
                if self.state == HandshakeState::Initialized {
                    trace!("Ignoring challenge on an initialized connection");
                    return Ok(());
                }
                // the server may complete on any of the responses in flight,
                // so every answered cookie stays acceptable in the ack
                if !self.answered.contains(&packet.cookie) {
                    if self.answered.len() == MAX_ANSWERED_COOKIES {
                        self.answered.remove(0);
                    }
                    self.answered.push(packet.cookie);
                }
                self.state = HandshakeState::AwaitingAck;
                self.cookie = Some(packet.cookie);
                self.send(packet.with_kind(HandshakeKind::Response));
                Ok(())
            }
            HandshakeKind::Ack => {
                if self.state == HandshakeState::AwaitingAck && self.answered.contains(&packet.cookie) {
                    info!("Handshake complete (client)");
                    self.state = HandshakeState::Initialized;
                    self.cookie = Some(packet.cookie);
                    self.answered.clear();
                } else {
                    trace!("Ignoring stale handshake ack");
                }
                Ok(())
            }
            kind => Err(Self::unexpected(kind)),
        }
    }
}

impl PacketStage for StatelessHandshake {
    fn name(&self) -> &'static str {
        "stateless_handshake"
    }

    fn process_outgoing(&mut self, packet: BitWriter) -> Result<BitWriter, ProcessorError> {
        let mut output = BitWriter::new();
        output.write_bit(false);
        output.write_bits(&packet);
        Ok(output)
    }

    fn process_incoming(&mut self, packet: BitWriter) -> Result<Option<BitWriter>, ProcessorError> {
        let mut reader = BitReader::from_writer(&packet);
        let is_handshake = reader
            .read_bit()
            .map_err(|_| ProcessorError::MalformedHandshake { bits: 0 })?;

        if is_handshake {
            let handshake = HandshakePacket::read(&mut reader)?;
            match self.host {
                HostType::Server => self.server_receive(handshake)?,
                HostType::Client => self.client_receive(handshake)?,
            }
            return Ok(None);
        }

        if self.state != HandshakeState::Initialized {
            trace!("Dropping data packet received before the handshake completed");
            return Ok(None);
        }

        let rest = reader.bits_left();
        let data = reader
            .read_bits(rest)
            .map_err(|_| ProcessorError::MalformedHandshake { bits: packet.num_bits() })?;
        Ok(Some(data))
    }

    fn is_initialized(&self) -> bool {
        self.state == HandshakeState::Initialized
    }

    fn tick(&mut self, delta_seconds: f64) -> Result<(), ProcessorError> {
        self.time += delta_seconds;

        if let Some(secrets) = self.secrets.as_mut() {
            if self.time - secrets.last_rotation >= self.config.secret_update_time {
                secrets.rotate(self.time)?;
            }
        }

        if self.host == HostType::Client
            && self.state != HandshakeState::Initialized
            && self.time - self.last_send_time >= self.config.resend_interval
        {
            let packet = self.last_sent.unwrap_or_else(HandshakePacket::request);
            self.send(packet);
        }
        Ok(())
    }

    fn drain_self_originated(&mut self) -> Vec<BitWriter> {
        std::mem::take(&mut self.outgoing)
    }

    fn reserved_bits(&self) -> usize {
        1
    }

    fn initial_sequences(&self) -> Option<(PacketId, PacketId)> {
        if self.state != HandshakeState::Initialized {
            return None;
        }
        let cookie = self.cookie?;
        let server_sequence = PacketId::from(u16::from_le_bytes([cookie[0], cookie[1]]) & SEQUENCE_MASK);
        let client_sequence = PacketId::from(u16::from_le_bytes([cookie[2], cookie[3]]) & SEQUENCE_MASK);
        match self.host {
            HostType::Server => Some((client_sequence, server_sequence)),
            HostType::Client => Some((server_sequence, client_sequence)),
        }
    }
}
