use log::{error, info, trace, warn};

use tether_serde::{packet_bit_length, BitReader, BitWrite, BitWriter};

use crate::{
    channel::{
        Channel, ChannelError, ChannelKind, ChannelReceive, ChannelTable, ReceiveLimits,
        ReceivedSegment, SegmentError, SendLimits, SendOptions, SequenceCounters,
    },
    connection::{
        ack_manager::AckManager,
        bandwidth_monitor::{remote_saturation, BandwidthMonitor, ConnectionStats},
        connection_config::ConnectionConfig,
        error::{ConfigError, ConnectionError},
        flow_control::FlowControl,
        ping_store::PingStore,
        security_tracker::SecurityTracker,
        state::{CloseReason, ConnectionEvent, ConnectionState},
    },
    constants::{CONTROL_CHANNEL_INDEX, PACKET_HEADER_BITS, PACKET_TRAILER_BITS},
    packet::{AckRecord, PacketError, Segment, SegmentLayout},
    packet_processor::PacketProcessor,
    transport::{InboundQueue, PacketSender},
    types::{ChannelIndex, HostType, PacketId, PacketIdRange},
    wrapping_number::{read_packet_id, write_packet_id},
};

/// One end of a reliable multi-channel session with a single remote peer.
///
/// A connection is driven entirely by its owner: datagrams arrive through
/// [`Connection::received_raw_packet`] or the [`InboundQueue`], time advances
/// through [`Connection::tick`], and everything the application needs comes
/// back out through [`Connection::receive_segments`] and
/// [`Connection::take_events`].
pub struct Connection {
    host: HostType,
    config: ConnectionConfig,
    layout: SegmentLayout,
    state: ConnectionState,
    close_reason: Option<CloseReason>,
    processor: PacketProcessor,
    sender: Box<dyn PacketSender>,
    inbound: InboundQueue,
    channels: ChannelTable,
    had_control: bool,
    acks: AckManager,
    pings: PingStore,
    flow: FlowControl,
    bandwidth: BandwidthMonitor,
    security: SecurityTracker,
    send_buffer: BitWriter,
    max_send_bits: usize,
    out_packet_id: PacketId,
    in_packet_id: PacketId,
    sequences_initialized: bool,
    time: f64,
    frame_time: f64,
    last_send_time: f64,
    last_receive_time: f64,
    has_received_packet: bool,
    time_sensitive: bool,
    pending_destroy: bool,
    last_has_server_frame_time: bool,
    remote_frame_time_ms: Option<u8>,
    received: Vec<ReceivedSegment>,
    events: Vec<ConnectionEvent>,
}

impl Connection {
    pub fn new(
        host: HostType,
        config: ConnectionConfig,
        processor: PacketProcessor,
        sender: Box<dyn PacketSender>,
    ) -> Result<Self, ConnectionError> {
        config.validate()?;

        let layout = config.segment_layout();
        let reserved_bits = processor.reserved_bits();
        let max_send_bits = (config.max_packet_size * 8)
            .checked_sub(reserved_bits)
            .filter(|bits| *bits >= config.min_send_bits())
            .ok_or(ConfigError::ProcessorOverhead {
                max_packet_size: config.max_packet_size,
                reserved_bits,
            })?;

        let mut connection = Self {
            host,
            layout,
            state: ConnectionState::Pending,
            close_reason: None,
            processor,
            sender,
            inbound: InboundQueue::new(),
            channels: ChannelTable::new(config.max_channels),
            had_control: false,
            acks: AckManager::new(),
            pings: PingStore::new(config.ack_history_size),
            flow: FlowControl::new(config.effective_bandwidth()),
            bandwidth: BandwidthMonitor::new(),
            security: SecurityTracker::new(config.security.clone()),
            send_buffer: BitWriter::with_max_bits(max_send_bits),
            max_send_bits,
            out_packet_id: 0,
            in_packet_id: -1,
            sequences_initialized: false,
            time: 0.0,
            frame_time: 0.0,
            last_send_time: 0.0,
            last_receive_time: 0.0,
            has_received_packet: false,
            time_sensitive: false,
            pending_destroy: false,
            last_has_server_frame_time: false,
            remote_frame_time_ms: None,
            received: Vec::new(),
            events: Vec::new(),
            config,
        };
        connection.apply_initial_sequences();
        Ok(connection)
    }

    // Accessors

    pub fn host(&self) -> HostType {
        self.host
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    /// Whether packet sequences have been negotiated
    pub fn is_initialized(&self) -> bool {
        self.sequences_initialized
    }

    /// Handle for the socket side to push received datagrams into
    pub fn inbound_queue(&self) -> InboundQueue {
        self.inbound.clone()
    }

    pub fn stats(&self) -> &ConnectionStats {
        self.bandwidth.stats()
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn out_packet_id(&self) -> PacketId {
        self.out_packet_id
    }

    pub fn in_packet_id(&self) -> PacketId {
        self.in_packet_id
    }

    pub fn out_ack_packet_id(&self) -> PacketId {
        self.acks.out_ack_packet_id()
    }

    pub fn queued_bits(&self) -> i64 {
        self.flow.queued_bits()
    }

    /// Server frame time last piggybacked on an ack, in milliseconds
    pub fn remote_frame_time_ms(&self) -> Option<u8> {
        self.remote_frame_time_ms
    }

    pub fn channel(&self, index: ChannelIndex) -> Option<&Channel> {
        self.channels.get(index)
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Complete messages received since the last call
    pub fn receive_segments(&mut self) -> Vec<ReceivedSegment> {
        std::mem::take(&mut self.received)
    }

    /// Lifecycle events since the last call
    pub fn take_events(&mut self) -> Vec<ConnectionEvent> {
        std::mem::take(&mut self.events)
    }

    // Lifecycle

    pub fn set_open(&mut self) {
        if self.state == ConnectionState::Pending {
            info!("Connection open ({:?})", self.host);
            self.state = ConnectionState::Open;
        }
    }

    /// Shortens the timeout while the owner tears the connection down
    pub fn set_pending_destroy(&mut self) {
        self.pending_destroy = true;
    }

    pub fn timeout_value(&self) -> f64 {
        if self.state == ConnectionState::Pending {
            self.config.initial_connect_timeout
        } else if self.pending_destroy {
            self.config.pending_destroy_timeout
        } else {
            self.config.connection_timeout
        }
    }

    /// Closes the connection for good. Closing twice does nothing.
    pub fn close(&mut self, reason: CloseReason) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.state = ConnectionState::Closed;
        self.close_reason = Some(reason);

        let control_open = self
            .channels
            .get(CONTROL_CHANNEL_INDEX)
            .is_some_and(|control| !control.is_closing());
        if control_open && self.ready_to_send() {
            if let Err(error) = self.send_close(CONTROL_CHANNEL_INDEX) {
                trace!("Could not send control channel close: {}", error);
            }
        }
        if self.ready_to_send() && !self.send_buffer.is_empty() {
            self.flush_packet();
        }

        info!("Connection closed ({:?}): {}", self.host, reason);
        self.events.push(ConnectionEvent::Closed { reason });
    }

    /// Seeds the packet and channel sequences. `incoming` is the first id
    /// expected from the peer, `outgoing` the first id this side sends.
    pub fn init_sequence(&mut self, incoming: PacketId, outgoing: PacketId) {
        self.in_packet_id = incoming - 1;
        self.out_packet_id = outgoing;
        self.acks.reset(outgoing - 1);

        let mask = self.config.max_channel_sequence as PacketId - 1;
        self.channels.set_initial(SequenceCounters {
            in_reliable: incoming & mask,
            out_reliable: outgoing & mask,
        });
    }

    fn apply_initial_sequences(&mut self) {
        if self.sequences_initialized {
            return;
        }
        if !self.config.internal_ack && !self.processor.is_fully_initialized() {
            return;
        }
        if let Some((incoming, outgoing)) = self.processor.initial_sequences() {
            trace!("Initial sequences: incoming {}, outgoing {}", incoming, outgoing);
            self.init_sequence(incoming, outgoing);
        }
        self.sequences_initialized = true;
        info!("Connection initialized ({:?})", self.host);
        self.events.push(ConnectionEvent::Initialized);
    }

    fn ready_to_send(&self) -> bool {
        self.config.internal_ack
            || (self.sequences_initialized
                && self.processor.is_fully_initialized()
                && (self.host == HostType::Client || self.has_received_packet))
    }

    fn keep_alive_due(&self) -> bool {
        self.time - self.last_send_time > self.config.keep_alive_interval
            && !self.config.internal_ack
            && self.state != ConnectionState::Closed
    }

    /// Refuses sends on a closed connection. A send before the connection is
    /// ready to transmit is fatal.
    fn check_can_send(&mut self) -> Result<(), ChannelError> {
        if self.state == ConnectionState::Closed {
            return Err(ChannelError::ConnectionClosed);
        }
        if !self.ready_to_send() {
            warn!("Tried to send on a channel before the connection was ready");
            self.close(CloseReason::HandshakeNotReady);
            return Err(ChannelError::HandshakePending);
        }
        Ok(())
    }

    /// Whether flow control would accept more data right now
    pub fn is_net_ready(&self) -> bool {
        self.flow.is_net_ready(self.send_buffer.num_bits())
    }

    // Channels

    /// Opens a channel on this side. With no index the kind's reserved index
    /// is used, or the first free dynamic one.
    pub fn create_channel(
        &mut self,
        kind: ChannelKind,
        index: Option<ChannelIndex>,
    ) -> Result<ChannelIndex, ChannelError> {
        if self.state == ConnectionState::Closed {
            return Err(ChannelError::ConnectionClosed);
        }
        let index = self.channels.resolve_index(kind, index)?;
        self.channels.insert(index, kind, true);
        if kind.is_control() {
            self.had_control = true;
        }
        self.events.push(ConnectionEvent::ChannelOpened { index, kind });
        Ok(index)
    }

    pub fn close_channel(&mut self, index: ChannelIndex) -> Result<PacketIdRange, ChannelError> {
        self.check_can_send()?;
        let channel = self
            .channels
            .get(index)
            .ok_or(ChannelError::UnknownChannel { index })?;
        if channel.is_closing() {
            return Err(ChannelError::Closing { index });
        }
        if !channel.opened_locally() && index != CONTROL_CHANNEL_INDEX {
            return Err(ChannelError::NotOpenedLocally { index });
        }
        self.send_close(index)
    }

    pub fn set_channel_pending_dormancy(&mut self, index: ChannelIndex) -> Result<(), ChannelError> {
        self.channels
            .get_mut(index)
            .ok_or(ChannelError::UnknownChannel { index })?
            .set_pending_dormancy()
    }

    pub fn flush_channel_dormancy(&mut self, index: ChannelIndex) -> Result<(), ChannelError> {
        self.channels
            .get_mut(index)
            .ok_or(ChannelError::UnknownChannel { index })?
            .flush_dormancy();
        Ok(())
    }

    fn cleanup_channel(&mut self, index: ChannelIndex) {
        let Some(channel) = self.channels.remove(index) else {
            return;
        };
        self.events.push(ConnectionEvent::ChannelClosed {
            index,
            dormant: channel.is_dormant(),
        });
        if index == CONTROL_CHANNEL_INDEX {
            self.close(CloseReason::ControlChannelClosed);
        }
    }

    // Sending

    pub fn send_on_channel(
        &mut self,
        index: ChannelIndex,
        payload: &[u8],
        reliable: bool,
    ) -> Result<PacketIdRange, ChannelError> {
        let options = SendOptions {
            reliable,
            ..Default::default()
        };
        self.send_bits_on_channel(index, BitWriter::from_bytes(payload), options)
    }

    pub fn send_bits_on_channel(
        &mut self,
        index: ChannelIndex,
        payload: BitWriter,
        options: SendOptions,
    ) -> Result<PacketIdRange, ChannelError> {
        self.check_can_send()?;

        let limits = self.send_limits();
        let flow_ready = self.is_net_ready();
        let channel = self
            .channels
            .get_mut(index)
            .ok_or(ChannelError::UnknownChannel { index })?;
        if !flow_ready || !channel.is_net_ready(limits.reliable_buffer) {
            return Err(ChannelError::Saturated { index });
        }

        let segments = match channel.prepare_send(payload, options, false, &limits) {
            Ok(segments) => segments,
            Err(error @ ChannelError::ReliableBufferOverflow { .. }) => {
                warn!("{}", error);
                self.close(CloseReason::ReliableBufferOverflow);
                return Err(error);
            }
            Err(error) => return Err(error),
        };
        self.send_segments(index, segments)
    }

    fn send_close(&mut self, index: ChannelIndex) -> Result<PacketIdRange, ChannelError> {
        let limits = self.send_limits();
        let channel = self
            .channels
            .get_mut(index)
            .ok_or(ChannelError::UnknownChannel { index })?;
        let options = SendOptions {
            reliable: !channel.is_open_temporary(),
            ..Default::default()
        };
        let segments = match channel.prepare_send(BitWriter::new(), options, true, &limits) {
            Ok(segments) => segments,
            Err(error @ ChannelError::ReliableBufferOverflow { .. }) => {
                warn!("{}", error);
                self.close(CloseReason::ReliableBufferOverflow);
                return Err(error);
            }
            Err(error) => return Err(error),
        };
        self.send_segments(index, segments)
    }

    fn send_segments(
        &mut self,
        index: ChannelIndex,
        segments: Vec<Segment>,
    ) -> Result<PacketIdRange, ChannelError> {
        let opens = segments.first().is_some_and(|segment| segment.flags.open);

        let mut range: Option<PacketIdRange> = None;
        for segment in segments {
            let packet_id = self.write_segment_to_send_buffer(&segment)?;
            if segment.flags.reliable {
                if let Some(channel) = self.channels.get_mut(index) {
                    channel.record_sent(segment.sequence, packet_id);
                }
            }
            range = Some(match range {
                Some(range) => range.extend(packet_id),
                None => PacketIdRange::single(packet_id),
            });
        }

        let range = range.unwrap_or_else(|| PacketIdRange::single(self.out_packet_id));
        if opens {
            if let Some(channel) = self.channels.get_mut(index) {
                channel.set_open_range(range);
            }
        }
        Ok(range)
    }

    fn send_limits(&self) -> SendLimits {
        SendLimits {
            max_single_segment_bits: self.max_single_segment_bits(),
            max_partial_bytes: self.config.max_partial_bytes,
            partial_reliable_threshold: self.config.partial_reliable_threshold,
            reliable_buffer: self.config.reliable_buffer,
            internal_ack: self.config.internal_ack,
        }
    }

    fn receive_limits(&self) -> ReceiveLimits {
        ReceiveLimits {
            reliable_buffer: self.config.reliable_buffer,
            max_partial_bytes: self.config.max_partial_bytes,
        }
    }

    fn max_single_segment_bits(&self) -> usize {
        self.max_send_bits
            .saturating_sub(PACKET_HEADER_BITS + PACKET_TRAILER_BITS + self.layout.max_header_bits())
    }

    /// Bits still free in the send buffer, after the framing the packet will
    /// need
    fn free_send_bits(&self) -> usize {
        let header_bits = if self.send_buffer.is_empty() && !self.config.internal_ack {
            PACKET_HEADER_BITS
        } else {
            0
        };
        self.max_send_bits
            .saturating_sub(self.send_buffer.num_bits() + header_bits + PACKET_TRAILER_BITS)
    }

    /// Encodes a segment into the send buffer. Returns the id of the packet
    /// it went into.
    pub fn write_segment_to_send_buffer(&mut self, segment: &Segment) -> Result<PacketId, ChannelError> {
        let mut header = BitWriter::new();
        segment.write_header(&mut header, &self.layout);
        let packet_id = self.write_bits_to_send_buffer(&header, Some(&segment.payload))?;
        self.time_sensitive = true;
        Ok(packet_id)
    }

    fn write_bits_to_send_buffer(
        &mut self,
        bits: &BitWriter,
        extra_bits: Option<&BitWriter>,
    ) -> Result<PacketId, ChannelError> {
        let total_bits = bits.num_bits() + extra_bits.map_or(0, BitWriter::num_bits);

        if total_bits > self.free_send_bits() {
            self.flush_packet();
        }
        if total_bits > self.free_send_bits() {
            return Err(ChannelError::SegmentTooLarge {
                bits: total_bits,
                max_bits: self.free_send_bits(),
            });
        }

        if self.send_buffer.is_empty() && !self.config.internal_ack {
            write_packet_id(&mut self.send_buffer, self.out_packet_id);
        }
        self.send_buffer.write_bits(bits);
        if let Some(extra_bits) = extra_bits {
            self.send_buffer.write_bits(extra_bits);
        }

        let packet_id = self.out_packet_id;
        if self.free_send_bits() == 0 {
            self.flush_packet();
        }
        Ok(packet_id)
    }

    /// Terminates the pending packet and hands it to the transport. With an
    /// empty buffer this only sends once the keep-alive is due.
    pub fn flush_packet(&mut self) {
        if self.send_buffer.is_empty() && !self.keep_alive_due() {
            return;
        }

        if !self.ready_to_send() {
            warn!("Tried to send a packet before the connection was ready");
            self.send_buffer.reset();
            self.close(CloseReason::HandshakeNotReady);
            return;
        }

        if self.send_buffer.is_empty() && !self.config.internal_ack {
            write_packet_id(&mut self.send_buffer, self.out_packet_id);
        }
        self.send_buffer.write_bit(true);

        match self.processor.process_outgoing(&self.send_buffer) {
            Ok(bytes) => {
                if let Err(error) = self.sender.send(&bytes) {
                    warn!("{}", error);
                }
                trace!("Sent packet {} ({} bytes)", self.out_packet_id, bytes.len());
                self.pings.record(
                    self.out_packet_id,
                    self.time,
                    self.bandwidth.out_kbytes_per_second(),
                );
                self.bandwidth.record_sent(bytes.len());
                self.flow.record_sent(bytes.len(), self.config.packet_overhead);
                self.out_packet_id += 1;
                self.last_send_time = self.time;
            }
            Err(error) => {
                // the id is spent so the peer's next ack naks it
                error!(
                    "Packet processor failed on outgoing packet {}: {}",
                    self.out_packet_id, error
                );
                self.out_packet_id += 1;
                self.last_send_time = self.time;
            }
        }

        self.send_buffer.reset();
        self.acks.promote_queued();
        self.time_sensitive = false;
    }

    // Acks

    /// Writes an ack for `packet_id`. The first write also purges the acks
    /// due for their second write.
    pub fn send_ack(&mut self, packet_id: PacketId, first_time: bool) {
        if self.config.internal_ack {
            return;
        }
        if first_time {
            self.purge_acks();
            self.acks.queue(packet_id);
        }

        let has_frame_time = match self.host {
            HostType::Server => self.last_has_server_frame_time,
            HostType::Client => self.config.request_server_frame_time,
        };
        let frame_time_ms = (has_frame_time && self.host == HostType::Server)
            .then(|| (self.frame_time * 1000.0).floor().min(255.0) as u8);
        let record = AckRecord {
            packet_id,
            has_frame_time,
            frame_time_ms,
            remote_kbytes_per_second: self.bandwidth.in_kbytes_per_second(),
        };

        let mut writer = BitWriter::new();
        record.write(&mut writer, self.host);
        if let Err(error) = self.write_bits_to_send_buffer(&writer, None) {
            error!("Could not write ack for packet {}: {}", packet_id, error);
        }
        self.time_sensitive = true;
    }

    /// Writes every ack due for its second write
    pub fn purge_acks(&mut self) {
        for packet_id in self.acks.take_resend() {
            self.send_ack(packet_id, false);
        }
    }

    fn received_ack(&mut self, ack: AckRecord) {
        match self.host {
            HostType::Server => self.last_has_server_frame_time = ack.has_frame_time,
            HostType::Client => {
                if ack.frame_time_ms.is_some() {
                    self.remote_frame_time_ms = ack.frame_time_ms;
                }
            }
        }

        let naks = self.acks.register_ack(ack.packet_id);
        self.bandwidth.record_out_lost(naks.len() as u32);
        for nak in naks {
            self.received_nak(nak);
            if self.is_closed() {
                return;
            }
        }

        if let Some(sent) = self.pings.take(ack.packet_id) {
            let round_trip = (self.time - sent.sent_time).max(0.0);
            self.bandwidth.record_lag(round_trip);
            self.bandwidth.set_remote_saturation(remote_saturation(
                ack.remote_kbytes_per_second,
                sent.out_kbytes_per_second,
            ));
        }

        for index in self.channels.indices_rev() {
            let Some(channel) = self.channels.get_mut(index) else {
                continue;
            };
            channel.received_ack(ack.packet_id);
            if channel.received_acks() {
                self.cleanup_channel(index);
            }
        }
    }

    /// Resends every outstanding segment lost with `packet_id`
    fn received_nak(&mut self, packet_id: PacketId) {
        trace!("Packet {} lost, resending its reliable segments", packet_id);
        for index in self.channels.indices_rev() {
            let Some(channel) = self.channels.get(index) else {
                continue;
            };
            for segment in channel.naked_segments(packet_id) {
                match self.write_segment_to_send_buffer(&segment) {
                    Ok(resent_in) => {
                        if let Some(channel) = self.channels.get_mut(index) {
                            channel.record_sent(segment.sequence, resent_in);
                        }
                    }
                    Err(error) => error!("Could not resend segment on channel {}: {}", index, error),
                }
            }

            let Some(channel) = self.channels.get_mut(index) else {
                continue;
            };
            let open_lost = channel
                .open_range()
                .is_some_and(|range| range.contains(packet_id));
            if open_lost && channel.received_acks() {
                self.cleanup_channel(index);
            }
        }
    }

    // Receiving

    /// Entry point for every datagram from the peer
    pub fn received_raw_packet(&mut self, bytes: &[u8]) {
        if self.is_closed() {
            return;
        }

        let packet = match self.processor.process_incoming(bytes) {
            Ok(Some(packet)) => packet,
            Ok(None) => {
                self.apply_initial_sequences();
                return;
            }
            Err(error) => {
                warn!("{}", error);
                self.security.record_event();
                self.close(CloseReason::SecurityViolation);
                return;
            }
        };

        self.apply_initial_sequences();
        if !self.sequences_initialized {
            return;
        }

        let bytes = packet.as_bytes();
        let Some(num_bits) = packet_bit_length(bytes) else {
            let error = if bytes.is_empty() {
                PacketError::ZeroLength
            } else {
                PacketError::MissingTerminator
            };
            self.malformed(error);
            return;
        };

        self.bandwidth.record_received(bytes.len());
        let mut reader = BitReader::with_bit_len(bytes, num_bits);
        self.received_packet(&mut reader);
    }

    fn malformed(&mut self, error: PacketError) {
        warn!("{}", error);
        self.close(CloseReason::MalformedPacket);
    }

    /// Processes one terminated packet: its id, then every ack and segment
    pub fn received_packet(&mut self, reader: &mut BitReader) {
        let packet_id = if self.config.internal_ack {
            self.in_packet_id + 1
        } else {
            match read_packet_id(reader, self.in_packet_id) {
                Ok(packet_id) => packet_id,
                Err(_) => {
                    self.malformed(PacketError::TruncatedPacketId);
                    return;
                }
            }
        };

        if packet_id <= self.in_packet_id {
            trace!(
                "Dropping out of order packet {} (last seen {})",
                packet_id,
                self.in_packet_id
            );
            self.bandwidth.record_out_of_order();
            return;
        }

        let lost = packet_id - self.in_packet_id - 1;
        if lost > 0 {
            self.bandwidth.record_in_lost(lost as u32);
        }
        self.in_packet_id = packet_id;
        self.has_received_packet = true;
        self.last_receive_time = self.time;

        let mut skip_ack = false;
        while !reader.at_end() {
            let is_ack = match reader.read_bit() {
                Ok(is_ack) => is_ack,
                Err(_) => {
                    self.malformed(PacketError::TruncatedSegment);
                    return;
                }
            };

            if is_ack {
                if self.config.internal_ack {
                    self.malformed(PacketError::UnexpectedAck);
                    return;
                }
                let reference = self.acks.out_ack_packet_id();
                match AckRecord::read(reader, reference, self.host.invert()) {
                    Ok(ack) => self.received_ack(ack),
                    Err(error) => {
                        self.malformed(error);
                        return;
                    }
                }
            } else {
                let channels = &self.channels;
                let segment = match Segment::read(reader, packet_id, &self.layout, |index| {
                    channels.in_reliable(index)
                }) {
                    Ok(segment) => segment,
                    Err(error @ PacketError::UnknownChannelType { .. }) => {
                        warn!("{}", error);
                        self.security.record_event();
                        self.close(CloseReason::SecurityViolation);
                        return;
                    }
                    Err(error) => {
                        self.malformed(error);
                        return;
                    }
                };

                if let Err(error) = self.received_segment(segment) {
                    warn!("Rejected segment, withholding ack for packet {}: {}", packet_id, error);
                    self.security.record_event();
                    skip_ack = true;
                }
            }

            if self.is_closed() {
                // the peer finishes its own close once this ack arrives
                if self.close_reason == Some(CloseReason::ControlChannelClosed)
                    && !skip_ack
                    && !self.config.internal_ack
                {
                    self.send_ack(packet_id, true);
                    self.flush_packet();
                }
                return;
            }
        }

        if !skip_ack && !self.config.internal_ack {
            self.send_ack(packet_id, true);
        }
    }

    fn received_segment(&mut self, segment: Segment) -> Result<(), SegmentError> {
        let index = segment.channel_index;
        let flags = segment.flags;

        if !self.channels.has_control()
            && (index != CONTROL_CHANNEL_INDEX || segment.kind != Some(ChannelKind::Control))
        {
            return Err(SegmentError::ControlChannelMissing { index });
        }

        if index == CONTROL_CHANNEL_INDEX && !self.channels.has_control() && flags.close && !flags.open {
            warn!("Received a control channel close before its open");
            self.close(CloseReason::IllegalSegment);
            return Ok(());
        }

        if flags.reliable && segment.sequence <= self.channels.in_reliable(index) {
            if self.config.internal_ack {
                error!(
                    "Duplicate reliable segment {} on channel {} over a lossless link",
                    segment.sequence, index
                );
            } else {
                trace!("Skipping duplicate segment {} on channel {}", segment.sequence, index);
            }
            return Ok(());
        }

        if !self.channels.contains(index) {
            self.open_remote_channel(&segment)?;
        }

        let limits = self.receive_limits();
        let Some(channel) = self.channels.get_mut(index) else {
            return Ok(());
        };
        match channel.receive_segment(segment, &limits, &mut self.received)? {
            ChannelReceive::Continue => {}
            ChannelReceive::Closed { .. } => self.cleanup_channel(index),
        }
        Ok(())
    }

    fn open_remote_channel(&mut self, segment: &Segment) -> Result<(), SegmentError> {
        let index = segment.channel_index;
        let flags = segment.flags;

        if !flags.reliable && !(flags.open && (flags.close || flags.partial)) {
            return Err(SegmentError::InvalidTemporaryOpen { index });
        }
        let Some(kind) = segment.kind else {
            return Err(SegmentError::IllegalOpen { index });
        };
        if !flags.open && !kind.opens_from_either_side() {
            return Err(SegmentError::NotOpen {
                index,
                sequence: segment.sequence,
            });
        }
        if self.channels.resolve_index(kind, Some(index)).is_err() {
            return Err(SegmentError::IllegalOpen { index });
        }

        self.channels.insert(index, kind, false);
        if kind.is_control() {
            self.had_control = true;
        }
        self.events.push(ConnectionEvent::ChannelOpened { index, kind });
        Ok(())
    }

    // Tick

    /// Advances the connection by `delta_seconds`
    pub fn tick(&mut self, delta_seconds: f64) {
        if self.is_closed() {
            return;
        }

        for packet in self.inbound.drain() {
            self.received_raw_packet(&packet);
            if self.is_closed() {
                return;
            }
        }

        self.time += delta_seconds;
        self.frame_time = delta_seconds;

        if self.config.internal_ack {
            let host_is_server = self.host == HostType::Server;
            for index in self.channels.indices_rev() {
                let Some(channel) = self.channels.get_mut(index) else {
                    continue;
                };
                channel.ack_all(host_is_server);
                if channel.received_acks() {
                    self.cleanup_channel(index);
                }
            }
        }

        self.bandwidth.update(self.time);

        if self.time - self.last_receive_time > self.timeout_value() {
            warn!(
                "Connection timed out after {:.1}s without a packet",
                self.time - self.last_receive_time
            );
            self.close(CloseReason::Timeout);
            return;
        }

        for index in self.channels.indices_rev() {
            let went_dormant = self
                .channels
                .get_mut(index)
                .is_some_and(|channel| channel.tick());
            if went_dormant {
                if let Err(error) = self.send_close(index) {
                    warn!("Could not send dormancy close on channel {}: {}", index, error);
                }
            }
        }

        if self.had_control && !self.channels.has_control() {
            self.close(CloseReason::ControlChannelClosed);
            return;
        }

        self.purge_acks();

        if (self.time_sensitive || self.keep_alive_due()) && self.ready_to_send() {
            self.flush_packet();
        }

        if let Err(error) = self.processor.tick(delta_seconds) {
            error!("Packet processor tick failed: {}", error);
        }
        match self.processor.drain_self_originated_packets() {
            Ok(packets) => {
                for packet in packets {
                    if let Err(error) = self.sender.send(&packet) {
                        warn!("{}", error);
                    }
                }
            }
            Err(error) => error!("Packet processor failed on its own packet: {}", error),
        }
        self.apply_initial_sequences();

        self.flow.decay(delta_seconds);

        if self.security.check(self.time) {
            self.close(CloseReason::ExcessErrorRate);
        }
    }
}
