use std::collections::VecDeque;

use log::{info, trace, warn};

use tether_serde::{BitReader, BitWriter};

use crate::{
    channel::{
        channel_kind::ChannelKind,
        error::{ChannelError, SegmentError},
        partial::PartialAssembly,
    },
    packet::{Segment, SegmentFlags},
    sequence_list::SequenceList,
    types::{ChannelIndex, ChannelSequence, PacketId, PacketIdRange},
};

/// How a payload should travel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub reliable: bool,
    pub replication_paused: bool,
    pub has_exports: bool,
    pub has_must_be_mapped: bool,
}

impl SendOptions {
    pub fn reliable() -> Self {
        Self {
            reliable: true,
            ..Default::default()
        }
    }

    pub fn unreliable() -> Self {
        Self::default()
    }
}

/// Connection-wide bounds a send is checked against
#[derive(Clone, Copy, Debug)]
pub struct SendLimits {
    /// Largest payload one segment may carry in an otherwise empty packet
    pub max_single_segment_bits: usize,
    pub max_partial_bytes: usize,
    pub partial_reliable_threshold: usize,
    pub reliable_buffer: usize,
    pub internal_ack: bool,
}

/// Connection-wide bounds a received segment is checked against
#[derive(Clone, Copy, Debug)]
pub struct ReceiveLimits {
    pub reliable_buffer: usize,
    pub max_partial_bytes: usize,
}

/// The reliable counters of one channel slot. They outlive the channel so
/// that a later channel at the same index continues the sequence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SequenceCounters {
    pub in_reliable: ChannelSequence,
    pub out_reliable: ChannelSequence,
}

/// A complete message handed up to the application
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceivedSegment {
    pub channel_index: ChannelIndex,
    pub kind: ChannelKind,
    pub flags: SegmentFlags,
    pub payload: BitWriter,
}

impl ReceivedSegment {
    pub fn payload_bytes(&self) -> &[u8] {
        self.payload.as_bytes()
    }
}

/// What receiving a segment did to the channel
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelReceive {
    Continue,
    /// A close was processed. The channel must be removed.
    Closed { dormant: bool },
}

#[derive(Clone, Debug)]
struct OutgoingSegment {
    segment: Segment,
    acked: bool,
}

/// One logical stream inside a connection: reliable sequencing, the
/// outstanding-segment window, the in-order receive queue and partial
/// reassembly. It refers to its connection only through its index.
pub struct Channel {
    index: ChannelIndex,
    kind: ChannelKind,
    opened_locally: bool,
    open_range: Option<PacketIdRange>,
    open_acked: bool,
    open_temporary: bool,
    closing: bool,
    dormant: bool,
    pending_dormancy: bool,
    paused_until_reliable_ack: bool,
    counters: SequenceCounters,
    outstanding: VecDeque<OutgoingSegment>,
    in_queue: SequenceList<Segment>,
    partial: Option<PartialAssembly>,
}

impl Channel {
    pub fn new(
        index: ChannelIndex,
        kind: ChannelKind,
        opened_locally: bool,
        counters: SequenceCounters,
    ) -> Self {
        Self {
            index,
            kind,
            opened_locally,
            open_range: None,
            open_acked: false,
            open_temporary: false,
            closing: false,
            dormant: false,
            pending_dormancy: false,
            paused_until_reliable_ack: false,
            counters,
            outstanding: VecDeque::new(),
            in_queue: SequenceList::new(),
            partial: None,
        }
    }

    pub fn index(&self) -> ChannelIndex {
        self.index
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn opened_locally(&self) -> bool {
        self.opened_locally
    }

    pub fn open_range(&self) -> Option<PacketIdRange> {
        self.open_range
    }

    pub fn is_open_acked(&self) -> bool {
        self.open_acked
    }

    pub fn is_open_temporary(&self) -> bool {
        self.open_temporary
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }

    pub fn is_dormant(&self) -> bool {
        self.dormant
    }

    pub fn is_pending_dormancy(&self) -> bool {
        self.pending_dormancy
    }

    /// Set while a payload forced onto the reliable path is unacked
    pub fn is_paused_until_reliable_ack(&self) -> bool {
        self.paused_until_reliable_ack
    }

    pub fn counters(&self) -> SequenceCounters {
        self.counters
    }

    pub fn set_counters(&mut self, counters: SequenceCounters) {
        self.counters = counters;
    }

    pub fn in_reliable(&self) -> ChannelSequence {
        self.counters.in_reliable
    }

    pub fn out_reliable(&self) -> ChannelSequence {
        self.counters.out_reliable
    }

    pub fn num_outstanding(&self) -> usize {
        self.outstanding.len()
    }

    pub fn num_queued(&self) -> usize {
        self.in_queue.len()
    }

    /// False once the outstanding reliable window is about to fill
    pub fn is_net_ready(&self, reliable_buffer: usize) -> bool {
        self.outstanding.len() + 1 < reliable_buffer
    }

    // Sending

    /// Turns one payload into the segments that carry it. Reliable segments
    /// get their sequences and join the outstanding window here, the caller
    /// writes each one and reports its packet id through [`Channel::record_sent`].
    pub fn prepare_send(
        &mut self,
        payload: BitWriter,
        options: SendOptions,
        close: bool,
        limits: &SendLimits,
    ) -> Result<Vec<Segment>, ChannelError> {
        if self.closing {
            return Err(ChannelError::Closing { index: self.index });
        }

        let bytes = payload.num_bytes();
        if bytes > limits.max_partial_bytes {
            return Err(ChannelError::PayloadTooLarge {
                bytes,
                max_bytes: limits.max_partial_bytes,
            });
        }

        let opens = self.open_range.is_none() && self.opened_locally;
        let temporary = if opens {
            !options.reliable
        } else {
            self.open_temporary
        };
        if temporary && options.reliable {
            return Err(ChannelError::ReliableOnTemporary { index: self.index });
        }

        let parts = split_payload(payload, limits.max_single_segment_bits);
        let part_count = parts.len();
        let overflows = self.outstanding.len() + part_count >= limits.reliable_buffer + usize::from(close);

        let mut reliable = options.reliable;
        let threshold = limits.partial_reliable_threshold;
        if part_count > 1
            && threshold > 0
            && part_count >= threshold
            && !limits.internal_ack
            && !temporary
            && !reliable
        {
            if overflows {
                warn!(
                    "Channel {}: {} fragments exceed the reliable threshold of {} but forcing them reliable would overflow the reliable buffer",
                    self.index, part_count, threshold
                );
            } else {
                trace!(
                    "Channel {}: {} fragments exceed the reliable threshold of {}, sending reliably",
                    self.index, part_count, threshold
                );
                reliable = true;
                self.paused_until_reliable_ack = true;
            }
        }

        if reliable && overflows {
            return Err(ChannelError::ReliableBufferOverflow {
                index: self.index,
                outstanding: self.outstanding.len(),
                needed: part_count,
            });
        }

        if opens && !reliable && !close && part_count == 1 {
            return Err(ChannelError::UnreliableOpen { index: self.index });
        }

        if opens {
            self.open_temporary = temporary;
        }

        let base_flags = SegmentFlags {
            open: opens,
            close,
            dormant: close && self.dormant,
            reliable,
            replication_paused: options.replication_paused,
            has_exports: options.has_exports,
            has_must_be_mapped: options.has_must_be_mapped,
            ..Default::default()
        };

        let last = part_count - 1;
        let mut segments = Vec::with_capacity(part_count);
        for (number, part) in parts.into_iter().enumerate() {
            let mut flags = base_flags;
            if part_count > 1 {
                flags.partial = true;
                flags.partial_initial = number == 0;
                flags.partial_final = number == last;
                flags.open &= number == 0;
                flags.close &= number == last;
                flags.dormant &= number == last;
            }

            let mut segment = Segment::new(self.index, self.kind, flags, part);
            if reliable {
                self.counters.out_reliable += 1;
                segment.sequence = self.counters.out_reliable;
                self.outstanding.push_back(OutgoingSegment {
                    segment: segment.clone(),
                    acked: false,
                });
            }
            segments.push(segment);
        }

        if close {
            self.closing = true;
        }

        Ok(segments)
    }

    /// Notes the packet an outstanding reliable segment was (re)written into
    pub fn record_sent(&mut self, sequence: ChannelSequence, packet_id: PacketId) {
        if let Some(outgoing) = self
            .outstanding
            .iter_mut()
            .rev()
            .find(|outgoing| outgoing.segment.sequence == sequence)
        {
            outgoing.segment.packet_id = packet_id;
            outgoing.acked = false;
        }
    }

    pub fn set_open_range(&mut self, range: PacketIdRange) {
        self.open_range = Some(range);
    }

    // Acks

    /// Marks every outstanding segment carried by `packet_id`
    pub fn received_ack(&mut self, packet_id: PacketId) {
        if self.open_range.is_some_and(|range| range.last == packet_id) {
            // unreliable opens are only ever confirmed here
            self.open_acked = true;
        }

        for outgoing in self.outstanding.iter_mut() {
            if outgoing.segment.flags.open {
                // a reliable open is confirmed once all its fragments are released
                self.open_acked = false;
            }
            if outgoing.segment.packet_id == packet_id {
                outgoing.acked = true;
            }
        }
    }

    /// Releases acked segments from the front of the window, in order.
    /// Returns true when the channel is done and must be cleaned up.
    pub fn received_acks(&mut self) -> bool {
        let mut do_close = false;

        while let Some(front) = self.outstanding.front() {
            if !front.acked {
                break;
            }

            if front.segment.flags.open {
                let open_finished = !front.segment.flags.partial || self.open_fragments_acked();
                if !open_finished {
                    break;
                }
                trace!("Channel {} is fully acked", self.index);
                self.open_acked = true;
            }

            do_close |= front.segment.flags.close;
            self.outstanding.pop_front();
        }

        if self.outstanding.is_empty() {
            self.paused_until_reliable_ack = false;
        }

        do_close || (self.open_temporary && self.open_acked)
    }

    fn open_fragments_acked(&self) -> bool {
        for outgoing in self.outstanding.iter() {
            if !outgoing.acked {
                return false;
            }
            if outgoing.segment.flags.partial_final {
                break;
            }
        }
        true
    }

    /// Outstanding segments lost with `packet_id`, cloned for retransmission
    pub fn naked_segments(&self, packet_id: PacketId) -> Vec<Segment> {
        self.outstanding
            .iter()
            .filter(|outgoing| outgoing.segment.packet_id == packet_id && !outgoing.acked)
            .map(|outgoing| outgoing.segment.clone())
            .collect()
    }

    /// Treats everything outstanding as acked, for transports that never lose
    /// packets
    pub fn ack_all(&mut self, host_is_server: bool) {
        for outgoing in self.outstanding.iter_mut() {
            outgoing.acked = true;
        }
        if host_is_server || self.opened_locally {
            self.open_acked = true;
        }
    }

    // Dormancy

    pub fn set_pending_dormancy(&mut self) -> Result<(), ChannelError> {
        if !self.kind.supports_dormancy() {
            return Err(ChannelError::DormancyUnsupported { kind: self.kind });
        }
        self.pending_dormancy = true;
        Ok(())
    }

    pub fn flush_dormancy(&mut self) {
        self.dormant = false;
        self.pending_dormancy = false;
    }

    fn ready_for_dormancy(&self) -> bool {
        !self.closing && self.outstanding.is_empty()
    }

    /// Returns true when the channel just went dormant and its close must be
    /// sent
    pub fn tick(&mut self) -> bool {
        if self.pending_dormancy && self.ready_for_dormancy() {
            info!("Channel {} going dormant", self.index);
            self.pending_dormancy = false;
            self.dormant = true;
            return true;
        }
        false
    }

    // Receiving

    /// Takes one decoded segment addressed to this channel. Complete messages
    /// are pushed onto `delivered`.
    pub fn receive_segment(
        &mut self,
        segment: Segment,
        limits: &ReceiveLimits,
        delivered: &mut Vec<ReceivedSegment>,
    ) -> Result<ChannelReceive, SegmentError> {
        if segment.flags.reliable && segment.sequence != self.counters.in_reliable + 1 {
            return self.queue_out_of_order(segment, limits);
        }

        if let ChannelReceive::Closed { dormant } = self.receive_next(segment, limits, delivered)? {
            return Ok(ChannelReceive::Closed { dormant });
        }

        while let Some((sequence, _)) = self.in_queue.front() {
            if *sequence != self.counters.in_reliable + 1 {
                break;
            }
            let Some((sequence, queued)) = self.in_queue.pop_front() else {
                break;
            };
            trace!("Channel {}: releasing queued segment {}", self.index, sequence);
            if let ChannelReceive::Closed { dormant } = self.receive_next(queued, limits, delivered)? {
                return Ok(ChannelReceive::Closed { dormant });
            }
        }

        Ok(ChannelReceive::Continue)
    }

    fn queue_out_of_order(
        &mut self,
        segment: Segment,
        limits: &ReceiveLimits,
    ) -> Result<ChannelReceive, SegmentError> {
        let sequence = segment.sequence;
        if self.in_queue.contains_scan_from_back(&sequence) {
            trace!("Channel {}: segment {} already queued", self.index, sequence);
            return Ok(ChannelReceive::Continue);
        }
        if self.in_queue.len() + 1 >= limits.reliable_buffer {
            return Err(SegmentError::ReliableBufferFull {
                index: self.index,
                queued: self.in_queue.len(),
            });
        }

        trace!(
            "Channel {}: queuing segment {} until {} arrives",
            self.index,
            sequence,
            self.counters.in_reliable + 1
        );
        if self.in_queue.try_insert_scan_from_back(sequence, segment).is_err() {
            trace!("Channel {}: segment {} already queued", self.index, sequence);
        }
        Ok(ChannelReceive::Continue)
    }

    fn receive_next(
        &mut self,
        segment: Segment,
        limits: &ReceiveLimits,
        delivered: &mut Vec<ReceivedSegment>,
    ) -> Result<ChannelReceive, SegmentError> {
        if segment.flags.reliable {
            self.counters.in_reliable = segment.sequence;
        }

        let handled = if segment.flags.partial {
            self.receive_partial(segment, limits)?
        } else {
            let packet_id = segment.packet_id;
            Some((segment, packet_id))
        };
        let Some((segment, last_packet_id)) = handled else {
            return Ok(ChannelReceive::Continue);
        };

        if segment.flags.open {
            self.open_range = Some(PacketIdRange {
                first: segment.packet_id,
                last: last_packet_id,
            });
            self.open_acked = true;
            trace!("Channel {} is now fully open", self.index);
        }

        if !self.kind.opens_from_either_side() && !self.opened_locally && !self.open_acked {
            return if segment.flags.reliable {
                Err(SegmentError::NotOpen {
                    index: self.index,
                    sequence: segment.sequence,
                })
            } else {
                Err(SegmentError::InvalidTemporaryOpen { index: self.index })
            };
        }

        Ok(self.receive_sequenced(segment, delivered))
    }

    fn receive_partial(
        &mut self,
        fragment: Segment,
        limits: &ReceiveLimits,
    ) -> Result<Option<(Segment, PacketId)>, SegmentError> {
        if fragment.flags.partial_initial {
            if let Some(partial) = &self.partial {
                if partial.is_reliable() && !fragment.flags.reliable {
                    return Err(SegmentError::UnreliableOverReliablePartial { index: self.index });
                }
                trace!(
                    "Channel {}: discarding incomplete partial {}",
                    self.index,
                    partial.sequence()
                );
            }
            self.partial = None;
            let assembly = PartialAssembly::begin(fragment, limits.max_partial_bytes)?;
            if assembly.is_complete() {
                return Ok(Some(assembly.finish()));
            }
            self.partial = Some(assembly);
            return Ok(None);
        }

        let continues = self
            .partial
            .as_ref()
            .is_some_and(|partial| partial.continues(&fragment));
        if !continues {
            if self.partial.as_ref().is_some_and(|partial| partial.is_reliable())
                && !fragment.flags.reliable
            {
                return Err(SegmentError::UnreliableOverReliablePartial { index: self.index });
            }
            self.partial = None;
            return Err(SegmentError::PartialMismatch {
                index: self.index,
                sequence: fragment.sequence,
            });
        }

        let Some(mut assembly) = self.partial.take() else {
            return Ok(None);
        };
        assembly.append(fragment, limits.max_partial_bytes)?;
        if assembly.is_complete() {
            trace!(
                "Channel {}: completed partial of {} bytes",
                self.index,
                assembly.num_bytes()
            );
            return Ok(Some(assembly.finish()));
        }
        self.partial = Some(assembly);
        Ok(None)
    }

    fn receive_sequenced(
        &mut self,
        segment: Segment,
        delivered: &mut Vec<ReceivedSegment>,
    ) -> ChannelReceive {
        // a close carries no message of its own
        let bare_close = segment.flags.close && segment.payload.is_empty();
        if !self.closing && !bare_close {
            delivered.push(ReceivedSegment {
                channel_index: self.index,
                kind: self.kind,
                flags: segment.flags,
                payload: segment.payload,
            });
        }

        if segment.flags.close {
            self.dormant = segment.flags.dormant;
            if !self.in_queue.is_empty() {
                warn!(
                    "Channel {} closed at sequence {} with {} segments still queued",
                    self.index,
                    segment.sequence,
                    self.in_queue.len()
                );
            }
            return ChannelReceive::Closed {
                dormant: segment.flags.dormant,
            };
        }

        ChannelReceive::Continue
    }
}

/// Splits a payload into byte-aligned parts no larger than one segment.
/// Only the last part may end mid-byte.
fn split_payload(payload: BitWriter, max_single_segment_bits: usize) -> Vec<BitWriter> {
    let total_bits = payload.num_bits();
    if total_bits <= max_single_segment_bits {
        return vec![payload];
    }

    let part_bits = ((max_single_segment_bits / 8) * 8).max(8);
    let mut reader = BitReader::from_writer(&payload);
    let mut parts = Vec::with_capacity(total_bits.div_ceil(part_bits));
    while reader.bits_left() > 0 {
        let bits = reader.bits_left().min(part_bits);
        match reader.read_bits(bits) {
            Ok(part) => parts.push(part),
            Err(_) => break,
        }
    }
    parts
}
