use std::collections::HashMap;

use log::info;

use crate::{
    channel::{
        channel::{Channel, SequenceCounters},
        channel_kind::ChannelKind,
        error::ChannelError,
    },
    constants::{CONTROL_CHANNEL_INDEX, FIRST_DYNAMIC_CHANNEL_INDEX, VOICE_CHANNEL_INDEX},
    types::{ChannelIndex, ChannelSequence},
};

/// The live channels of one connection, plus the reliable counters of slots
/// whose channel has gone away
pub struct ChannelTable {
    max_channels: usize,
    channels: HashMap<ChannelIndex, Channel>,
    open_order: Vec<ChannelIndex>,
    parked: HashMap<ChannelIndex, SequenceCounters>,
    initial: SequenceCounters,
}

impl ChannelTable {
    pub fn new(max_channels: usize) -> Self {
        Self {
            max_channels,
            channels: HashMap::new(),
            open_order: Vec::new(),
            parked: HashMap::new(),
            initial: SequenceCounters::default(),
        }
    }

    pub fn max_channels(&self) -> usize {
        self.max_channels
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn contains(&self, index: ChannelIndex) -> bool {
        self.channels.contains_key(&index)
    }

    pub fn has_control(&self) -> bool {
        self.contains(CONTROL_CHANNEL_INDEX)
    }

    pub fn get(&self, index: ChannelIndex) -> Option<&Channel> {
        self.channels.get(&index)
    }

    pub fn get_mut(&mut self, index: ChannelIndex) -> Option<&mut Channel> {
        self.channels.get_mut(&index)
    }

    /// Live channels, most recently opened first
    pub fn indices_rev(&self) -> Vec<ChannelIndex> {
        self.open_order.iter().rev().copied().collect()
    }

    pub fn channels_mut(&mut self) -> impl Iterator<Item = &mut Channel> {
        self.channels.values_mut()
    }

    /// Last reliable sequence processed on `index`, whether or not a channel
    /// lives there right now
    pub fn in_reliable(&self, index: ChannelIndex) -> ChannelSequence {
        self.counters(index).in_reliable
    }

    fn counters(&self, index: ChannelIndex) -> SequenceCounters {
        if let Some(channel) = self.channels.get(&index) {
            return channel.counters();
        }
        self.parked.get(&index).copied().unwrap_or(self.initial)
    }

    /// Restarts every slot from the negotiated initial sequences
    pub fn set_initial(&mut self, counters: SequenceCounters) {
        self.initial = counters;
        self.parked.clear();
        for channel in self.channels.values_mut() {
            channel.set_counters(counters);
        }
    }

    /// Picks the slot a new channel of `kind` goes into
    pub fn resolve_index(
        &self,
        kind: ChannelKind,
        index: Option<ChannelIndex>,
    ) -> Result<ChannelIndex, ChannelError> {
        let index = match index {
            Some(index) => index,
            None => match kind {
                ChannelKind::Control => CONTROL_CHANNEL_INDEX,
                ChannelKind::Voice => VOICE_CHANNEL_INDEX,
                _ => self
                    .first_free(FIRST_DYNAMIC_CHANNEL_INDEX)
                    .ok_or(ChannelError::TableFull { kind })?,
            },
        };

        if index >= self.max_channels {
            return Err(ChannelError::IndexOutOfRange {
                index,
                max_channels: self.max_channels,
            });
        }
        if self.contains(index) {
            return Err(ChannelError::ChannelInUse { index });
        }

        let control_mismatch = (index == CONTROL_CHANNEL_INDEX) != kind.is_control();
        let voice_mismatch = (index == VOICE_CHANNEL_INDEX) != (kind == ChannelKind::Voice);
        if control_mismatch || voice_mismatch {
            return Err(ChannelError::ReservedIndex { index, kind });
        }

        if !kind.is_control() && !self.has_control() {
            return Err(ChannelError::ControlChannelMissing { kind });
        }

        Ok(index)
    }

    pub fn first_free(&self, from: ChannelIndex) -> Option<ChannelIndex> {
        (from..self.max_channels).find(|index| !self.contains(*index))
    }

    /// Creates a channel in a slot validated by [`ChannelTable::resolve_index`].
    /// The channel continues the counters last used at that index.
    pub fn insert(
        &mut self,
        index: ChannelIndex,
        kind: ChannelKind,
        opened_locally: bool,
    ) -> &mut Channel {
        let counters = self.parked.remove(&index).unwrap_or(self.initial);
        info!(
            "Opened {} channel {} ({})",
            kind,
            index,
            if opened_locally { "local" } else { "remote" }
        );
        self.open_order.retain(|open| *open != index);
        self.open_order.push(index);
        self.channels
            .entry(index)
            .or_insert_with(|| Channel::new(index, kind, opened_locally, counters))
    }

    /// Drops the channel, keeping its counters for the next channel at the
    /// same index
    pub fn remove(&mut self, index: ChannelIndex) -> Option<Channel> {
        let channel = self.channels.remove(&index)?;
        self.open_order.retain(|open| *open != index);
        self.parked.insert(index, channel.counters());
        info!("Closed {} channel {}", channel.kind(), index);
        Some(channel)
    }
}
