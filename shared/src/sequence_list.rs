use thiserror::Error;

use crate::types::ChannelSequence;

/// Errors that can occur during SequenceList operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequenceError {
    /// Attempted to insert a duplicate ID into the sequence list
    #[error("Duplicate sequence ID {id} not allowed in SequenceList")]
    DuplicateId { id: ChannelSequence },
}

/// Items kept sorted by ascending sequence. Inserts usually land near the
/// back, so scans start there.
pub struct SequenceList<T> {
    list: Vec<(ChannelSequence, T)>,
}

impl<T> SequenceList<T> {
    pub fn new() -> Self {
        Self { list: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn front(&self) -> Option<&(ChannelSequence, T)> {
        self.list.first()
    }

    pub fn pop_front(&mut self) -> Option<(ChannelSequence, T)> {
        if self.list.is_empty() {
            return None;
        }
        Some(self.list.remove(0))
    }

    pub fn contains_scan_from_back(&self, id: &ChannelSequence) -> bool {
        for (old_id, _) in self.list.iter().rev() {
            if old_id == id {
                return true;
            }
            if old_id < id {
                return false;
            }
        }
        false
    }

    /// Attempts to insert an item with the given ID, scanning from the back.
    /// Returns an error if the ID already exists.
    pub fn try_insert_scan_from_back(
        &mut self,
        id: ChannelSequence,
        item: T,
    ) -> Result<(), SequenceError> {
        let mut index = self.list.len();

        loop {
            if index == 0 {
                // made it all the way through, insert at front and be done
                self.list.insert(0, (id, item));
                return Ok(());
            }

            index -= 1;

            let old_id = self.list[index].0;
            if old_id == id {
                return Err(SequenceError::DuplicateId { id });
            }
            if old_id < id {
                self.list.insert(index + 1, (id, item));
                return Ok(());
            }
        }
    }

    pub fn clear(&mut self) {
        self.list.clear();
    }
}

impl<T> Default for SequenceList<T> {
    fn default() -> Self {
        Self::new()
    }
}
