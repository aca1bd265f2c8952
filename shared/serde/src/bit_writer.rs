use crate::{error::SerdeErr, integer::UnsignedVariableInteger, serde::Serde, wrapped::wrapped_bit_count};

pub trait BitWrite {
    fn write_bit(&mut self, bit: bool);
    fn write_byte(&mut self, byte: u8);
}

/// A growable, bit-granular write buffer.
///
/// Bits are packed least-significant first within each byte, so the final
/// byte of a buffer only ever carries zero padding above the last written
/// bit. A writer may be bounded with a maximum bit count: a write that would
/// exceed it is discarded and latches the overflow flag, see [`BitWriter::is_error`].
#[derive(Clone, Debug)]
pub struct BitWriter {
    buffer: Vec<u8>,
    num_bits: usize,
    max_bits: usize,
    overflowed: bool,
}

impl BitWriter {
    /// Create an unbounded writer
    pub fn new() -> Self {
        Self::with_max_bits(usize::MAX)
    }

    /// Create a writer that refuses to grow past `max_bits`
    pub fn with_max_bits(max_bits: usize) -> Self {
        let capacity = if max_bits == usize::MAX {
            64
        } else {
            max_bits.div_ceil(8)
        };
        Self {
            buffer: Vec::with_capacity(capacity),
            num_bits: 0,
            max_bits,
            overflowed: false,
        }
    }

    /// Create an unbounded writer holding every bit of `bytes`
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            buffer: bytes.to_vec(),
            num_bits: bytes.len() * 8,
            max_bits: usize::MAX,
            overflowed: false,
        }
    }

    /// Create an unbounded writer holding the first `num_bits` bits of `bytes`
    pub fn from_bits(bytes: &[u8], num_bits: usize) -> Result<Self, SerdeErr> {
        if num_bits > bytes.len() * 8 {
            return Err(SerdeErr);
        }
        let mut writer = Self::new();
        writer.write_bits_from_slice(bytes, num_bits);
        Ok(writer)
    }

    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    pub fn num_bytes(&self) -> usize {
        self.buffer.len()
    }

    pub fn max_bits(&self) -> usize {
        self.max_bits
    }

    pub fn set_max_bits(&mut self, max_bits: usize) {
        self.max_bits = max_bits;
    }

    /// Bits that can still be written before the writer overflows
    pub fn free_bits(&self) -> usize {
        self.max_bits.saturating_sub(self.num_bits)
    }

    pub fn is_empty(&self) -> bool {
        self.num_bits == 0
    }

    /// Whether any write has been discarded for lack of room
    pub fn is_error(&self) -> bool {
        self.overflowed
    }

    /// Clears the contents, keeping the allocation for the next packet
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.num_bits = 0;
        self.overflowed = false;
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.buffer.clone()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Reads back the bit at `index`
    pub fn bit(&self, index: usize) -> Option<bool> {
        if index >= self.num_bits {
            return None;
        }
        Some(self.buffer[index / 8] & (1 << (index % 8)) != 0)
    }

    fn allow_append(&mut self, bit_count: usize) -> bool {
        if self.num_bits + bit_count > self.max_bits {
            self.overflowed = true;
            return false;
        }
        true
    }

    fn push_bit_unchecked(&mut self, bit: bool) {
        let bit_index = self.num_bits % 8;
        if bit_index == 0 {
            self.buffer.push(0);
        }
        if bit {
            let last = self.buffer.len() - 1;
            self.buffer[last] |= 1 << bit_index;
        }
        self.num_bits += 1;
    }

    /// Appends the low `bit_count` bits of `value`
    pub fn write_int(&mut self, value: u32, bit_count: u32) {
        if !self.allow_append(bit_count as usize) {
            return;
        }
        let mut temp = value;
        for _ in 0..bit_count {
            self.push_bit_unchecked(temp & 1 != 0);
            temp >>= 1;
        }
    }

    /// Writes `value` in the fewest bits able to hold any value in `[0, modulus)`.
    /// Values at or above the modulus are reduced first, which is how wrapping
    /// sequence numbers travel.
    pub fn write_int_wrapped(&mut self, value: u32, modulus: u32) {
        if modulus == 0 {
            return;
        }
        self.write_int(value % modulus, wrapped_bit_count(modulus));
    }

    /// Writes a variable-length unsigned integer in 7-bit groups
    pub fn write_int_packed(&mut self, value: u32) {
        UnsignedVariableInteger::<7>::new(value).ser(self);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if !self.allow_append(bytes.len() * 8) {
            return;
        }
        if self.num_bits % 8 == 0 {
            self.buffer.extend_from_slice(bytes);
            self.num_bits += bytes.len() * 8;
            return;
        }
        for byte in bytes {
            let mut temp = *byte;
            for _ in 0..8 {
                self.push_bit_unchecked(temp & 1 != 0);
                temp >>= 1;
            }
        }
    }

    /// Appends the first `bit_count` bits of `bytes`
    pub fn write_bits_from_slice(&mut self, bytes: &[u8], bit_count: usize) {
        let bit_count = bit_count.min(bytes.len() * 8);
        if !self.allow_append(bit_count) {
            return;
        }
        if self.num_bits % 8 == 0 {
            let whole_bytes = bit_count / 8;
            self.buffer.extend_from_slice(&bytes[..whole_bytes]);
            self.num_bits += whole_bytes * 8;
            let remainder = bit_count % 8;
            if remainder > 0 {
                let mask = (1u16 << remainder) as u8 - 1;
                self.buffer.push(bytes[whole_bytes] & mask);
                self.num_bits += remainder;
            }
            return;
        }
        for index in 0..bit_count {
            self.push_bit_unchecked(bytes[index / 8] & (1 << (index % 8)) != 0);
        }
    }

    /// Appends every bit held by `other`
    pub fn write_bits(&mut self, other: &BitWriter) {
        self.write_bits_from_slice(&other.buffer, other.num_bits);
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for BitWriter {
    fn eq(&self, other: &Self) -> bool {
        self.num_bits == other.num_bits && self.buffer == other.buffer
    }
}

impl Eq for BitWriter {}

impl BitWrite for BitWriter {
    fn write_bit(&mut self, bit: bool) {
        if !self.allow_append(1) {
            return;
        }
        self.push_bit_unchecked(bit);
    }

    fn write_byte(&mut self, byte: u8) {
        self.write_int(u32::from(byte), 8);
    }
}
