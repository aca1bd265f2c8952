use crate::{
    bit_writer::BitWriter, error::SerdeErr, integer::UnsignedVariableInteger, serde::Serde,
    wrapped::wrapped_bit_count,
};

/// Reads a bit stream produced by [`BitWriter`].
///
/// Every read is bounds checked against the logical bit length. Running
/// past the end returns [`SerdeErr`] and latches the error flag, so a parser
/// that tolerates one failed read can still detect it later.
pub struct BitReader<'b> {
    buffer: &'b [u8],
    num_bits: usize,
    position: usize,
    error: bool,
}

impl<'b> BitReader<'b> {
    pub fn new(buffer: &'b [u8]) -> Self {
        Self::with_bit_len(buffer, buffer.len() * 8)
    }

    /// Only the first `num_bits` bits of `buffer` are readable
    pub fn with_bit_len(buffer: &'b [u8], num_bits: usize) -> Self {
        Self {
            buffer,
            num_bits: num_bits.min(buffer.len() * 8),
            position: 0,
            error: false,
        }
    }

    pub fn from_writer(writer: &'b BitWriter) -> Self {
        Self::with_bit_len(writer.as_bytes(), writer.num_bits())
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    pub fn bits_left(&self) -> usize {
        self.num_bits - self.position
    }

    pub fn at_end(&self) -> bool {
        self.position >= self.num_bits
    }

    pub fn is_error(&self) -> bool {
        self.error
    }

    /// Latches the error flag, for parsers that detect invalid data
    /// themselves
    pub fn set_error(&mut self) {
        self.error = true;
    }

    fn ensure(&mut self, bit_count: usize) -> Result<(), SerdeErr> {
        if self.error || bit_count > self.bits_left() {
            self.error = true;
            return Err(SerdeErr);
        }
        Ok(())
    }

    fn next_bit_unchecked(&mut self) -> bool {
        let bit = self.buffer[self.position / 8] & (1 << (self.position % 8)) != 0;
        self.position += 1;
        bit
    }

    pub fn read_bit(&mut self) -> Result<bool, SerdeErr> {
        self.ensure(1)?;
        Ok(self.next_bit_unchecked())
    }

    pub fn read_byte(&mut self) -> Result<u8, SerdeErr> {
        let value = self.read_int(8)?;
        Ok(value as u8)
    }

    /// Reads `bit_count` bits, least significant first
    pub fn read_int(&mut self, bit_count: u32) -> Result<u32, SerdeErr> {
        self.ensure(bit_count as usize)?;
        let mut value: u32 = 0;
        for index in 0..bit_count {
            if self.next_bit_unchecked() {
                value |= 1 << index;
            }
        }
        Ok(value)
    }

    /// Reads a value written with [`BitWriter::write_int_wrapped`]. When the
    /// modulus is not a power of two the raw value may still be at or above
    /// it, and it is up to the caller to reject that.
    pub fn read_int_wrapped(&mut self, modulus: u32) -> Result<u32, SerdeErr> {
        if modulus == 0 {
            return Ok(0);
        }
        self.read_int(wrapped_bit_count(modulus))
    }

    pub fn read_int_packed(&mut self) -> Result<u32, SerdeErr> {
        let value = UnsignedVariableInteger::<7>::de(self)?.get();
        u32::try_from(value).map_err(|_| {
            self.error = true;
            SerdeErr
        })
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, SerdeErr> {
        self.ensure(count * 8)?;
        let mut output = Vec::with_capacity(count);
        if self.position % 8 == 0 {
            let start = self.position / 8;
            output.extend_from_slice(&self.buffer[start..start + count]);
            self.position += count * 8;
            return Ok(output);
        }
        for _ in 0..count {
            let mut byte: u8 = 0;
            for index in 0..8 {
                if self.next_bit_unchecked() {
                    byte |= 1 << index;
                }
            }
            output.push(byte);
        }
        Ok(output)
    }

    /// Copies the next `bit_count` bits into an owned buffer
    pub fn read_bits(&mut self, bit_count: usize) -> Result<BitWriter, SerdeErr> {
        self.ensure(bit_count)?;
        let mut output = BitWriter::new();
        if self.position % 8 == 0 {
            let start = self.position / 8;
            let end = (self.position + bit_count).div_ceil(8);
            output.write_bits_from_slice(&self.buffer[start..end], bit_count);
            self.position += bit_count;
            return Ok(output);
        }
        let mut chunk: u8 = 0;
        let mut chunk_bits = 0;
        let mut bytes = Vec::with_capacity(bit_count.div_ceil(8));
        for _ in 0..bit_count {
            if self.next_bit_unchecked() {
                chunk |= 1 << chunk_bits;
            }
            chunk_bits += 1;
            if chunk_bits == 8 {
                bytes.push(chunk);
                chunk = 0;
                chunk_bits = 0;
            }
        }
        if chunk_bits > 0 {
            bytes.push(chunk);
        }
        output.write_bits_from_slice(&bytes, bit_count);
        Ok(output)
    }
}
