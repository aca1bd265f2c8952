use crate::{
    bit_reader::BitReader, bit_writer::BitWrite, error::SerdeErr, serde::Serde, ConstBitLength,
};

pub type UnsignedInteger<const BITS: u8> = SerdeInteger<false, BITS>;
pub type UnsignedVariableInteger<const BITS: u8> = SerdeInteger<true, BITS>;

/// An unsigned integer written in `BITS` bits, or, when `VARIABLE`, in as
/// many `BITS`-wide groups as needed, each preceded by a continuation bit.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct SerdeInteger<const VARIABLE: bool, const BITS: u8> {
    value: u64,
}

impl<const BITS: u8> SerdeInteger<false, BITS> {
    /// Fails if `value` does not fit in `BITS` bits
    pub fn try_new<T: Into<u64>>(value: T) -> Result<Self, SerdeErr> {
        let value = value.into();
        if BITS < 64 && value >= (1u64 << BITS) {
            return Err(SerdeErr);
        }
        Ok(Self { value })
    }
}

impl<const BITS: u8> SerdeInteger<true, BITS> {
    pub fn new<T: Into<u64>>(value: T) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl<const VARIABLE: bool, const BITS: u8> SerdeInteger<VARIABLE, BITS> {
    pub fn get(&self) -> u64 {
        self.value
    }
}

impl<const VARIABLE: bool, const BITS: u8> Serde for SerdeInteger<VARIABLE, BITS> {
    fn ser(&self, writer: &mut dyn BitWrite) {
        let mut value = self.value;
        if VARIABLE {
            loop {
                let proceed = BITS < 64 && value >= (1u64 << BITS);
                writer.write_bit(proceed);
                for _ in 0..BITS {
                    writer.write_bit(value & 1 != 0);
                    value >>= 1;
                }
                if !proceed {
                    return;
                }
            }
        } else {
            for _ in 0..BITS {
                writer.write_bit(value & 1 != 0);
                value >>= 1;
            }
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let mut value: u64 = 0;
        let mut shift: u32 = 0;
        loop {
            let proceed = if VARIABLE { reader.read_bit()? } else { false };
            for _ in 0..BITS {
                let bit = reader.read_bit()?;
                if bit {
                    if shift >= 64 {
                        // SECURITY: a peer streaming continuation groups forever
                        reader.set_error();
                        return Err(SerdeErr);
                    }
                    value |= 1u64 << shift;
                }
                shift += 1;
            }
            if !proceed {
                return Ok(Self { value });
            }
            if shift >= 64 {
                reader.set_error();
                return Err(SerdeErr);
            }
        }
    }

    fn bit_length(&self) -> u32 {
        if !VARIABLE {
            return u32::from(BITS);
        }
        let mut output: u32 = 0;
        let mut value = self.value;
        loop {
            let proceed = BITS < 64 && value >= (1u64 << BITS);
            output += 1 + u32::from(BITS);
            if BITS < 64 {
                value >>= BITS;
            }
            if !proceed {
                return output;
            }
        }
    }
}

impl<const BITS: u8> ConstBitLength for SerdeInteger<false, BITS> {
    fn const_bit_length() -> u32 {
        u32::from(BITS)
    }
}
