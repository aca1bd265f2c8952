//! # Tether Serde
//! Bit-granular reading and writing for the tether wire protocol.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod bit_reader;
mod bit_writer;
mod constants;
mod error;
mod integer;
mod serde;
mod wrapped;

pub use bit_reader::BitReader;
pub use bit_writer::{BitWrite, BitWriter};
pub use constants::{MTU_SIZE_BITS, MTU_SIZE_BYTES};
pub use error::SerdeErr;
pub use integer::{SerdeInteger, UnsignedInteger, UnsignedVariableInteger};
pub use serde::{ConstBitLength, Serde};
pub use wrapped::{best_signed_difference, make_relative, packet_bit_length, wrapped_bit_count};
