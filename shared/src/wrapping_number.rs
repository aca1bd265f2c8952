use tether_serde::{make_relative, BitReader, BitWriter, SerdeErr};

use crate::{constants::MAX_PACKET_ID, types::PacketId};

/// Writes an absolute counter reduced modulo `modulus`
pub fn write_wrapped(writer: &mut BitWriter, value: i32, modulus: u32) {
    let reduced = i64::from(value).rem_euclid(i64::from(modulus)) as u32;
    writer.write_int_wrapped(reduced, modulus);
}

/// Reads a wrapped counter and rebuilds the absolute value closest to
/// `reference`
pub fn read_relative(
    reader: &mut BitReader,
    reference: i32,
    modulus: u32,
) -> Result<i32, SerdeErr> {
    let raw = reader.read_int_wrapped(modulus)?;
    Ok(make_relative(raw, reference, modulus))
}

pub fn write_packet_id(writer: &mut BitWriter, packet_id: PacketId) {
    write_wrapped(writer, packet_id, MAX_PACKET_ID);
}

pub fn read_packet_id(reader: &mut BitReader, reference: PacketId) -> Result<PacketId, SerdeErr> {
    read_relative(reader, reference, MAX_PACKET_ID)
}
