/// Largest datagram the protocol is tuned for
pub const MTU_SIZE_BYTES: usize = 1024;
pub const MTU_SIZE_BITS: u32 = (MTU_SIZE_BYTES * 8) as u32;
