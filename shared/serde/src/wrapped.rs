/// Number of bits needed to hold any value in `[0, modulus)`
pub fn wrapped_bit_count(modulus: u32) -> u32 {
    if modulus <= 1 {
        return 0;
    }
    u32::BITS - (modulus - 1).leading_zeros()
}

/// The signed distance from `reference` to `value`, taking the shortest way
/// around a ring of size `modulus`. The result lies in `[-modulus/2, modulus/2)`.
pub fn best_signed_difference(value: i64, reference: i64, modulus: u32) -> i64 {
    let modulus = i64::from(modulus);
    let diff = (value - reference).rem_euclid(modulus);
    if diff * 2 >= modulus {
        diff - modulus
    } else {
        diff
    }
}

/// Reconstructs the absolute value of a wrapped `raw` value, choosing the
/// representative nearest to the last known absolute value.
///
/// ```
/// # use tether_serde::make_relative;
/// assert_eq!(make_relative(2, 15, 16), 18);
/// assert_eq!(make_relative(14, 17, 16), 14);
/// assert_eq!(make_relative(5, 5, 16), 5);
/// ```
pub fn make_relative(raw: u32, reference: i32, modulus: u32) -> i32 {
    let difference = best_signed_difference(i64::from(raw), i64::from(reference), modulus);
    (i64::from(reference) + difference) as i32
}

/// Finds the logical bit length of a terminated packet by scanning back
/// from the last byte to its highest set bit, which is the terminator.
/// Returns `None` for an empty packet, or when the last byte holds no
/// terminator at all.
pub fn packet_bit_length(bytes: &[u8]) -> Option<usize> {
    let last_byte = *bytes.last()?;
    if last_byte == 0 {
        return None;
    }
    let terminator_index = 7 - last_byte.leading_zeros() as usize;
    Some((bytes.len() - 1) * 8 + terminator_index)
}
