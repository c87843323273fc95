/// Number of bytes needed to bit-pack a boolean vector of `num_bits` elements.
#[inline(always)]
pub const fn packed_byte_len(num_bits: usize) -> usize {
    num_bits.div_ceil(8)
}

/// Packs booleans into bytes, least significant bit first. Unused high bits of the last byte are left zeroed.
///
/// # Arguments
///
/// * `bits` - The booleans to pack.
/// * `bytes` - Destination, must be exactly `packed_byte_len(bits.len())` bytes long.
#[inline]
pub fn pack_bits(bits: &[bool], bytes: &mut [u8]) {
    debug_assert_eq!(bytes.len(), packed_byte_len(bits.len()));

    bytes.fill(0);
    for (byte, chunk) in bytes.iter_mut().zip(bits.chunks(8)) {
        *byte = chunk.iter().enumerate().fold(0u8, |acc, (bit_idx, &bit)| acc | ((bit as u8) << bit_idx));
    }
}

/// Unpacks the first `num_bits` booleans from bytes packed least significant bit first. Trailing bits are ignored.
#[inline]
pub fn unpack_bits(bytes: &[u8], num_bits: usize) -> Vec<bool> {
    debug_assert!(bytes.len() * 8 >= num_bits);

    (0..num_bits).map(|bit_idx| (bytes[bit_idx / 8] >> (bit_idx % 8)) & 1 == 1).collect()
}

/// Checks that bits past `num_bits` in a packed byte string are all zero, so that every boolean vector has a single encoding.
#[inline]
pub fn padding_is_zero(bytes: &[u8], num_bits: usize) -> bool {
    let used_bits_in_last_byte = num_bits % 8;
    if used_bits_in_last_byte == 0 {
        return true;
    }

    match bytes.last() {
        Some(&last) => last >> used_bits_in_last_byte == 0,
        None => true,
    }
}
