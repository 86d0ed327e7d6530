//! Little-endian decoding of fixed-width numbers from byte slices.
//! Callers check slice lengths first; a short slice yields zero-padded input instead of a panic.

/// Copies up to `N` leading bytes into a zero-padded array.
#[inline]
fn take<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut array = [0u8; N];
    let size = bytes.len().min(N);
    array[..size].copy_from_slice(&bytes[..size]);
    array
}

/// Decodes a byte slice as a sequence of 32-bit little-endian integers widened to usize.
/// Trailing bytes that do not form a full integer are ignored.
pub(crate) fn to_usize_iter(bytes: &[u8]) -> impl Iterator<Item = usize> + '_ {
    bytes.chunks_exact(4).map(|chunk| u32::from_le_bytes(take(chunk)) as usize)
}

#[inline]
pub(crate) fn to_f64(bytes: &[u8]) -> f64 {
    f64::from_le_bytes(take(bytes))
}

#[inline]
pub(crate) fn to_u64(bytes: &[u8]) -> u64 {
    u64::from_le_bytes(take(bytes))
}

#[inline]
pub(crate) fn to_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes(take(bytes))
}

#[inline]
pub(crate) fn to_u16(bytes: &[u8]) -> u16 {
    u16::from_le_bytes(take(bytes))
}

#[inline]
pub(crate) fn to_usize(bytes: &[u8]) -> usize {
    to_u32(bytes) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_little_endian() {
        assert_eq!(to_u16(&[0x34, 0x12]), 0x1234);
        assert_eq!(to_u32(&[0x78, 0x56, 0x34, 0x12]), 0x1234_5678);
        assert_eq!(to_usize(&[0x01, 0x00, 0x00, 0x00, 0xFF]), 1);
        assert_eq!(to_f64(&1.5f64.to_le_bytes()), 1.5);
    }

    #[test]
    fn short_slice_is_zero_padded() {
        assert_eq!(to_u32(&[0x01]), 1);
        assert_eq!(to_u64(&[]), 0);
    }

    #[test]
    fn usize_iter_drops_partial_chunk() {
        let values: Vec<usize> = to_usize_iter(&[1, 0, 0, 0, 2, 0, 0, 0, 3]).collect();
        assert_eq!(values, vec![1, 2]);
    }
}
