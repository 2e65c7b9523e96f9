//! Occupancy bitmap helpers over a byte slice.
//!
//! Bit `i` lives in byte `i / 8` at position `i % 8` (least significant first).
//! Callers pass indices below `bitmap.len() * 8`.

pub fn is_set(bitmap: &[u8], index: usize) -> bool {
    bitmap[index / 8] & (1 << (index % 8)) != 0
}

pub fn set(bitmap: &mut [u8], index: usize) {
    bitmap[index / 8] |= 1 << (index % 8);
}

pub fn reset(bitmap: &mut [u8], index: usize) {
    bitmap[index / 8] &= !(1 << (index % 8));
}

/// Index of the first bit among the first `n` bits that equals `value`
pub fn first_bit(value: bool, bitmap: &[u8], n: usize) -> Option<usize> {
    for (byte_idx, &byte) in bitmap.iter().enumerate() {
        let start = byte_idx * 8;
        if start >= n {
            break;
        }

        // Skip whole bytes that cannot contain a match
        let candidates = if value { byte } else { !byte };
        if candidates == 0 {
            continue;
        }

        let index = start + candidates.trailing_zeros() as usize;
        return (index < n).then_some(index);
    }
    None
}

/// Number of set bits among the first `n` bits
pub fn count_ones(bitmap: &[u8], n: usize) -> usize {
    (0..n).filter(|&i| is_set(bitmap, i)).count()
}

/// Size in bytes of a bitmap holding `n` bits
pub fn bytes_for(n: usize) -> usize {
    n.div_ceil(8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_reset() {
        let mut bitmap = [0u8; 2];

        set(&mut bitmap, 0);
        set(&mut bitmap, 9);
        assert!(is_set(&bitmap, 0));
        assert!(is_set(&bitmap, 9));
        assert!(!is_set(&bitmap, 1));
        assert_eq!(bitmap, [0b0000_0001, 0b0000_0010]);

        reset(&mut bitmap, 0);
        assert!(!is_set(&bitmap, 0));
        assert_eq!(count_ones(&bitmap, 16), 1);
    }

    #[test]
    fn test_first_unset_bit() {
        let mut bitmap = [0u8; 2];
        assert_eq!(first_bit(false, &bitmap, 10), Some(0));

        for i in 0..9 {
            set(&mut bitmap, i);
        }
        assert_eq!(first_bit(false, &bitmap, 10), Some(9));

        set(&mut bitmap, 9);
        assert_eq!(first_bit(false, &bitmap, 10), None);

        // Bits past n are ignored even though they are unset
        reset(&mut bitmap, 3);
        assert_eq!(first_bit(false, &bitmap, 10), Some(3));
    }

    #[test]
    fn test_first_set_bit() {
        let mut bitmap = [0u8; 3];
        assert_eq!(first_bit(true, &bitmap, 20), None);

        set(&mut bitmap, 17);
        assert_eq!(first_bit(true, &bitmap, 20), Some(17));
        assert_eq!(first_bit(true, &bitmap, 17), None);
    }

    #[test]
    fn test_bytes_for() {
        assert_eq!(bytes_for(0), 0);
        assert_eq!(bytes_for(1), 1);
        assert_eq!(bytes_for(8), 1);
        assert_eq!(bytes_for(9), 2);
    }
}
