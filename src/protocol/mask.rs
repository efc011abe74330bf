//! Client-side frame masking (RFC 6455 Section 5.3).

/// XOR `data` in place with the repeating four-byte `mask`.
///
/// Processes four bytes at a time and finishes the tail byte by byte.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    let mask_u32 = u32::from_ne_bytes(mask);
    let mut chunks = data.chunks_exact_mut(4);
    for chunk in &mut chunks {
        let val = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) ^ mask_u32;
        chunk.copy_from_slice(&val.to_ne_bytes());
    }
    for (byte, key) in chunks.into_remainder().iter_mut().zip(mask) {
        *byte ^= key;
    }
}

/// Produces a fresh masking key for every outgoing frame.
///
/// Seeded from the OS random source; falls back to the clock when that is
/// unavailable.
#[derive(Debug, Clone)]
pub struct MaskGenerator {
    counter: u32,
}

impl Default for MaskGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MaskGenerator {
    /// Create a generator with a random seed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counter: random_seed(),
        }
    }

    /// Next masking key.
    pub fn next_mask(&mut self) -> [u8; 4] {
        self.counter = self.counter.wrapping_add(0x9E37_79B9);
        let a = self.counter;
        let b = a.wrapping_mul(0x85EB_CA6B);
        let c = b ^ (b >> 13);
        let d = c.wrapping_mul(0xC2B2_AE35);
        d.to_le_bytes()
    }
}

fn random_seed() -> u32 {
    let mut buf = [0u8; 4];
    if getrandom::getrandom(&mut buf).is_ok() {
        u32::from_le_bytes(buf)
    } else {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0x1234_5678)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masking_example_from_rfc() {
        // RFC 6455 Section 5.7: masked "Hello"
        let mut data = b"Hello".to_vec();
        apply_mask(&mut data, [0x37, 0xfa, 0x21, 0x3d]);
        assert_eq!(data, vec![0x7f, 0x9f, 0x4d, 0x51, 0x58]);
    }

    #[test]
    fn test_masking_reversible() {
        let original: Vec<u8> = (0..=255).collect();
        let mask = [0xde, 0xad, 0xbe, 0xef];
        let mut data = original.clone();
        apply_mask(&mut data, mask);
        assert_ne!(data, original);
        apply_mask(&mut data, mask);
        assert_eq!(data, original);
    }

    #[test]
    fn test_masking_empty_and_short() {
        let mut empty: Vec<u8> = vec![];
        apply_mask(&mut empty, [1, 2, 3, 4]);
        assert!(empty.is_empty());

        let mut short = vec![0x00, 0x00, 0x00];
        apply_mask(&mut short, [1, 2, 3, 4]);
        assert_eq!(short, vec![1, 2, 3]);
    }

    #[test]
    fn test_generator_varies() {
        let mut generator = MaskGenerator::new();
        let first = generator.next_mask();
        let second = generator.next_mask();
        assert_ne!(first, second);
    }
}
