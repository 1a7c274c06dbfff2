//! WebSocket frame masking utilities
//!
//! Re-exports the kernels from the simd module and adds mask key generation.

pub use crate::simd::{apply_mask, apply_mask_scalar, apply_mask_words};

/// Generate a mask key for an outbound frame.
///
/// Uses `fastrand`, a fast non-cryptographic PRNG. Masking exists so that
/// naive intermediaries cannot be fed attacker-chosen bytes; it is not a
/// confidentiality measure.
#[inline]
pub fn generate_mask() -> [u8; 4] {
    fastrand::u32(..).to_ne_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_generate_mask_varies() {
        let masks: Vec<[u8; 4]> = (0..16).map(|_| generate_mask()).collect();
        assert!(masks.iter().any(|m| *m != masks[0]));
    }

    proptest! {
        #[test]
        fn mask_is_involutive(
            data in proptest::collection::vec(any::<u8>(), 0..1024),
            mask in any::<[u8; 4]>(),
        ) {
            let mut masked = data.clone();
            apply_mask(&mut masked, mask);
            apply_mask(&mut masked, mask);
            prop_assert_eq!(masked, data);
        }

        #[test]
        fn mask_matches_reference_at_any_offset(
            data in proptest::collection::vec(any::<u8>(), 0..300),
            mask in any::<[u8; 4]>(),
            offset in 0usize..8,
        ) {
            let offset = offset.min(data.len());

            let mut fast = data.clone();
            apply_mask(&mut fast[offset..], mask);

            let mut reference = data.clone();
            apply_mask_scalar(&mut reference[offset..], mask);

            prop_assert_eq!(fast, reference);
        }
    }
}
