//! Accelerated XOR masking kernels
//!
//! The dispatcher picks the widest kernel the CPU offers:
//! - AVX2 (256-bit, 32 bytes per iteration, runtime detected)
//! - SSE2 (128-bit, 16 bytes per iteration, baseline on x86_64)
//! - NEON (128-bit on ARM64)
//! - Word-at-a-time scalar fallback
//!
//! Every kernel produces exactly the output of [`apply_mask_scalar`].

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

#[cfg(target_arch = "aarch64")]
use std::arch::aarch64::*;

/// Apply a WebSocket mask using the fastest available instructions
///
/// XORs `data` in place with the repeating 4-byte `mask`, starting at key
/// phase 0. Masking and unmasking are the same operation.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    if data.is_empty() {
        return;
    }

    #[cfg(target_arch = "x86_64")]
    {
        if data.len() >= 32 && is_x86_feature_detected!("avx2") {
            // SAFETY: AVX2 support was just detected
            unsafe { apply_mask_avx2(data, mask) };
            return;
        }
        if data.len() >= 16 {
            // SAFETY: SSE2 is part of the x86_64 baseline
            unsafe { apply_mask_sse2(data, mask) };
            return;
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        if data.len() >= 16 {
            // SAFETY: NEON is part of the aarch64 baseline
            unsafe { apply_mask_neon(data, mask) };
            return;
        }
    }

    apply_mask_words(data, mask);
}

/// Byte-at-a-time reference implementation
#[inline]
pub fn apply_mask_scalar(data: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i & 3];
    }
}

/// Word-at-a-time implementation
///
/// Bytes before the first 8-byte aligned address are masked one by one. The
/// word mask is then rotated by the length of that prefix so the key phase
/// carries over into the aligned middle and the tail.
#[inline]
pub fn apply_mask_words(data: &mut [u8], mask: [u8; 4]) {
    let mask_u32 = u32::from_ne_bytes(mask);
    let mask_u64 = ((mask_u32 as u64) << 32) | (mask_u32 as u64);

    // SAFETY: every bit pattern is a valid u64
    let (prefix, words, suffix) = unsafe { data.align_to_mut::<u64>() };
    apply_mask_scalar(prefix, mask);

    let head = (prefix.len() & 3) as u32;
    let mask_u64 = if head == 0 {
        mask_u64
    } else if cfg!(target_endian = "big") {
        mask_u64.rotate_left(8 * head)
    } else {
        mask_u64.rotate_right(8 * head)
    };

    for word in words.iter_mut() {
        *word ^= mask_u64;
    }

    let bytes = mask_u64.to_ne_bytes();
    apply_mask_scalar(suffix, [bytes[0], bytes[1], bytes[2], bytes[3]]);
}

/// AVX2 implementation (32 bytes per iteration)
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn apply_mask_avx2(data: &mut [u8], mask: [u8; 4]) {
    unsafe {
        let len = data.len();
        let mut ptr = data.as_mut_ptr();

        // Broadcast the 4-byte mask; 32 is a multiple of 4 so the phase never shifts
        let mask_u32 = u32::from_ne_bytes(mask);
        let mask_vec = _mm256_set1_epi32(mask_u32 as i32);

        let mut remaining = len;

        while remaining >= 32 {
            let data_vec = _mm256_loadu_si256(ptr as *const __m256i);
            let result = _mm256_xor_si256(data_vec, mask_vec);
            _mm256_storeu_si256(ptr as *mut __m256i, result);
            ptr = ptr.add(32);
            remaining -= 32;
        }

        if remaining >= 16 {
            let mask_vec_128 = _mm_set1_epi32(mask_u32 as i32);
            let data_vec = _mm_loadu_si128(ptr as *const __m128i);
            let result = _mm_xor_si128(data_vec, mask_vec_128);
            _mm_storeu_si128(ptr as *mut __m128i, result);
            ptr = ptr.add(16);
            remaining -= 16;
        }

        if remaining > 0 {
            let tail = std::slice::from_raw_parts_mut(ptr, remaining);
            apply_mask_words(tail, mask);
        }
    }
}

/// SSE2 implementation (16 bytes per iteration)
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "sse2")]
unsafe fn apply_mask_sse2(data: &mut [u8], mask: [u8; 4]) {
    unsafe {
        let len = data.len();
        let mut ptr = data.as_mut_ptr();

        let mask_u32 = u32::from_ne_bytes(mask);
        let mask_vec = _mm_set1_epi32(mask_u32 as i32);

        let mut remaining = len;

        while remaining >= 16 {
            let data_vec = _mm_loadu_si128(ptr as *const __m128i);
            let result = _mm_xor_si128(data_vec, mask_vec);
            _mm_storeu_si128(ptr as *mut __m128i, result);
            ptr = ptr.add(16);
            remaining -= 16;
        }

        if remaining > 0 {
            let tail = std::slice::from_raw_parts_mut(ptr, remaining);
            apply_mask_words(tail, mask);
        }
    }
}

/// NEON implementation for ARM64 (16 bytes per iteration)
#[cfg(target_arch = "aarch64")]
unsafe fn apply_mask_neon(data: &mut [u8], mask: [u8; 4]) {
    unsafe {
        let len = data.len();
        let mut ptr = data.as_mut_ptr();

        let mask_bytes: [u8; 16] = [
            mask[0], mask[1], mask[2], mask[3], mask[0], mask[1], mask[2], mask[3], mask[0],
            mask[1], mask[2], mask[3], mask[0], mask[1], mask[2], mask[3],
        ];
        let mask_vec = vld1q_u8(mask_bytes.as_ptr());

        let mut remaining = len;

        while remaining >= 16 {
            let data_vec = vld1q_u8(ptr);
            let result = veorq_u8(data_vec, mask_vec);
            vst1q_u8(ptr, result);
            ptr = ptr.add(16);
            remaining -= 16;
        }

        if remaining > 0 {
            let tail = std::slice::from_raw_parts_mut(ptr, remaining);
            apply_mask_words(tail, mask);
        }
    }
}
