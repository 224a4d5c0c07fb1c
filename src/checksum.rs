//! Block checksum algorithms and big-endian field readers.

use crate::constants::{BLOCK_SIZE, BOOT_BLOCK_SIZE};

#[cfg(feature = "simd")]
use bytemuck::try_cast_slice;
#[cfg(feature = "simd")]
use wide::u32x4;

/// Calculate the normal checksum for a block.
///
/// Used by root, header, extension and OFS data blocks. The stored value makes
/// the sum of all longwords in the block equal zero.
#[inline]
pub fn normal_sum(buf: &[u8; BLOCK_SIZE], checksum_offset: usize) -> u32 {
    normal_sum_slice(buf, checksum_offset)
}

/// Normal checksum over an arbitrary multiple-of-four buffer.
#[inline]
pub fn normal_sum_slice(buf: &[u8], checksum_offset: usize) -> u32 {
    debug_assert!(buf.len().is_multiple_of(4));
    debug_assert!(checksum_offset.is_multiple_of(4));

    #[cfg(feature = "simd")]
    {
        normal_sum_simd(buf, checksum_offset)
    }

    #[cfg(not(feature = "simd"))]
    {
        normal_sum_scalar(buf, checksum_offset)
    }
}

#[inline]
fn normal_sum_scalar(buf: &[u8], checksum_offset: usize) -> u32 {
    let checksum_word = checksum_offset / 4;
    let sum = buf
        .chunks_exact(4)
        .enumerate()
        .filter(|&(i, _)| i != checksum_word)
        .fold(0u32, |sum, (_, word)| {
            sum.wrapping_add(u32::from_be_bytes([word[0], word[1], word[2], word[3]]))
        });
    sum.wrapping_neg()
}

/// Uses bytemuck for the word view when the buffer is aligned, scalar
/// otherwise.
#[cfg(feature = "simd")]
#[inline]
fn normal_sum_simd(buf: &[u8], checksum_offset: usize) -> u32 {
    let Ok(words) = try_cast_slice::<u8, u32>(buf) else {
        return normal_sum_scalar(buf, checksum_offset);
    };
    let checksum_word = checksum_offset / 4;
    let word = |i: usize| {
        if i == checksum_word {
            0
        } else {
            u32::from_be(words[i])
        }
    };

    let mut lanes = u32x4::ZERO;
    let mut i = 0;
    while i + 4 <= words.len() {
        lanes += u32x4::new([word(i), word(i + 1), word(i + 2), word(i + 3)]);
        i += 4;
    }
    let mut sum = lanes
        .to_array()
        .iter()
        .fold(0u32, |acc, &lane| acc.wrapping_add(lane));
    while i < words.len() {
        sum = sum.wrapping_add(word(i));
        i += 1;
    }
    sum.wrapping_neg()
}

/// Calculate the boot block checksum.
///
/// Carry-wrapping sum over the 256 longwords of both boot sectors, skipping
/// the checksum slot at offset 4, inverted.
#[inline]
pub fn boot_sum(buf: &[u8; BOOT_BLOCK_SIZE]) -> u32 {
    let mut sum: u32 = 0;
    for (i, word) in buf.chunks_exact(4).enumerate() {
        if i == 1 {
            continue;
        }
        let d = u32::from_be_bytes([word[0], word[1], word[2], word[3]]);
        let (new_sum, carry) = sum.overflowing_add(d);
        sum = new_sum.wrapping_add(u32::from(carry));
    }
    !sum
}

/// Calculate a bitmap block checksum (stored at offset 0).
#[inline]
pub fn bitmap_sum(buf: &[u8; BLOCK_SIZE]) -> u32 {
    #[cfg(feature = "simd")]
    {
        bitmap_sum_simd(buf)
    }

    #[cfg(not(feature = "simd"))]
    {
        bitmap_sum_scalar(buf)
    }
}

#[inline]
fn bitmap_sum_scalar(buf: &[u8; BLOCK_SIZE]) -> u32 {
    buf[4..].chunks_exact(4).fold(0u32, |sum, word| {
        sum.wrapping_sub(u32::from_be_bytes([word[0], word[1], word[2], word[3]]))
    })
}

#[cfg(feature = "simd")]
#[inline]
fn bitmap_sum_simd(buf: &[u8; BLOCK_SIZE]) -> u32 {
    let Ok(words) = try_cast_slice::<u8, u32>(buf) else {
        return bitmap_sum_scalar(buf);
    };

    let mut lanes = u32x4::ZERO;
    for i in (1..125).step_by(4) {
        lanes -= u32x4::new([
            u32::from_be(words[i]),
            u32::from_be(words[i + 1]),
            u32::from_be(words[i + 2]),
            u32::from_be(words[i + 3]),
        ]);
    }
    let tail = words[125..128]
        .iter()
        .fold(0u32, |sum, &w| sum.wrapping_sub(u32::from_be(w)));
    lanes
        .to_array()
        .iter()
        .fold(tail, |acc, &lane| acc.wrapping_add(lane))
}

/// Rigid disk block checksum: `summed_longs` longwords starting at offset 0,
/// checksum slot at offset 8.
#[inline]
pub fn rdb_sum(buf: &[u8; BLOCK_SIZE], summed_longs: usize) -> u32 {
    let len = (summed_longs * 4).min(BLOCK_SIZE);
    normal_sum_slice(&buf[..len], 8)
}

/// Read a big-endian u32 from a slice.
#[inline]
pub const fn read_u32_be(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

/// Read a big-endian i32 from a slice.
#[inline]
pub const fn read_i32_be(buf: &[u8], offset: usize) -> i32 {
    read_u32_be(buf, offset) as i32
}
