//! Free space accounting from the allocation bitmap.
//!
//! Each bitmap block holds 127 longs after its checksum. Bit `n` (LSB
//! first within each long) describes block `n + 2`; a set bit marks the
//! block as free. The two boot blocks are never mapped.

use tracing::debug;

use crate::checksum::{bitmap_sum, read_u32_be};
use crate::constants::*;
use crate::device::BlockDevice;
use crate::error::{AdfError, Result};
use crate::volume::Volume;

/// Blocks described by one bitmap block.
pub const BLOCKS_PER_BITMAP: u32 = (BM_MAP_SIZE * 32) as u32;

impl<D: BlockDevice> Volume<D> {
    /// Count free blocks.
    ///
    /// Returns `None` when the root marks the bitmap invalid, which happens
    /// after an unclean unmount on the Amiga; the count is then unknown
    /// rather than wrong.
    pub fn free_blocks(&self) -> Result<Option<u32>> {
        if !self.bitmap_valid() {
            debug!("bitmap flagged invalid");
            return Ok(None);
        }

        let mapped = self.total_blocks() - RESERVED_BLOCKS;
        let needed = mapped.div_ceil(BLOCKS_PER_BITMAP) as usize;
        let pages = self.bitmap_blocks();
        if pages.len() < needed {
            return Err(AdfError::CorruptVolume(format!(
                "{} bitmap blocks for {mapped} blocks, {needed} needed",
                pages.len()
            )));
        }

        let mut free = 0u32;
        for (page_index, &page) in pages.iter().take(needed).enumerate() {
            let buf = self.raw_block(page)?;
            let stored = read_u32_be(&buf, 0);
            let calculated = bitmap_sum(&buf);
            if stored != calculated {
                return Err(AdfError::corrupt_block(
                    page,
                    format!("bitmap checksum mismatch (stored {stored:#010x}, computed {calculated:#010x})"),
                ));
            }

            let first = page_index as u32 * BLOCKS_PER_BITMAP;
            let covered = (mapped - first).min(BLOCKS_PER_BITMAP);
            free += count_free(&buf, covered);
        }
        Ok(Some(free))
    }
}

/// Set bits among the first `covered` map bits of a bitmap block.
fn count_free(buf: &[u8; BLOCK_SIZE], covered: u32) -> u32 {
    let full_longs = (covered / 32) as usize;
    let mut free: u32 = (0..full_longs)
        .map(|i| read_u32_be(buf, 4 + i * 4).count_ones())
        .sum();
    let rest = covered % 32;
    if rest != 0 {
        let mask = (1u32 << rest) - 1;
        free += (read_u32_be(buf, 4 + full_longs * 4) & mask).count_ones();
    }
    free
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_free_masks_tail() {
        let mut buf = [0xFFu8; BLOCK_SIZE];
        buf[..4].fill(0);
        assert_eq!(count_free(&buf, 1758), 1758);
        assert_eq!(count_free(&buf, 33), 33);
        assert_eq!(count_free(&buf, BLOCKS_PER_BITMAP), BLOCKS_PER_BITMAP);
    }

    #[test]
    fn count_free_reads_lsb_first() {
        let mut buf = [0u8; BLOCK_SIZE];
        buf[4..8].copy_from_slice(&0b101u32.to_be_bytes());
        assert_eq!(count_free(&buf, 1), 1);
        assert_eq!(count_free(&buf, 2), 1);
        assert_eq!(count_free(&buf, 3), 2);
    }
}
