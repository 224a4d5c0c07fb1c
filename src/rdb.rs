//! Rigid Disk Block discovery for hard disk images.
//!
//! An HDF image either starts directly with a boot block or carries an RDB
//! in one of its first 16 blocks describing partitions. Only the first
//! partition is mounted.

use tracing::debug;

use crate::checksum::{read_u32_be, rdb_sum};
use crate::constants::*;
use crate::device::{BlockDevice, PartitionDevice};
use crate::error::{AdfError, Result};
use crate::name::latin1_to_string;

const RDSK_ID: &[u8; 4] = b"RDSK";
const PART_ID: &[u8; 4] = b"PART";

/// Block list terminator.
const END_OF_LIST: u32 = 0xFFFF_FFFF;

/// A partition found in the RDB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Drive name (e.g. `DH0`).
    pub name: String,
    /// First block on the disk.
    pub start_block: u32,
    /// Number of blocks.
    pub block_count: u32,
    /// DOS type from the environment vector, e.g. `DOS\x01`.
    pub dos_type: [u8; 4],
}

impl Partition {
    /// Wrap `device` so that block 0 is the first block of this partition.
    pub fn open<D: BlockDevice>(&self, device: D) -> Result<PartitionDevice<D>> {
        PartitionDevice::new(device, self.start_block, self.block_count)
    }
}

/// Validate the RDB checksum: `SummedLongs` longs at offset 4, checksum at 8.
fn check_rdb_block(buf: &[u8; BLOCK_SIZE], index: u32) -> Result<()> {
    let summed = read_u32_be(buf, 4) as usize;
    if summed == 0 || summed > BLOCK_SIZE / 4 {
        return Err(AdfError::corrupt_block(index, format!("summed longs {summed}")));
    }
    let stored = read_u32_be(buf, 8);
    if stored != rdb_sum(buf, summed) {
        return Err(AdfError::corrupt_block(index, "RDB checksum mismatch"));
    }
    Ok(())
}

/// Find the first partition of an RDB-partitioned device.
///
/// Returns `Ok(None)` when no RDB is present, so callers can fall back to
/// treating the whole device as one volume.
pub fn find_first_partition<D: BlockDevice>(device: &D) -> Result<Option<Partition>> {
    let limit = RDB_LOCATION_LIMIT.min(device.block_count());
    let mut rdb = None;
    for index in 0..limit {
        let buf = device.block(index)?;
        if &buf[0..4] != RDSK_ID {
            continue;
        }
        match check_rdb_block(&buf, index) {
            Ok(()) => {
                rdb = Some((index, buf));
                break;
            }
            Err(err) => debug!(block = index, error = %err, "skipping RDSK candidate"),
        }
    }
    let Some((rdb_block, rdb)) = rdb else {
        return Ok(None);
    };

    let block_bytes = read_u32_be(&rdb, 16);
    if block_bytes as usize != BLOCK_SIZE {
        return Err(AdfError::UnsupportedFilesystem(format!(
            "RDB block size {block_bytes}"
        )));
    }

    let part_block = read_u32_be(&rdb, 28);
    debug!(rdb = rdb_block, part = part_block, "found rigid disk block");
    if part_block == END_OF_LIST || part_block == 0 {
        return Err(AdfError::CorruptVolume("RDB lists no partitions".to_owned()));
    }

    let part = device.block(part_block)?;
    if &part[0..4] != PART_ID {
        return Err(AdfError::corrupt_block(part_block, "missing PART signature"));
    }
    check_rdb_block(&part, part_block)?;
    let partition = parse_partition(&part, part_block)?;

    debug!(
        name = %partition.name,
        start = partition.start_block,
        blocks = partition.block_count,
        "first partition"
    );
    Ok(Some(partition))
}

fn parse_partition(buf: &[u8; BLOCK_SIZE], index: u32) -> Result<Partition> {
    const ENVEC: usize = 128;
    let envec = |slot: usize| read_u32_be(buf, ENVEC + slot * 4);

    let size_bytes = u64::from(envec(1)) * 4;
    if size_bytes != BLOCK_SIZE as u64 {
        return Err(AdfError::UnsupportedFilesystem(format!(
            "partition block size {size_bytes}"
        )));
    }
    let surfaces = envec(3);
    let blocks_per_track = envec(5);
    let low_cyl = envec(9);
    let high_cyl = envec(10);
    if high_cyl < low_cyl {
        return Err(AdfError::corrupt_block(
            index,
            format!("cylinders {low_cyl}..{high_cyl}"),
        ));
    }

    let per_cylinder = u64::from(surfaces) * u64::from(blocks_per_track);
    let cylinders = u64::from(high_cyl) - u64::from(low_cyl) + 1;
    let to_blocks = |n: u64| n.checked_mul(per_cylinder).and_then(|b| u32::try_from(b).ok());
    let (Some(start_block), Some(block_count)) = (to_blocks(low_cyl.into()), to_blocks(cylinders))
    else {
        return Err(AdfError::UnsupportedFilesystem(
            "partition beyond 2^32 blocks".to_owned(),
        ));
    };

    let name_len = usize::from(buf[36]).min(31);
    let dos_type = envec(16).to_be_bytes();

    Ok(Partition {
        name: latin1_to_string(&buf[37..37 + name_len]),
        start_block,
        block_count,
        dos_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDevice;

    fn put(buf: &mut [u8], offset: usize, val: u32) {
        buf[offset..offset + 4].copy_from_slice(&val.to_be_bytes());
    }

    fn seal(buf: &mut [u8]) {
        let block: &mut [u8; BLOCK_SIZE] = buf.try_into().unwrap();
        let summed = read_u32_be(block, 4) as usize;
        let sum = rdb_sum(block, summed);
        put(block, 8, sum);
    }

    fn rdb_image() -> MemoryDevice {
        let mut dev = MemoryDevice::zeroed(64);
        {
            let rdsk = dev.block_mut(0);
            rdsk[0..4].copy_from_slice(RDSK_ID);
            put(rdsk, 4, 64);
            put(rdsk, 16, 512);
            put(rdsk, 28, 1);
            seal(rdsk);
        }
        {
            let part = dev.block_mut(1);
            part[0..4].copy_from_slice(PART_ID);
            put(part, 4, 64);
            put(part, 16, END_OF_LIST);
            part[36] = 3;
            part[37..40].copy_from_slice(b"DH0");
            put(part, 128 + 4, 128);
            put(part, 128 + 12, 2);
            put(part, 128 + 20, 4);
            put(part, 128 + 36, 2);
            put(part, 128 + 40, 5);
            put(part, 128 + 64, u32::from_be_bytes(*b"DOS\x01"));
            seal(part);
        }
        dev
    }

    #[test]
    fn finds_first_partition() {
        let dev = rdb_image();
        let part = find_first_partition(&dev).unwrap().unwrap();
        assert_eq!(part.name, "DH0");
        assert_eq!(part.start_block, 16);
        assert_eq!(part.block_count, 32);
        assert_eq!(&part.dos_type, b"DOS\x01");
        let window = part.open(&dev).unwrap();
        assert_eq!(window.block_count(), 32);
    }

    #[test]
    fn no_rdb_is_none() {
        let dev = MemoryDevice::zeroed(20);
        assert!(find_first_partition(&dev).unwrap().is_none());
    }

    #[test]
    fn bad_checksum_is_ignored() {
        let mut dev = rdb_image();
        dev.block_mut(0)[100] ^= 0xFF;
        assert!(find_first_partition(&dev).unwrap().is_none());
    }

    #[test]
    fn malformed_partition_block_size() {
        let mut dev = rdb_image();
        {
            let part = dev.block_mut(1);
            put(part, 128 + 4, 0x4000_0001);
            seal(part);
        }
        assert!(matches!(
            find_first_partition(&dev),
            Err(AdfError::UnsupportedFilesystem(_))
        ));
    }

    #[test]
    fn cylinder_range_spanning_u32() {
        let mut dev = rdb_image();
        {
            let part = dev.block_mut(1);
            put(part, 128 + 12, u32::MAX);
            put(part, 128 + 20, u32::MAX);
            put(part, 128 + 36, 0);
            put(part, 128 + 40, u32::MAX);
            seal(part);
        }
        assert!(matches!(
            find_first_partition(&dev),
            Err(AdfError::UnsupportedFilesystem(_))
        ));
    }

    #[test]
    fn large_blocks_are_unsupported() {
        let mut dev = rdb_image();
        {
            let rdsk = dev.block_mut(0);
            put(rdsk, 16, 1024);
            seal(rdsk);
        }
        assert!(matches!(
            find_first_partition(&dev),
            Err(AdfError::UnsupportedFilesystem(_))
        ));
    }
}
