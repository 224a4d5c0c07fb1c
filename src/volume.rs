//! Volume reader: boot block, variant and root block discovery.

use tracing::{debug, info, warn};

use crate::block::{decode, Block, BlockKind, BootBlock, RootBlock};
use crate::checksum::read_u32_be;
use crate::constants::*;
use crate::date::AmigaDate;
use crate::device::BlockDevice;
use crate::dir::DirEntry;
use crate::error::{AdfError, Result};
use crate::name::latin1_to_string;
use crate::types::{Access, DosType, EntryType, FsType};

/// A mounted, immutable Amiga volume.
///
/// Owns its block device. Every other layer borrows the volume, and all
/// methods take `&self`, so a volume over a `Sync` device can serve reads
/// from many threads at once.
///
/// # Example
///
/// ```no_run
/// use adf_fs::{ImageFile, Volume};
///
/// let volume = Volume::open(ImageFile::open("workbench.adf")?)?;
/// println!("{} on {}", volume.name_string(), volume.dos_type());
/// for entry in volume.list_entries(volume.root_block())? {
///     println!("{}", entry.name_string());
/// }
/// # Ok::<(), adf_fs::AdfError>(())
/// ```
#[derive(Debug)]
pub struct Volume<D> {
    device: D,
    boot: BootBlock,
    root: RootBlock,
    root_block: u32,
    bitmap_blocks: Vec<u32>,
}

impl<D: BlockDevice> Volume<D> {
    /// Mount the volume on `device`.
    pub fn open(device: D) -> Result<Self> {
        let total = device.block_count();
        if total <= RESERVED_BLOCKS {
            return Err(AdfError::UnsupportedFilesystem(format!(
                "device of {total} blocks cannot hold a volume"
            )));
        }

        let mut boot_buf = [0u8; BOOT_BLOCK_SIZE];
        boot_buf[..BLOCK_SIZE].copy_from_slice(&device.block(0)?);
        boot_buf[BLOCK_SIZE..].copy_from_slice(&device.block(1)?);
        let boot = BootBlock::parse(&boot_buf)?;

        let (root_block, root) = Self::locate_root(&device, &boot, total)?;
        let bitmap_blocks = Self::collect_bitmap_blocks(&device, &root, total)?;

        info!(
            variant = %boot.variant,
            name = %latin1_to_string(root.name()),
            root = root_block,
            blocks = total,
            "mounted Amiga volume"
        );

        Ok(Self {
            device,
            boot,
            root,
            root_block,
            bitmap_blocks,
        })
    }

    /// The root sits in the middle of the volume; the boot block pointer is a
    /// fallback for images formatted with a non-standard layout.
    fn locate_root(device: &D, boot: &BootBlock, total: u32) -> Result<(u32, RootBlock)> {
        let computed = ((u64::from(total) - 1 + u64::from(RESERVED_BLOCKS)) / 2) as u32;
        let first_err = match Self::read_root(device, computed) {
            Ok(root) => return Ok((computed, root)),
            Err(err) => err,
        };

        let hinted = boot.root_block;
        if hinted != computed && hinted >= RESERVED_BLOCKS && hinted < total {
            debug!(computed, hinted, "root not at computed block, trying boot pointer");
            if let Ok(root) = Self::read_root(device, hinted) {
                return Ok((hinted, root));
            }
        }

        Err(match first_err {
            AdfError::CorruptBlock { block, reason } => {
                AdfError::CorruptVolume(format!("root block {block}: {reason}"))
            }
            other => other,
        })
    }

    fn read_root(device: &D, index: u32) -> Result<RootBlock> {
        let buf = device.block(index)?;
        RootBlock::parse(&buf, index)
    }

    fn collect_bitmap_blocks(device: &D, root: &RootBlock, total: u32) -> Result<Vec<u32>> {
        let in_range = |block: u32| {
            if block >= total {
                Err(AdfError::CorruptVolume(format!(
                    "bitmap pointer {block} beyond {total} blocks"
                )))
            } else {
                Ok(block)
            }
        };

        let mut blocks = root
            .bm_pages
            .iter()
            .copied()
            .filter(|&b| b != 0)
            .map(in_range)
            .collect::<Result<Vec<_>>>()?;

        let mut ext = root.bm_ext;
        let mut hops = 0u32;
        while ext != 0 {
            in_range(ext)?;
            hops += 1;
            if hops > total {
                return Err(AdfError::CorruptVolume(
                    "bitmap extension chain loops".to_owned(),
                ));
            }
            let buf = device.block(ext)?;
            for i in 0..BM_PAGES_EXT_SIZE {
                let page = read_u32_be(&buf, i * 4);
                if page != 0 {
                    blocks.push(in_range(page)?);
                }
            }
            ext = read_u32_be(&buf, BM_PAGES_EXT_SIZE * 4);
        }
        Ok(blocks)
    }

    /// Read and decode block `index` as `kind`.
    pub fn block(&self, index: u32, kind: BlockKind) -> Result<Block> {
        let buf = self.device.block(index)?;
        decode(&buf, index, kind).inspect_err(|err| {
            if err.is_corruption() {
                warn!(block = index, ?kind, error = %err, "corrupt block");
            }
        })
    }

    /// Read raw block bytes.
    pub fn raw_block(&self, index: u32) -> Result<[u8; BLOCK_SIZE]> {
        self.device.block(index)
    }

    /// Variant flags from the boot block.
    #[inline]
    pub const fn dos_type(&self) -> DosType {
        self.boot.variant
    }

    /// Get the filesystem type (OFS or FFS).
    #[inline]
    pub const fn fs_type(&self) -> FsType {
        self.boot.variant.fs_type
    }

    /// Whether names use the international case folding.
    #[inline]
    pub const fn is_intl(&self) -> bool {
        self.boot.variant.is_intl()
    }

    /// Get the root block number.
    #[inline]
    pub const fn root_block(&self) -> u32 {
        self.root_block
    }

    /// Get the total number of blocks.
    #[inline]
    pub fn total_blocks(&self) -> u32 {
        self.device.block_count()
    }

    /// Volume name as stored (Latin-1).
    #[inline]
    pub fn name(&self) -> &[u8] {
        self.root.name()
    }

    /// Volume name decoded from Latin-1.
    pub fn name_string(&self) -> String {
        latin1_to_string(self.root.name())
    }

    /// Filesystem creation date.
    #[inline]
    pub const fn created(&self) -> AmigaDate {
        self.root.created
    }

    /// Last modification anywhere on the volume.
    #[inline]
    pub const fn modified(&self) -> AmigaDate {
        self.root.volume_modified
    }

    /// Check if the bitmap is flagged valid.
    #[inline]
    pub const fn bitmap_valid(&self) -> bool {
        self.root.bitmap_valid()
    }

    /// Bitmap block indices, in bitmap order.
    #[inline]
    pub fn bitmap_blocks(&self) -> &[u32] {
        &self.bitmap_blocks
    }

    /// Get the root directory hash table.
    #[inline]
    pub fn root_hash_table(&self) -> &[u32; HASH_TABLE_SIZE] {
        &self.root.hash_table
    }

    /// Get a reference to the block device.
    #[inline]
    pub const fn device(&self) -> &D {
        &self.device
    }

    /// Release the volume and hand back its device.
    pub fn into_device(self) -> D {
        self.device
    }

    /// A [`DirEntry`] describing the root directory.
    pub fn root_entry(&self) -> DirEntry {
        DirEntry {
            name: self.root.disk_name,
            name_len: self.root.name_len,
            entry_type: EntryType::Root,
            block: self.root_block,
            parent: 0,
            size: 0,
            access: Access::new(0),
            date: self.root.root_modified,
            real_entry: 0,
            comment: [0u8; MAX_COMMENT_LEN],
            comment_len: 0,
        }
    }
}
