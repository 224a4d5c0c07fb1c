//! Block decoding.
//!
//! Raw 512-byte blocks become one [`Block`] variant, checked for primary
//! type, secondary type and checksum. A block that fails any check is
//! reported as [`AdfError::CorruptBlock`]; no field of an unverified block is
//! ever handed to a caller.

use crate::checksum::{boot_sum, normal_sum, read_i32_be, read_u32_be};
use crate::constants::*;
use crate::date::AmigaDate;
use crate::error::{AdfError, Result};
use crate::symlink::symlink_target;
use crate::types::{DosType, EntryType, FsType};

/// Parsed boot block.
#[derive(Debug, Clone)]
pub struct BootBlock {
    /// DOS type bytes ("DOS\x00" - "DOS\x05").
    pub dos_type: [u8; 4],
    /// Decoded variant.
    pub variant: DosType,
    /// Stored checksum.
    pub checksum: u32,
    /// Root block pointer as written by the formatter (often 880).
    pub root_block: u32,
}

impl BootBlock {
    /// Parse the two boot sectors.
    ///
    /// The checksum only matters for bootable disks; it is verified whenever
    /// it is nonzero or boot code is present.
    pub fn parse(buf: &[u8; BOOT_BLOCK_SIZE]) -> Result<Self> {
        let dos_type = [buf[0], buf[1], buf[2], buf[3]];
        if &dos_type[0..3] != b"DOS" {
            return Err(AdfError::UnsupportedFilesystem(format!(
                "boot signature {:?}",
                String::from_utf8_lossy(&dos_type[0..3])
            )));
        }
        let variant = DosType::from_flags(dos_type[3]).ok_or_else(|| {
            AdfError::UnsupportedFilesystem(format!("DOS\\{} variant", dos_type[3]))
        })?;

        let checksum = read_u32_be(buf, 4);
        let root_block = read_u32_be(buf, 8);

        let has_code = buf[12..].iter().any(|&b| b != 0);
        if (checksum != 0 || has_code) && checksum != boot_sum(buf) {
            return Err(AdfError::CorruptVolume(
                "boot block checksum mismatch".to_owned(),
            ));
        }

        Ok(Self {
            dos_type,
            variant,
            checksum,
            root_block,
        })
    }

    /// Get filesystem type (OFS or FFS).
    #[inline]
    pub const fn fs_type(&self) -> FsType {
        self.variant.fs_type
    }
}

fn check_checksum(buf: &[u8; BLOCK_SIZE], index: u32) -> Result<u32> {
    let stored = read_u32_be(buf, 20);
    let calculated = normal_sum(buf, 20);
    if stored != calculated {
        return Err(AdfError::corrupt_block(
            index,
            format!("checksum mismatch (stored {stored:#010x}, computed {calculated:#010x})"),
        ));
    }
    Ok(stored)
}

fn check_type(buf: &[u8; BLOCK_SIZE], index: u32, expected: i32) -> Result<i32> {
    let block_type = read_i32_be(buf, 0);
    if block_type != expected {
        return Err(AdfError::corrupt_block(
            index,
            format!("block type {block_type}, expected {expected}"),
        ));
    }
    Ok(block_type)
}

fn read_table(buf: &[u8; BLOCK_SIZE]) -> [u32; HASH_TABLE_SIZE] {
    let mut table = [0u32; HASH_TABLE_SIZE];
    for (i, slot) in table.iter_mut().enumerate() {
        *slot = read_u32_be(buf, 24 + i * 4);
    }
    table
}

fn read_date(buf: &[u8; BLOCK_SIZE], offset: usize) -> AmigaDate {
    AmigaDate::new(
        read_i32_be(buf, offset),
        read_i32_be(buf, offset + 4),
        read_i32_be(buf, offset + 8),
    )
}

fn read_bstr<const N: usize>(buf: &[u8; BLOCK_SIZE], offset: usize) -> ([u8; N], u8) {
    let len = buf[offset].min(N as u8);
    let mut out = [0u8; N];
    out[..len as usize].copy_from_slice(&buf[offset + 1..offset + 1 + len as usize]);
    (out, len)
}

fn read_high_seq(buf: &[u8; BLOCK_SIZE], index: u32) -> Result<u32> {
    let high_seq = read_i32_be(buf, 8);
    u32::try_from(high_seq)
        .ok()
        .filter(|&n| n as usize <= MAX_DATABLK)
        .ok_or_else(|| AdfError::corrupt_block(index, format!("block count {high_seq}")))
}

/// Parsed root block.
#[derive(Debug, Clone)]
pub struct RootBlock {
    /// Hash table entries.
    pub hash_table: [u32; HASH_TABLE_SIZE],
    /// Bitmap valid flag (-1 = valid).
    pub bm_flag: i32,
    /// Bitmap block pointers.
    pub bm_pages: [u32; BM_PAGES_ROOT_SIZE],
    /// First bitmap extension block.
    pub bm_ext: u32,
    /// Last change to the root directory.
    pub root_modified: AmigaDate,
    /// Disk name length.
    pub name_len: u8,
    /// Disk name (up to 30 chars).
    pub disk_name: [u8; MAX_NAME_LEN],
    /// Last change anywhere on the volume.
    pub volume_modified: AmigaDate,
    /// Filesystem creation date.
    pub created: AmigaDate,
    /// Directory cache extension (DIRCACHE only).
    pub extension: u32,
}

impl RootBlock {
    /// Parse root block from raw data.
    pub fn parse(buf: &[u8; BLOCK_SIZE], index: u32) -> Result<Self> {
        check_type(buf, index, T_HEADER)?;
        let sec_type = read_i32_be(buf, 508);
        if sec_type != ST_ROOT {
            return Err(AdfError::corrupt_block(
                index,
                format!("secondary type {sec_type}, expected root"),
            ));
        }
        check_checksum(buf, index)?;

        let hash_table_size = read_i32_be(buf, 12);
        if hash_table_size != HASH_TABLE_SIZE as i32 {
            return Err(AdfError::corrupt_block(
                index,
                format!("hash table size {hash_table_size}"),
            ));
        }

        let mut bm_pages = [0u32; BM_PAGES_ROOT_SIZE];
        for (i, page) in bm_pages.iter_mut().enumerate() {
            *page = read_u32_be(buf, 0x13C + i * 4);
        }
        let (disk_name, name_len) = read_bstr::<MAX_NAME_LEN>(buf, 0x1B0);

        Ok(Self {
            hash_table: read_table(buf),
            bm_flag: read_i32_be(buf, 0x138),
            bm_pages,
            bm_ext: read_u32_be(buf, 0x1A0),
            root_modified: read_date(buf, 0x1A4),
            name_len,
            disk_name,
            volume_modified: read_date(buf, 0x1D8),
            created: read_date(buf, 0x1E4),
            extension: read_u32_be(buf, 0x1F8),
        })
    }

    /// Get disk name as bytes.
    #[inline]
    pub fn name(&self) -> &[u8] {
        &self.disk_name[..self.name_len as usize]
    }

    /// Check if bitmap is valid.
    #[inline]
    pub const fn bitmap_valid(&self) -> bool {
        self.bm_flag == BM_VALID
    }
}

/// Parsed header block of a directory, file or link.
#[derive(Debug, Clone)]
pub struct EntryBlock {
    /// Block index this header was read from.
    pub index: u32,
    /// Entry type from the secondary type field.
    pub entry_type: EntryType,
    /// Number of data block pointers in this header (files only).
    pub high_seq: u32,
    /// First data block (files only).
    pub first_data: u32,
    /// Hash table (directories) or data block pointers (files).
    pub hash_table: [u32; HASH_TABLE_SIZE],
    /// Access flags.
    pub access: u32,
    /// File size in bytes (files only).
    pub byte_size: u32,
    /// Comment length.
    pub comment_len: u8,
    /// Comment (up to 79 chars).
    pub comment: [u8; MAX_COMMENT_LEN],
    /// Last modification date.
    pub date: AmigaDate,
    /// Name length.
    pub name_len: u8,
    /// Entry name (up to 30 chars).
    pub name: [u8; MAX_NAME_LEN],
    /// Real entry (for hard links).
    pub real_entry: u32,
    /// Next link in chain.
    pub next_link: u32,
    /// Next entry with same hash.
    pub next_same_hash: u32,
    /// Parent directory block.
    pub parent: u32,
    /// Extension block (file ext or dir cache).
    pub extension: u32,
}

impl EntryBlock {
    /// Parse entry block from raw data.
    pub fn parse(buf: &[u8; BLOCK_SIZE], index: u32) -> Result<Self> {
        check_type(buf, index, T_HEADER)?;
        check_checksum(buf, index)?;

        let sec_type = read_i32_be(buf, 0x1FC);
        let entry_type = EntryType::from_sec_type(sec_type).ok_or_else(|| {
            AdfError::corrupt_block(index, format!("unknown secondary type {sec_type}"))
        })?;
        let high_seq = if entry_type == EntryType::File {
            read_high_seq(buf, index)?
        } else {
            0
        };
        let (comment, comment_len) = read_bstr::<MAX_COMMENT_LEN>(buf, 0x148);
        let (name, name_len) = read_bstr::<MAX_NAME_LEN>(buf, 0x1B0);

        Ok(Self {
            index,
            entry_type,
            high_seq,
            first_data: read_u32_be(buf, 16),
            hash_table: read_table(buf),
            access: read_u32_be(buf, 0x140),
            byte_size: read_u32_be(buf, 0x144),
            comment_len,
            comment,
            date: read_date(buf, 0x1A4),
            name_len,
            name,
            real_entry: read_u32_be(buf, 0x1D4),
            next_link: read_u32_be(buf, 0x1D8),
            next_same_hash: read_u32_be(buf, 0x1F0),
            parent: read_u32_be(buf, 0x1F4),
            extension: read_u32_be(buf, 0x1F8),
        })
    }

    /// Get entry name as byte slice.
    #[inline]
    pub fn name(&self) -> &[u8] {
        &self.name[..self.name_len as usize]
    }

    /// Get comment as byte slice.
    #[inline]
    pub fn comment(&self) -> &[u8] {
        &self.comment[..self.comment_len as usize]
    }

    /// Data block pointer `index` of this header (files only).
    #[inline]
    pub const fn data_block(&self, index: usize) -> u32 {
        table_pointer(&self.hash_table, index)
    }
}

/// Pointer tables are filled from the end: slot 71 holds the first block.
#[inline]
const fn table_pointer(table: &[u32; MAX_DATABLK], index: usize) -> u32 {
    if index < MAX_DATABLK {
        table[MAX_DATABLK - 1 - index]
    } else {
        0
    }
}

/// Parsed soft link header.
#[derive(Debug, Clone)]
pub struct SoftLinkBlock {
    /// Common header fields.
    pub entry: EntryBlock,
    /// Latin-1 target as stored.
    pub target: Vec<u8>,
}

/// Parsed file extension block.
#[derive(Debug, Clone)]
pub struct FileExtBlock {
    /// This block's index.
    pub index: u32,
    /// Number of data block pointers in this block.
    pub high_seq: u32,
    /// Data block pointers.
    pub data_blocks: [u32; MAX_DATABLK],
    /// Parent (file header block).
    pub parent: u32,
    /// Next extension block.
    pub extension: u32,
}

impl FileExtBlock {
    /// Parse file extension block from raw data.
    pub fn parse(buf: &[u8; BLOCK_SIZE], index: u32) -> Result<Self> {
        check_type(buf, index, T_LIST)?;
        check_checksum(buf, index)?;
        let sec_type = read_i32_be(buf, 0x1FC);
        if sec_type != ST_FILE {
            return Err(AdfError::corrupt_block(
                index,
                format!("extension secondary type {sec_type}"),
            ));
        }

        Ok(Self {
            index,
            high_seq: read_high_seq(buf, index)?,
            data_blocks: read_table(buf),
            parent: read_u32_be(buf, 0x1F4),
            extension: read_u32_be(buf, 0x1F8),
        })
    }

    /// Data block pointer `index` of this extension block.
    #[inline]
    pub const fn data_block(&self, index: usize) -> u32 {
        table_pointer(&self.data_blocks, index)
    }
}

/// OFS data block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfsDataHeader {
    /// File header block pointer.
    pub header_key: u32,
    /// Sequence number (1-based).
    pub seq_num: u32,
    /// Payload bytes used in this block.
    pub data_size: u32,
    /// Next data block.
    pub next_data: u32,
}

impl OfsDataHeader {
    /// Parse and verify an OFS data block header.
    pub fn parse(buf: &[u8; BLOCK_SIZE], index: u32) -> Result<Self> {
        check_type(buf, index, T_DATA)?;
        check_checksum(buf, index)?;
        let data_size = read_u32_be(buf, 12);
        if data_size as usize > OFS_DATA_SIZE {
            return Err(AdfError::corrupt_block(
                index,
                format!("data size {data_size}"),
            ));
        }
        Ok(Self {
            header_key: read_u32_be(buf, 4),
            seq_num: read_u32_be(buf, 8),
            data_size,
            next_data: read_u32_be(buf, 16),
        })
    }
}

/// A data block; OFS blocks carry a verified header, FFS blocks are raw.
#[derive(Debug, Clone)]
pub struct DataBlock {
    /// Header for OFS blocks.
    pub header: Option<OfsDataHeader>,
    raw: [u8; BLOCK_SIZE],
}

impl DataBlock {
    /// Decode a data block for the given filesystem type.
    pub fn parse(buf: &[u8; BLOCK_SIZE], index: u32, fs_type: FsType) -> Result<Self> {
        let header = match fs_type {
            FsType::Ofs => Some(OfsDataHeader::parse(buf, index)?),
            FsType::Ffs => None,
        };
        Ok(Self { header, raw: *buf })
    }

    /// Bytes of file data held by this block.
    pub fn payload(&self) -> &[u8] {
        match self.header {
            Some(header) => {
                &self.raw[OFS_HEADER_SIZE..OFS_HEADER_SIZE + header.data_size as usize]
            }
            None => &self.raw,
        }
    }
}

/// What a caller expects a block to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Volume root block.
    Root,
    /// Directory, file or link header.
    Header,
    /// File extension block.
    FileExtension,
    /// Data block of an OFS or FFS file.
    Data(FsType),
}

/// A decoded and verified block.
#[derive(Debug, Clone)]
pub enum Block {
    /// Volume root.
    Root(RootBlock),
    /// Directory header.
    Directory(EntryBlock),
    /// File header.
    File(EntryBlock),
    /// Hard link to a file or directory.
    HardLink(EntryBlock),
    /// Soft link.
    SoftLink(SoftLinkBlock),
    /// File extension block.
    FileExtension(FileExtBlock),
    /// File data.
    Data(DataBlock),
}

impl Block {
    /// The header fields for entry variants.
    pub fn entry(&self) -> Option<&EntryBlock> {
        match self {
            Self::Directory(entry) | Self::File(entry) | Self::HardLink(entry) => Some(entry),
            Self::SoftLink(link) => Some(&link.entry),
            Self::Root(_) | Self::FileExtension(_) | Self::Data(_) => None,
        }
    }

    /// Take the header fields for entry variants.
    pub fn into_entry(self) -> Option<EntryBlock> {
        match self {
            Self::Directory(entry) | Self::File(entry) | Self::HardLink(entry) => Some(entry),
            Self::SoftLink(link) => Some(link.entry),
            Self::Root(_) | Self::FileExtension(_) | Self::Data(_) => None,
        }
    }
}

/// Decode block `index` as the `expected` kind.
pub fn decode(buf: &[u8; BLOCK_SIZE], index: u32, expected: BlockKind) -> Result<Block> {
    match expected {
        BlockKind::Root => RootBlock::parse(buf, index).map(Block::Root),
        BlockKind::FileExtension => FileExtBlock::parse(buf, index).map(Block::FileExtension),
        BlockKind::Data(fs_type) => DataBlock::parse(buf, index, fs_type).map(Block::Data),
        BlockKind::Header => {
            let entry = EntryBlock::parse(buf, index)?;
            match entry.entry_type {
                EntryType::Root => Err(AdfError::corrupt_block(
                    index,
                    "root block where an entry header was expected",
                )),
                EntryType::Dir => Ok(Block::Directory(entry)),
                EntryType::File => Ok(Block::File(entry)),
                EntryType::HardLinkFile | EntryType::HardLinkDir => Ok(Block::HardLink(entry)),
                EntryType::SoftLink => Ok(Block::SoftLink(SoftLinkBlock {
                    target: symlink_target(buf).to_vec(),
                    entry,
                })),
            }
        }
    }
}
