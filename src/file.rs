//! File reading functionality.
//!
//! Reads are stateless: a [`FileHandle`] only remembers where the header
//! block is, and every call walks the pointer tables from there. Data block
//! `i` lives in table `i / 72` (table 0 is the header, table `k` the `k`-th
//! extension block) at slot `i % 72`.

use std::collections::HashSet;
use std::io::{self, Read, Seek, SeekFrom};

use tracing::warn;

use crate::block::{Block, BlockKind, DataBlock, EntryBlock, FileExtBlock};
use crate::constants::*;
use crate::device::BlockDevice;
use crate::dir::DirEntry;
use crate::error::{AdfError, Result};
use crate::types::FsType;
use crate::volume::Volume;

/// An open file: enough to locate its data, nothing more.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHandle {
    header_block: u32,
    size: u32,
    fs_type: FsType,
}

impl FileHandle {
    /// Get the total file size in bytes.
    #[inline]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Get the block number of the file header.
    #[inline]
    pub const fn header_block(&self) -> u32 {
        self.header_block
    }

    /// Filesystem type the data blocks are laid out for.
    #[inline]
    pub const fn fs_type(&self) -> FsType {
        self.fs_type
    }

    /// Number of data blocks the file occupies.
    pub const fn block_count(&self) -> u32 {
        self.size.div_ceil(self.fs_type.data_block_size() as u32)
    }
}

/// One pointer table: the file header or an extension block.
struct PointerTable {
    high_seq: u32,
    pointers: [u32; MAX_DATABLK],
    next: u32,
}

impl PointerTable {
    fn from_header(entry: &EntryBlock) -> Self {
        Self {
            high_seq: entry.high_seq,
            pointers: entry.hash_table,
            next: entry.extension,
        }
    }

    fn from_extension(ext: &FileExtBlock) -> Self {
        Self {
            high_seq: ext.high_seq,
            pointers: ext.data_blocks,
            next: ext.extension,
        }
    }

    /// Slot `i` of the table, counted from the first data block.
    fn pointer(&self, slot: usize) -> Option<u32> {
        if slot < self.high_seq as usize {
            let block = self.pointers[MAX_DATABLK - 1 - slot];
            (block != 0).then_some(block)
        } else {
            None
        }
    }
}

/// Rewrap a block-level failure as corruption of the file at `offset`.
///
/// Storage errors stay [`AdfError::Io`]; everything else about a block that
/// belongs to the file means the file is damaged.
fn file_error(offset: u64, err: AdfError) -> AdfError {
    let err = match err {
        AdfError::Io(_) | AdfError::CorruptFile { .. } => err,
        other => AdfError::CorruptFile {
            offset,
            reason: other.to_string(),
        },
    };
    if err.is_corruption() {
        warn!(offset, error = %err, "corrupt file data");
    }
    err
}

impl<D: BlockDevice> Volume<D> {
    /// Open a file entry for reading; hard links are followed.
    pub fn open_file(&self, entry: &DirEntry) -> Result<FileHandle> {
        let target = self.resolve_hard_link(entry)?;
        match target.entry_type {
            t if t.is_dir() => Err(AdfError::IsADirectory),
            t if t.is_file() => Ok(FileHandle {
                header_block: target.block,
                size: target.size,
                fs_type: self.fs_type(),
            }),
            // Soft links carry no data of their own.
            _ => Err(AdfError::NotFound(format!(
                "{} is a soft link",
                target.name_string()
            ))),
        }
    }

    fn file_header(&self, handle: &FileHandle) -> Result<EntryBlock> {
        match self.block(handle.header_block, BlockKind::Header)? {
            Block::File(entry) => Ok(entry),
            Block::Directory(_) => Err(AdfError::IsADirectory),
            _ => Err(AdfError::corrupt_block(handle.header_block, "not a file header")),
        }
    }

    fn extension_table(&self, block: u32) -> Result<PointerTable> {
        match self.block(block, BlockKind::FileExtension)? {
            Block::FileExtension(ext) => Ok(PointerTable::from_extension(&ext)),
            _ => Err(AdfError::corrupt_block(block, "not a file extension block")),
        }
    }

    /// Read up to `len` bytes starting at `offset`.
    ///
    /// Reading at or past the end yields an empty buffer; only an offset
    /// beyond the file size is an error.
    pub fn read(&self, handle: &FileHandle, offset: u64, len: usize) -> Result<Vec<u8>> {
        let size = u64::from(handle.size);
        if offset > size {
            return Err(AdfError::OutOfRange {
                index: offset,
                limit: size,
            });
        }
        let len = (size - offset).min(len as u64) as usize;
        let mut out = vec![0u8; len];
        let n = self.read_at(handle, offset, &mut out)?;
        out.truncate(n);
        Ok(out)
    }

    /// Fill `out` from file position `offset`; returns the bytes copied.
    pub fn read_at(&self, handle: &FileHandle, offset: u64, out: &mut [u8]) -> Result<usize> {
        let size = u64::from(handle.size);
        if offset > size {
            return Err(AdfError::OutOfRange {
                index: offset,
                limit: size,
            });
        }
        let end = size.min(offset + out.len() as u64);
        if end == offset {
            return Ok(0);
        }

        let cap = handle.fs_type.data_block_size() as u64;
        let first = offset / cap;
        let last = (end - 1) / cap;
        let per_table = MAX_DATABLK as u64;

        let header = self.file_header(handle)?;
        let mut table = PointerTable::from_header(&header);
        let mut table_index = 0u64;
        let mut copied = 0usize;

        for index in first..=last {
            let block_offset = index * cap;
            while table_index < index / per_table {
                table_index += 1;
                let table_offset = table_index * per_table * cap;
                if table.next == 0 {
                    let missing = AdfError::corrupt_block(
                        handle.header_block,
                        format!("extension block {table_index} missing"),
                    );
                    return Err(file_error(table_offset, missing));
                }
                table = self
                    .extension_table(table.next)
                    .map_err(|err| file_error(table_offset, err))?;
            }

            let slot = (index % per_table) as usize;
            let block = table.pointer(slot).ok_or_else(|| {
                file_error(
                    block_offset,
                    AdfError::corrupt_block(
                        handle.header_block,
                        format!("no pointer for data block {index}"),
                    ),
                )
            })?;

            let expected = (size - block_offset).min(cap) as usize;
            let data = self
                .data_block(handle, block, index, expected)
                .map_err(|err| file_error(block_offset, err))?;
            let payload = data.payload();

            let start = offset.saturating_sub(block_offset) as usize;
            let stop = ((end - block_offset) as usize).min(expected);
            let chunk = &payload[start..stop];
            out[copied..copied + chunk.len()].copy_from_slice(chunk);
            copied += chunk.len();
        }

        Ok(copied)
    }

    /// Read and verify data block number `index` of a file.
    fn data_block(
        &self,
        handle: &FileHandle,
        block: u32,
        index: u64,
        expected: usize,
    ) -> Result<DataBlock> {
        let data = match self.block(block, BlockKind::Data(handle.fs_type))? {
            Block::Data(data) => data,
            _ => return Err(AdfError::corrupt_block(block, "not a data block")),
        };
        if let Some(header) = data.header {
            if header.header_key != handle.header_block {
                return Err(AdfError::corrupt_block(
                    block,
                    format!("owned by header {}", header.header_key),
                ));
            }
            if u64::from(header.seq_num) != index + 1 {
                return Err(AdfError::corrupt_block(
                    block,
                    format!("sequence {} where {} was expected", header.seq_num, index + 1),
                ));
            }
            if header.data_size as usize != expected {
                return Err(AdfError::corrupt_block(
                    block,
                    format!("holds {} bytes, expected {expected}", header.data_size),
                ));
            }
        }
        Ok(data)
    }

    /// Every data block of the file, in file order.
    pub fn data_blocks(&self, handle: &FileHandle) -> Result<Vec<u32>> {
        let wanted = handle.block_count() as usize;
        let cap = handle.fs_type.data_block_size() as u64;
        let header = self.file_header(handle)?;
        let mut table = PointerTable::from_header(&header);
        let mut visited = HashSet::from([handle.header_block]);
        let mut blocks = Vec::with_capacity(wanted);

        loop {
            for slot in 0..table.high_seq as usize {
                if blocks.len() == wanted {
                    break;
                }
                let offset = blocks.len() as u64 * cap;
                let block = table.pointer(slot).ok_or_else(|| {
                    file_error(
                        offset,
                        AdfError::corrupt_block(handle.header_block, "empty data pointer"),
                    )
                })?;
                blocks.push(block);
            }
            if blocks.len() == wanted || table.next == 0 {
                break;
            }
            let offset = blocks.len() as u64 * cap;
            if !visited.insert(table.next) {
                return Err(file_error(
                    offset,
                    AdfError::corrupt_block(table.next, "extension chain loops"),
                ));
            }
            table = self
                .extension_table(table.next)
                .map_err(|err| file_error(offset, err))?;
        }

        if blocks.len() < wanted {
            return Err(file_error(
                blocks.len() as u64 * cap,
                AdfError::corrupt_block(
                    handle.header_block,
                    format!("{} of {wanted} data blocks present", blocks.len()),
                ),
            ));
        }
        Ok(blocks)
    }

    /// A streaming reader over `handle`.
    pub fn cursor(&self, handle: FileHandle) -> FileCursor<'_, D> {
        FileCursor {
            volume: self,
            handle,
            position: 0,
        }
    }
}

/// Streaming file reader implementing [`Read`] and [`Seek`].
///
/// # Example
///
/// ```no_run
/// use std::io::Read;
/// use adf_fs::{ImageFile, Volume};
///
/// let volume = Volume::open(ImageFile::open("workbench.adf")?)?;
/// let entry = volume.resolve_path("/s/startup-sequence")?;
/// let mut text = String::new();
/// volume.cursor(volume.open_file(&entry)?).read_to_string(&mut text)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct FileCursor<'a, D> {
    volume: &'a Volume<D>,
    handle: FileHandle,
    position: u64,
}

impl<D> FileCursor<'_, D> {
    /// Get current position in the file.
    #[inline]
    pub const fn position(&self) -> u64 {
        self.position
    }

    /// The handle being read.
    #[inline]
    pub const fn handle(&self) -> &FileHandle {
        &self.handle
    }
}

impl<D: BlockDevice> Read for FileCursor<'_, D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.position >= u64::from(self.handle.size) {
            return Ok(0);
        }
        let n = self.volume.read_at(&self.handle, self.position, buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl<D> Seek for FileCursor<'_, D> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(delta) => u64::from(self.handle.size).checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of file")
        })?;
        self.position = target;
        Ok(target)
    }
}
