//! Directory traversal.
//!
//! A directory is a 72-slot hash table of header block pointers; entries
//! sharing a slot are chained through `next_same_hash`. Lookup walks one
//! chain, listing walks every slot in order.

use std::collections::HashSet;

use tracing::debug;

use crate::block::{Block, BlockKind, EntryBlock};
use crate::constants::*;
use crate::date::AmigaDate;
use crate::device::BlockDevice;
use crate::error::{AdfError, Result};
use crate::name::{hash_name, latin1_to_string, names_equal, string_to_latin1};
use crate::types::{Access, EntryType};
use crate::volume::Volume;

/// Directory entry information.
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// Entry name (up to 30 bytes).
    pub(crate) name: [u8; MAX_NAME_LEN],
    /// Name length.
    pub(crate) name_len: u8,
    /// Entry type.
    pub entry_type: EntryType,
    /// Block number of this entry.
    pub block: u32,
    /// Parent block number.
    pub parent: u32,
    /// File size (0 for directories).
    pub size: u32,
    /// Access permissions.
    pub access: Access,
    /// Last modification date.
    pub date: AmigaDate,
    /// Real entry (for hard links).
    pub real_entry: u32,
    /// Comment (if any).
    pub(crate) comment: [u8; MAX_COMMENT_LEN],
    /// Comment length.
    pub(crate) comment_len: u8,
}

impl DirEntry {
    /// Create from an entry block.
    pub(crate) fn from_entry_block(entry: &EntryBlock) -> Self {
        Self {
            name: entry.name,
            name_len: entry.name_len,
            entry_type: entry.entry_type,
            block: entry.index,
            parent: entry.parent,
            size: entry.byte_size,
            access: Access::new(entry.access),
            date: entry.date,
            real_entry: entry.real_entry,
            comment: entry.comment,
            comment_len: entry.comment_len,
        }
    }

    /// Get entry name as byte slice.
    #[inline]
    pub fn name(&self) -> &[u8] {
        &self.name[..self.name_len as usize]
    }

    /// Entry name decoded from Latin-1.
    pub fn name_string(&self) -> String {
        latin1_to_string(self.name())
    }

    /// Get comment as byte slice.
    #[inline]
    pub fn comment(&self) -> &[u8] {
        &self.comment[..self.comment_len as usize]
    }

    /// Comment decoded from Latin-1.
    pub fn comment_string(&self) -> String {
        latin1_to_string(self.comment())
    }

    /// Check if this is a directory.
    #[inline]
    pub const fn is_dir(&self) -> bool {
        self.entry_type.is_dir()
    }

    /// Check if this is a file.
    #[inline]
    pub const fn is_file(&self) -> bool {
        self.entry_type.is_file()
    }

    /// Check if this is a symlink.
    #[inline]
    pub const fn is_symlink(&self) -> bool {
        matches!(self.entry_type, EntryType::SoftLink)
    }
}

/// Iterator over directory entries.
///
/// Entries are read lazily, slot by slot, in on-disk order. A chain that
/// revisits a block ends the iteration with [`AdfError::CorruptBlock`].
pub struct DirIter<'a, D> {
    volume: &'a Volume<D>,
    dir_block: u32,
    hash_table: [u32; HASH_TABLE_SIZE],
    hash_index: usize,
    current_chain: u32,
    referrer: u32,
    visited: HashSet<u32>,
    failed: bool,
}

impl<'a, D: BlockDevice> DirIter<'a, D> {
    fn new(volume: &'a Volume<D>, dir_block: u32, hash_table: [u32; HASH_TABLE_SIZE]) -> Self {
        Self {
            volume,
            dir_block,
            hash_table,
            hash_index: 0,
            current_chain: 0,
            referrer: dir_block,
            visited: HashSet::new(),
            failed: false,
        }
    }

    fn read_chain_entry(&mut self, block: u32) -> Result<EntryBlock> {
        if !self.visited.insert(block) {
            return Err(AdfError::corrupt_block(block, "directory chain loops"));
        }
        read_linked_entry(self.volume, self.referrer, block)
    }
}

impl<D: BlockDevice> Iterator for DirIter<'_, D> {
    type Item = Result<DirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        while self.current_chain == 0 {
            if self.hash_index >= HASH_TABLE_SIZE {
                return None;
            }
            self.current_chain = self.hash_table[self.hash_index];
            self.hash_index += 1;
            self.referrer = self.dir_block;
        }

        let block = self.current_chain;
        match self.read_chain_entry(block) {
            Ok(entry) => {
                self.current_chain = entry.next_same_hash;
                self.referrer = block;
                Some(Ok(DirEntry::from_entry_block(&entry)))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// Read a header block that must be a directory, file or link.
fn read_entry<D: BlockDevice>(volume: &Volume<D>, block: u32) -> Result<EntryBlock> {
    volume
        .block(block, BlockKind::Header)?
        .into_entry()
        .ok_or_else(|| AdfError::corrupt_block(block, "not an entry header"))
}

/// A pointer stored in `referrer` that lands past the end of the volume is
/// corruption in `referrer`.
fn beyond_volume(referrer: u32) -> impl FnOnce(AdfError) -> AdfError {
    move |err| match err {
        AdfError::OutOfRange { index, .. } => {
            AdfError::corrupt_block(referrer, format!("pointer {index} beyond volume"))
        }
        other => other,
    }
}

fn read_linked_entry<D: BlockDevice>(
    volume: &Volume<D>,
    referrer: u32,
    block: u32,
) -> Result<EntryBlock> {
    read_entry(volume, block).map_err(beyond_volume(referrer))
}

impl<D: BlockDevice> Volume<D> {
    /// Read the entry whose header is at `block`.
    pub fn entry_at(&self, block: u32) -> Result<DirEntry> {
        if block == self.root_block() {
            return Ok(self.root_entry());
        }
        read_entry(self, block).map(|entry| DirEntry::from_entry_block(&entry))
    }

    /// Follow hard links to the entry holding the data.
    ///
    /// Entries that are not hard links are returned unchanged.
    pub fn resolve_hard_link(&self, entry: &DirEntry) -> Result<DirEntry> {
        let mut current = entry.clone();
        let mut hops = 0u32;
        while current.entry_type.is_hard_link() {
            hops += 1;
            if hops > self.total_blocks() {
                return Err(AdfError::corrupt_block(entry.block, "hard link loops"));
            }
            let target = self
                .entry_at(current.real_entry)
                .map_err(beyond_volume(current.block))?;
            if target.entry_type.is_dir() != current.entry_type.is_dir() {
                return Err(AdfError::corrupt_block(
                    current.block,
                    format!("hard link target {} has the wrong type", current.real_entry),
                ));
            }
            current = target;
        }
        Ok(current)
    }

    /// Hash table of the directory whose header is at `dir_block`.
    pub fn hash_table_of(&self, dir_block: u32) -> Result<[u32; HASH_TABLE_SIZE]> {
        if dir_block == self.root_block() {
            return Ok(*self.root_hash_table());
        }
        match self.block(dir_block, BlockKind::Header)? {
            Block::Directory(entry) => Ok(entry.hash_table),
            Block::HardLink(entry) if entry.entry_type == EntryType::HardLinkDir => {
                let target = self.resolve_hard_link(&DirEntry::from_entry_block(&entry))?;
                self.hash_table_of(target.block)
            }
            _ => Err(AdfError::NotADirectory),
        }
    }

    /// Iterate over the entries of a directory in on-disk order.
    pub fn read_dir(&self, dir_block: u32) -> Result<DirIter<'_, D>> {
        Ok(DirIter::new(self, dir_block, self.hash_table_of(dir_block)?))
    }

    /// All entries of a directory: slots 0..72 in order, chain order within
    /// a slot.
    pub fn list_entries(&self, dir_block: u32) -> Result<Vec<DirEntry>> {
        self.read_dir(dir_block)?.collect()
    }

    /// Find `name` in the directory at `dir_block`.
    pub fn lookup(&self, dir_block: u32, name: &[u8]) -> Result<DirEntry> {
        let not_found = || AdfError::NotFound(latin1_to_string(name));
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(not_found());
        }

        let intl = self.is_intl();
        let hash_table = self.hash_table_of(dir_block)?;
        let mut visited = HashSet::new();
        let mut referrer = dir_block;
        let mut block = hash_table[hash_name(name, intl)];

        while block != 0 {
            if !visited.insert(block) {
                return Err(AdfError::corrupt_block(block, "hash chain loops"));
            }
            let entry = read_linked_entry(self, referrer, block)?;
            if names_equal(entry.name(), name, intl) {
                return Ok(DirEntry::from_entry_block(&entry));
            }
            referrer = block;
            block = entry.next_same_hash;
        }

        Err(not_found())
    }

    /// Resolve a `/`-separated path from the root.
    ///
    /// Empty and `.` segments are skipped, so `""`, `"/"` and `"/./"` all
    /// name the root. Every segment but the last must be a directory.
    pub fn resolve_path(&self, path: &str) -> Result<DirEntry> {
        debug!(path, "resolving path");
        let mut current = self.root_entry();

        for segment in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
            if !current.is_dir() {
                return Err(AdfError::NotADirectory);
            }
            let name =
                string_to_latin1(segment).ok_or_else(|| AdfError::NotFound(segment.to_owned()))?;
            current = self.lookup(current.block, &name)?;
        }

        Ok(current)
    }
}
