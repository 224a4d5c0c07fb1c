//! Soft link targets.

use crate::block::{Block, BlockKind};
use crate::constants::*;
use crate::device::BlockDevice;
use crate::dir::DirEntry;
use crate::error::{AdfError, Result};
use crate::volume::Volume;

/// Maximum soft link target length.
///
/// The target starts at offset 24 and ends where the trailing header
/// structure begins (512 - 200), giving 288 bytes.
pub const MAX_SYMLINK_LEN: usize = BLOCK_SIZE - SYMLINK_OFFSET - FILE_LOCATION;

/// Raw Latin-1 target bytes of a soft link header block, up to the first NUL.
pub fn symlink_target(buf: &[u8; BLOCK_SIZE]) -> &[u8] {
    let area = &buf[SYMLINK_OFFSET..SYMLINK_OFFSET + MAX_SYMLINK_LEN];
    let len = memchr::memchr(0, area).unwrap_or(area.len());
    &area[..len]
}

/// Convert a Latin-1 target to a host path string.
///
/// A leading `:` names the volume root on the Amiga and becomes `/`.
pub fn target_to_host(latin1: &[u8]) -> String {
    latin1
        .iter()
        .enumerate()
        .map(|(i, &byte)| {
            if i == 0 && byte == b':' {
                '/'
            } else {
                char::from(byte)
            }
        })
        .collect()
}

impl<D: BlockDevice> Volume<D> {
    /// Latin-1 target of a soft link entry, as stored.
    pub fn read_link(&self, entry: &DirEntry) -> Result<Vec<u8>> {
        if !entry.is_symlink() {
            return Err(AdfError::NotASymlink);
        }
        match self.block(entry.block, BlockKind::Header)? {
            Block::SoftLink(link) => Ok(link.target),
            _ => Err(AdfError::NotASymlink),
        }
    }
}
