//! Core value types shared across the decoder, resolver and adapter.

use core::fmt;

use crate::constants::*;

/// Filesystem type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsType {
    /// Original File System.
    Ofs,
    /// Fast File System.
    Ffs,
}

impl FsType {
    /// Returns the data payload size per block.
    #[inline]
    pub const fn data_block_size(self) -> usize {
        match self {
            Self::Ofs => OFS_DATA_SIZE,
            Self::Ffs => FFS_DATA_SIZE,
        }
    }

    /// Offset of the payload inside a data block.
    #[inline]
    pub const fn data_offset(self) -> usize {
        match self {
            Self::Ofs => OFS_HEADER_SIZE,
            Self::Ffs => 0,
        }
    }
}

/// Variant tag from the boot block flags byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosType {
    /// OFS or FFS data block layout.
    pub fs_type: FsType,
    /// International case folding.
    pub intl: bool,
    /// Directory cache blocks present.
    pub dircache: bool,
}

impl DosType {
    /// Decode the flags byte (`DOS\0` .. `DOS\5`); `None` for unsupported values.
    pub const fn from_flags(flags: u8) -> Option<Self> {
        if flags > DOSFS_MAX_SUPPORTED {
            return None;
        }
        Some(Self {
            fs_type: if flags & DOSFS_FFS != 0 {
                FsType::Ffs
            } else {
                FsType::Ofs
            },
            intl: flags & DOSFS_INTL != 0,
            dircache: flags & DOSFS_DIRCACHE != 0,
        })
    }

    /// The flags byte this variant is stored as.
    pub const fn flags(self) -> u8 {
        let mut flags = 0;
        if matches!(self.fs_type, FsType::Ffs) {
            flags |= DOSFS_FFS;
        }
        if self.intl {
            flags |= DOSFS_INTL;
        }
        if self.dircache {
            flags |= DOSFS_DIRCACHE;
        }
        flags
    }

    /// Whether names fold with the international rules.
    ///
    /// Directory-cache volumes always hash with the international table.
    #[inline]
    pub const fn is_intl(self) -> bool {
        self.intl || self.dircache
    }
}

impl fmt::Display for DosType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fs = match self.fs_type {
            FsType::Ofs => "OFS",
            FsType::Ffs => "FFS",
        };
        write!(f, "DOS\\{} ({fs}", self.flags())?;
        if self.dircache {
            f.write_str(", dircache")?;
        } else if self.intl {
            f.write_str(", intl")?;
        }
        f.write_str(")")
    }
}

/// Entry type in the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    /// Root directory.
    Root,
    /// Directory.
    Dir,
    /// File.
    File,
    /// Hard link to file.
    HardLinkFile,
    /// Hard link to directory.
    HardLinkDir,
    /// Soft link.
    SoftLink,
}

impl EntryType {
    /// Create from secondary type value.
    pub const fn from_sec_type(sec_type: i32) -> Option<Self> {
        match sec_type {
            ST_ROOT => Some(Self::Root),
            ST_DIR => Some(Self::Dir),
            ST_FILE => Some(Self::File),
            ST_LFILE => Some(Self::HardLinkFile),
            ST_LDIR => Some(Self::HardLinkDir),
            ST_LSOFT => Some(Self::SoftLink),
            _ => None,
        }
    }

    /// Returns true if this is a directory type.
    #[inline]
    pub const fn is_dir(self) -> bool {
        matches!(self, Self::Root | Self::Dir | Self::HardLinkDir)
    }

    /// Returns true if this is a file type.
    #[inline]
    pub const fn is_file(self) -> bool {
        matches!(self, Self::File | Self::HardLinkFile)
    }

    /// Returns true for either kind of hard link.
    #[inline]
    pub const fn is_hard_link(self) -> bool {
        matches!(self, Self::HardLinkFile | Self::HardLinkDir)
    }
}

/// Protection bits.
///
/// The low four owner bits are inverted: a set bit denies the operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Access(pub u32);

impl Access {
    /// Create from raw access value.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Check if delete is protected.
    #[inline]
    pub const fn is_delete_protected(self) -> bool {
        (self.0 & ACC_DELETE) != 0
    }

    /// Check if execute is protected.
    #[inline]
    pub const fn is_execute_protected(self) -> bool {
        (self.0 & ACC_EXECUTE) != 0
    }

    /// Check if write is protected.
    #[inline]
    pub const fn is_write_protected(self) -> bool {
        (self.0 & ACC_WRITE) != 0
    }

    /// Check if read is protected.
    #[inline]
    pub const fn is_read_protected(self) -> bool {
        (self.0 & ACC_READ) != 0
    }

    /// Check if archived flag is set.
    #[inline]
    pub const fn is_archived(self) -> bool {
        (self.0 & ACC_ARCHIVE) != 0
    }

    /// Check if pure (re-entrant) flag is set.
    #[inline]
    pub const fn is_pure(self) -> bool {
        (self.0 & ACC_PURE) != 0
    }

    /// Check if script flag is set.
    #[inline]
    pub const fn is_script(self) -> bool {
        (self.0 & ACC_SCRIPT) != 0
    }

    /// Check if hold flag is set.
    #[inline]
    pub const fn is_hold(self) -> bool {
        (self.0 & ACC_HOLD) != 0
    }

    /// POSIX permission bits for a read-only mount.
    ///
    /// Owner bits come from the inverted Amiga owner flags; group and other
    /// come from the multi-user bits, which are "set = allowed". Directories
    /// are always searchable by anyone who may read them. Write is never
    /// granted.
    pub const fn to_mode(self, is_dir: bool) -> u32 {
        let mut mode = 0;
        if !self.is_read_protected() {
            mode |= 0o400;
        }
        if is_dir || !self.is_execute_protected() {
            mode |= 0o100;
        }
        if self.0 & ACC_GRP_READ != 0 {
            mode |= 0o040;
        }
        if self.0 & ACC_GRP_EXECUTE != 0 || (is_dir && self.0 & ACC_GRP_READ != 0) {
            mode |= 0o010;
        }
        if self.0 & ACC_OTR_READ != 0 {
            mode |= 0o004;
        }
        if self.0 & ACC_OTR_EXECUTE != 0 || (is_dir && self.0 & ACC_OTR_READ != 0) {
            mode |= 0o001;
        }
        mode
    }
}
