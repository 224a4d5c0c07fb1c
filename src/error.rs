//! Error types for Amiga volume operations.
//!
//! Errors are raised by the lowest layer able to detect them (range checks in
//! the block device, checksums in the block decoder) and travel upward
//! unchanged. The file reader is the one place that rewraps: block-level
//! corruption inside a file becomes [`AdfError::CorruptFile`] carrying the
//! file offset of the failing block.
//!
//! Every variant maps to exactly one POSIX errno via [`AdfError::errno`], so a
//! protocol adapter never has to collapse two kinds into a generic failure.

use thiserror::Error;

/// Error type for Amiga volume operations.
#[derive(Debug, Error)]
pub enum AdfError {
    /// The image does not carry a supported Amiga filesystem signature.
    #[error("unsupported filesystem: {0}")]
    UnsupportedFilesystem(String),

    /// Boot or root block failed validation at mount time.
    #[error("corrupt volume: {0}")]
    CorruptVolume(String),

    /// A metadata block failed its type or checksum check.
    #[error("corrupt block {block}: {reason}")]
    CorruptBlock {
        /// Block index on the device.
        block: u32,
        /// What did not validate.
        reason: String,
    },

    /// A block inside a file's data range did not validate.
    #[error("corrupt file data at offset {offset}: {reason}")]
    CorruptFile {
        /// File offset of the first byte of the failing block.
        offset: u64,
        /// What did not validate.
        reason: String,
    },

    /// No entry with this name or path.
    #[error("not found: {0}")]
    NotFound(String),

    /// A directory was expected.
    #[error("not a directory")]
    NotADirectory,

    /// A file was expected but the entry is a directory.
    #[error("is a directory")]
    IsADirectory,

    /// A soft link was expected.
    #[error("not a symlink")]
    NotASymlink,

    /// Block index or byte offset beyond the end of its container.
    #[error("index {index} out of range (limit {limit})")]
    OutOfRange {
        /// Requested index or offset.
        index: u64,
        /// Exclusive upper bound.
        limit: u64,
    },

    /// Error from the underlying image storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation on an adapter that has been unmounted.
    #[error("volume is not mounted")]
    NotMounted,
}

impl AdfError {
    /// Shorthand for a [`AdfError::CorruptBlock`].
    pub(crate) fn corrupt_block(block: u32, reason: impl Into<String>) -> Self {
        Self::CorruptBlock {
            block,
            reason: reason.into(),
        }
    }

    /// Returns true for the corruption kinds.
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::CorruptVolume(_) | Self::CorruptBlock { .. } | Self::CorruptFile { .. }
        )
    }

    /// Map to the POSIX errno a filesystem protocol should reply with.
    #[must_use]
    pub fn errno(&self) -> libc::c_int {
        match self {
            Self::UnsupportedFilesystem(_) => libc::EOPNOTSUPP,
            Self::CorruptVolume(_) | Self::CorruptBlock { .. } | Self::CorruptFile { .. } => {
                libc::EIO
            }
            Self::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
            Self::NotFound(_) => libc::ENOENT,
            Self::NotADirectory => libc::ENOTDIR,
            Self::IsADirectory => libc::EISDIR,
            Self::NotASymlink | Self::OutOfRange { .. } => libc::EINVAL,
            Self::NotMounted => libc::ENXIO,
        }
    }
}

impl From<AdfError> for std::io::Error {
    fn from(err: AdfError) -> Self {
        use std::io::ErrorKind;

        match err {
            AdfError::Io(inner) => inner,
            other => {
                let kind = match &other {
                    AdfError::NotFound(_) => ErrorKind::NotFound,
                    AdfError::NotADirectory => ErrorKind::NotADirectory,
                    AdfError::IsADirectory => ErrorKind::IsADirectory,
                    AdfError::NotASymlink | AdfError::OutOfRange { .. } => {
                        ErrorKind::InvalidInput
                    }
                    AdfError::UnsupportedFilesystem(_) => ErrorKind::Unsupported,
                    AdfError::CorruptVolume(_)
                    | AdfError::CorruptBlock { .. }
                    | AdfError::CorruptFile { .. } => ErrorKind::InvalidData,
                    AdfError::Io(_) | AdfError::NotMounted => ErrorKind::Other,
                };
                Self::new(kind, other)
            }
        }
    }
}

/// Result type for Amiga volume operations.
pub type Result<T> = std::result::Result<T, AdfError>;
