//! # adf-fs
//!
//! Read-only access to Amiga disk images: ADF floppies, side-split XDF
//! floppies and RDB-partitioned HDF hard disk images.
//!
//! The crate is layered bottom-up. A [`BlockDevice`] supplies 512-byte
//! blocks; [`Volume`] validates the boot and root blocks and exposes
//! directory lookup and file reads by block index; [`AdfFs`] wraps a volume
//! in the path-based calls a filesystem server needs.
//!
//! ## Features
//!
//! - OFS and FFS, with INTL and DIRCACHE name rules
//! - Stateless random-access file reads, plus a [`FileCursor`] for streaming
//! - Hard and soft links
//! - Free space from the allocation bitmap
//! - Interleaved and side-split track layouts
//! - First-partition mounting of RDB hard disk images
//! - `simd` feature: vectorised checksum loops
//!
//! ## Example
//!
//! ```no_run
//! use adf_fs::{AdfFs, FileKind, MountOptions};
//!
//! let fs = AdfFs::mount("workbench.adf", &MountOptions::default())?;
//! for name in fs.list_directory("/")? {
//!     let attrs = fs.get_attributes(&format!("/{name}"))?;
//!     if attrs.kind == FileKind::File {
//!         println!("{name}: {} bytes", attrs.size);
//!     }
//! }
//! # Ok::<(), adf_fs::AdfError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod bitmap;
mod block;
mod checksum;
mod constants;
mod date;
mod device;
mod dir;
mod error;
mod file;
mod fs;
mod name;
mod rdb;
mod symlink;
mod types;
mod volume;

pub use bitmap::BLOCKS_PER_BITMAP;
pub use block::*;
pub use checksum::{bitmap_sum, boot_sum, normal_sum, normal_sum_slice, rdb_sum, read_u32_be};
pub use constants::*;
pub use date::{AmigaDate, DateTime};
pub use device::{
    BlockDevice, Chs, Geometry, GeometryDevice, ImageFile, MemoryDevice, PartitionDevice,
    TrackLayout,
};
pub use dir::{DirEntry, DirIter};
pub use error::{AdfError, Result};
pub use file::{FileCursor, FileHandle};
pub use fs::{AdfFs, Attributes, DynDevice, FileKind, MountOptions, VolumeStats};
pub use name::{hash_name, intl_to_upper, latin1_to_string, names_equal, string_to_latin1};
pub use rdb::{find_first_partition, Partition};
pub use symlink::{symlink_target, target_to_host, MAX_SYMLINK_LEN};
pub use types::*;
pub use volume::Volume;
