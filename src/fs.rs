//! Path-based adapter for filesystem protocol servers.
//!
//! [`AdfFs`] answers the questions a FUSE-style server asks (attributes,
//! directory listings, byte ranges, link targets) in terms of UTF-8 paths,
//! and maps every failure to an [`AdfError`] whose [`AdfError::errno`] is the
//! reply code. It has no dependency on any particular protocol crate.

use std::path::Path;
use std::time::SystemTime;

use tracing::{debug, info};

use crate::constants::BLOCK_SIZE;
use crate::device::{BlockDevice, Geometry, GeometryDevice, ImageFile, TrackLayout};
use crate::dir::DirEntry;
use crate::error::{AdfError, Result};
use crate::rdb::find_first_partition;
use crate::symlink::target_to_host;
use crate::types::DosType;
use crate::volume::Volume;

/// Device type behind a mounted adapter.
pub type DynDevice = Box<dyn BlockDevice>;

/// How an image is turned into a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountOptions {
    /// Geometry to impose; detected from the image size when `None`.
    pub geometry: Option<Geometry>,
    /// Track order in the image file.
    pub layout: TrackLayout,
    /// Look for a Rigid Disk Block and mount its first partition.
    pub probe_rdb: bool,
    /// Sort listings by name, ignoring case; otherwise keep on-disk order.
    pub sort_listings: bool,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            geometry: None,
            layout: TrackLayout::Interleaved,
            probe_rdb: true,
            sort_listings: true,
        }
    }
}

impl MountOptions {
    /// Options for a side-split (XDF) floppy image.
    pub fn side_split() -> Self {
        Self {
            layout: TrackLayout::SideSplit,
            ..Self::default()
        }
    }
}

/// Kind of a filesystem node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Regular file (or hard link to one).
    File,
    /// Directory (or hard link to one).
    Directory,
    /// Soft link.
    Symlink,
}

/// Attributes of a node, ready for a `getattr` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attributes {
    /// Node kind.
    pub kind: FileKind,
    /// Size in bytes; UTF-8 target length for soft links, 0 for directories.
    pub size: u64,
    /// POSIX permission bits.
    pub permissions: u32,
    /// Last modification.
    pub mtime: SystemTime,
    /// Header block; stable for the life of the mount, usable as an inode.
    pub block: u32,
    /// File comment, possibly empty.
    pub comment: String,
}

/// Volume-wide figures for a `statfs` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeStats {
    /// Volume name.
    pub name: String,
    /// Filesystem variant.
    pub dos_type: DosType,
    /// Block size in bytes.
    pub block_size: u32,
    /// Blocks on the volume.
    pub total_blocks: u32,
    /// Free blocks, when the bitmap is valid.
    pub free_blocks: Option<u32>,
    /// Filesystem creation date.
    pub created: SystemTime,
    /// Last change anywhere on the volume.
    pub modified: SystemTime,
}

/// A read-only Amiga filesystem, addressed by path.
///
/// # Example
///
/// ```no_run
/// use adf_fs::{AdfFs, MountOptions};
///
/// let mut fs = AdfFs::mount("workbench.adf", &MountOptions::default())?;
/// for name in fs.list_directory("/")? {
///     println!("{name}");
/// }
/// let _head = fs.read_file("/s/startup-sequence", 0, 80)?;
/// fs.unmount();
/// # Ok::<(), adf_fs::AdfError>(())
/// ```
pub struct AdfFs {
    volume: Option<Volume<DynDevice>>,
    sort_listings: bool,
}

impl std::fmt::Debug for AdfFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdfFs")
            .field("mounted", &self.volume.is_some())
            .field("sort_listings", &self.sort_listings)
            .finish()
    }
}

impl AdfFs {
    /// Open and mount an image file.
    pub fn mount(image: impl AsRef<Path>, options: &MountOptions) -> Result<Self> {
        let image = image.as_ref();
        let file = ImageFile::open(image)?;
        info!(image = %image.display(), bytes = file.len_bytes(), "mounting image");
        Self::from_device(file, options)
    }

    /// Mount a volume on an already opened device.
    pub fn from_device<D: BlockDevice + 'static>(device: D, options: &MountOptions) -> Result<Self> {
        let device = prepare_device(Box::new(device), options)?;
        Ok(Self {
            volume: Some(Volume::open(device)?),
            sort_listings: options.sort_listings,
        })
    }

    /// Whether [`unmount`](Self::unmount) has not been called yet.
    pub fn is_mounted(&self) -> bool {
        self.volume.is_some()
    }

    /// The mounted volume.
    pub fn volume(&self) -> Result<&Volume<DynDevice>> {
        self.volume.as_ref().ok_or(AdfError::NotMounted)
    }

    /// Attributes of the node at `path`; hard links report their target.
    pub fn get_attributes(&self, path: &str) -> Result<Attributes> {
        let volume = self.volume()?;
        let entry = volume.resolve_path(path)?;
        if entry.is_symlink() {
            let target = target_to_host(&volume.read_link(&entry)?);
            return Ok(Attributes {
                kind: FileKind::Symlink,
                size: target.len() as u64,
                permissions: 0o777,
                mtime: entry.date.to_system_time(),
                block: entry.block,
                comment: entry.comment_string(),
            });
        }

        let target = volume.resolve_hard_link(&entry)?;
        let is_dir = target.is_dir();
        Ok(Attributes {
            kind: if is_dir {
                FileKind::Directory
            } else {
                FileKind::File
            },
            size: if is_dir { 0 } else { u64::from(target.size) },
            permissions: target.access.to_mode(is_dir),
            mtime: target.date.to_system_time(),
            block: target.block,
            comment: target.comment_string(),
        })
    }

    /// Names in the directory at `path`, without `.` and `..`.
    pub fn list_directory(&self, path: &str) -> Result<Vec<String>> {
        let volume = self.volume()?;
        let dir = volume.resolve_path(path)?;
        if !dir.is_dir() {
            return Err(AdfError::NotADirectory);
        }

        let mut names: Vec<String> = volume
            .list_entries(dir.block)?
            .iter()
            .map(DirEntry::name_string)
            .collect();
        if self.sort_listings {
            names.sort_by_cached_key(|name| (name.to_lowercase(), name.clone()));
        }
        debug!(path, entries = names.len(), "listed directory");
        Ok(names)
    }

    /// Up to `length` bytes of the file at `path` from `offset`.
    pub fn read_file(&self, path: &str, offset: u64, length: usize) -> Result<Vec<u8>> {
        let volume = self.volume()?;
        let entry = volume.resolve_path(path)?;
        let handle = volume.open_file(&entry)?;
        volume.read(&handle, offset, length)
    }

    /// Target of the soft link at `path`, as a host path string.
    pub fn read_link(&self, path: &str) -> Result<String> {
        let volume = self.volume()?;
        let entry = volume.resolve_path(path)?;
        Ok(target_to_host(&volume.read_link(&entry)?))
    }

    /// Volume-wide statistics.
    pub fn stat_volume(&self) -> Result<VolumeStats> {
        let volume = self.volume()?;
        Ok(VolumeStats {
            name: volume.name_string(),
            dos_type: volume.dos_type(),
            block_size: BLOCK_SIZE as u32,
            total_blocks: volume.total_blocks(),
            free_blocks: volume.free_blocks()?,
            created: volume.created().to_system_time(),
            modified: volume.modified().to_system_time(),
        })
    }

    /// Release the image. Safe to call more than once.
    pub fn unmount(&mut self) {
        if let Some(volume) = self.volume.take() {
            info!(name = %volume.name_string(), "unmounted volume");
        }
    }
}

/// Apply RDB discovery, then geometry, to a raw device.
fn prepare_device(device: DynDevice, options: &MountOptions) -> Result<DynDevice> {
    if options.probe_rdb {
        if let Some(partition) = find_first_partition(&device)? {
            info!(
                partition = %partition.name,
                start = partition.start_block,
                "mounting first RDB partition"
            );
            return Ok(Box::new(partition.open(device)?));
        }
    }

    if options.geometry.is_none() && options.layout == TrackLayout::Interleaved {
        return Ok(device);
    }
    let geometry = match options.geometry {
        Some(geometry) => geometry,
        None => Geometry::for_image_size(u64::from(device.block_count()) * BLOCK_SIZE as u64)?,
    };
    debug!(?geometry, layout = ?options.layout, "mapping image geometry");
    Ok(Box::new(GeometryDevice::new(device, geometry, options.layout)?))
}
