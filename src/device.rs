//! Block devices: the image as a fixed-size array of 512-byte blocks.
//!
//! All devices are read-only and `Send + Sync`. Higher layers share one device
//! by reference; nothing above this module ever sees raw file offsets.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::constants::*;
use crate::error::{AdfError, Result};

/// Block-addressed read-only storage.
pub trait BlockDevice: Send + Sync {
    /// Total number of blocks.
    fn block_count(&self) -> u32;

    /// Read block `index` into `buf`.
    ///
    /// Fails with [`AdfError::OutOfRange`] when `index >= block_count()` and
    /// with [`AdfError::Io`] when the backing storage cannot supply the bytes.
    fn read_block(&self, index: u32, buf: &mut [u8; BLOCK_SIZE]) -> Result<()>;

    /// Device block size in bytes.
    fn block_size(&self) -> usize {
        BLOCK_SIZE
    }

    /// Read block `index` into a fresh buffer.
    fn block(&self, index: u32) -> Result<[u8; BLOCK_SIZE]> {
        let mut buf = [0u8; BLOCK_SIZE];
        self.read_block(index, &mut buf)?;
        Ok(buf)
    }
}

impl<D: BlockDevice + ?Sized> BlockDevice for &D {
    fn block_count(&self) -> u32 {
        (**self).block_count()
    }

    fn read_block(&self, index: u32, buf: &mut [u8; BLOCK_SIZE]) -> Result<()> {
        (**self).read_block(index, buf)
    }
}

impl<D: BlockDevice + ?Sized> BlockDevice for Arc<D> {
    fn block_count(&self) -> u32 {
        (**self).block_count()
    }

    fn read_block(&self, index: u32, buf: &mut [u8; BLOCK_SIZE]) -> Result<()> {
        (**self).read_block(index, buf)
    }
}

impl<D: BlockDevice + ?Sized> BlockDevice for Box<D> {
    fn block_count(&self) -> u32 {
        (**self).block_count()
    }

    fn read_block(&self, index: u32, buf: &mut [u8; BLOCK_SIZE]) -> Result<()> {
        (**self).read_block(index, buf)
    }
}

#[inline]
fn check_range(index: u32, count: u32) -> Result<()> {
    if index >= count {
        return Err(AdfError::OutOfRange {
            index: u64::from(index),
            limit: u64::from(count),
        });
    }
    Ok(())
}

/// Image held in memory.
#[derive(Debug, Clone)]
pub struct MemoryDevice {
    data: Vec<u8>,
}

impl MemoryDevice {
    /// Wrap image bytes; a trailing partial block is not addressable.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Zero-filled image of `blocks` blocks.
    pub fn zeroed(blocks: u32) -> Self {
        Self::new(vec![0u8; blocks as usize * BLOCK_SIZE])
    }

    /// Raw image bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mutable raw image bytes, for building fixtures.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Mutable view of one block.
    pub fn block_mut(&mut self, index: u32) -> &mut [u8] {
        let start = index as usize * BLOCK_SIZE;
        &mut self.data[start..start + BLOCK_SIZE]
    }
}

impl BlockDevice for MemoryDevice {
    fn block_count(&self) -> u32 {
        u32::try_from(self.data.len() / BLOCK_SIZE).unwrap_or(u32::MAX)
    }

    fn read_block(&self, index: u32, buf: &mut [u8; BLOCK_SIZE]) -> Result<()> {
        check_range(index, self.block_count())?;
        let start = index as usize * BLOCK_SIZE;
        buf.copy_from_slice(&self.data[start..start + BLOCK_SIZE]);
        Ok(())
    }
}

/// File-backed image.
///
/// `File` has a single shared cursor, so each seek+read pair runs under a
/// mutex. This is the only synchronization point in the read path.
#[derive(Debug)]
pub struct ImageFile {
    file: Mutex<File>,
    path: PathBuf,
    len: u64,
}

impl ImageFile {
    /// Open an image file read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
            len,
        })
    }

    /// Image length in bytes.
    pub const fn len_bytes(&self) -> u64 {
        self.len
    }

    /// Path the image was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BlockDevice for ImageFile {
    /// A trailing partial block counts; reading it reports the truncation.
    fn block_count(&self) -> u32 {
        u32::try_from(self.len.div_ceil(BLOCK_SIZE as u64)).unwrap_or(u32::MAX)
    }

    fn read_block(&self, index: u32, buf: &mut [u8; BLOCK_SIZE]) -> Result<()> {
        check_range(index, self.block_count())?;
        trace!(block = index, "read image block");
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(u64::from(index) * BLOCK_SIZE as u64))?;
        file.read_exact(buf)?;
        Ok(())
    }
}

/// Disk geometry in cylinders, heads and sectors per track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Number of cylinders.
    pub cylinders: u32,
    /// Number of heads (surfaces).
    pub heads: u32,
    /// Sectors per track.
    pub sectors: u32,
}

/// Physical location of a logical block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chs {
    /// Cylinder.
    pub cylinder: u32,
    /// Head.
    pub head: u32,
    /// Sector within the track.
    pub sector: u32,
}

impl Geometry {
    /// Double-density floppy (880KB).
    pub const DD: Self = Self::new(CYLINDERS, HEADS, SECTORS_PER_TRACK_DD);

    /// High-density floppy (1.76MB).
    pub const HD: Self = Self::new(CYLINDERS, HEADS, SECTORS_PER_TRACK_HD);

    /// Create a geometry.
    pub const fn new(cylinders: u32, heads: u32, sectors: u32) -> Self {
        Self {
            cylinders,
            heads,
            sectors,
        }
    }

    /// Total number of blocks, or `None` if it does not fit in 32 bits.
    pub const fn block_count(&self) -> Option<u32> {
        match self.cylinders.checked_mul(self.heads) {
            Some(tracks) => tracks.checked_mul(self.sectors),
            None => None,
        }
    }

    /// Guess the geometry from an image length.
    ///
    /// Floppy sizes get floppy geometry; anything else is treated as one
    /// block per track. A trailing partial block is ignored.
    pub fn for_image_size(bytes: u64) -> Result<Self> {
        let blocks = bytes / BLOCK_SIZE as u64;
        if blocks == u64::from(FLOPPY_DD_SECTORS) {
            return Ok(Self::DD);
        }
        if blocks == u64::from(FLOPPY_HD_SECTORS) {
            return Ok(Self::HD);
        }
        if blocks < u64::from(RESERVED_BLOCKS) + 1 {
            return Err(AdfError::UnsupportedFilesystem(format!(
                "image of {bytes} bytes is too small"
            )));
        }
        let blocks = u32::try_from(blocks).map_err(|_| {
            AdfError::UnsupportedFilesystem(format!("image of {bytes} bytes is too large"))
        })?;
        Ok(Self::new(blocks, 1, 1))
    }

    /// Cylinder, head and sector of a logical block.
    pub const fn locate(&self, block: u32) -> Chs {
        Chs {
            cylinder: block / (self.heads * self.sectors),
            head: (block / self.sectors) % self.heads,
            sector: block % self.sectors,
        }
    }
}

/// Order in which tracks are stored in the image file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrackLayout {
    /// Cylinder-major: c0h0, c0h1, c1h0, ... (plain ADF).
    #[default]
    Interleaved,
    /// Side-split: every head-0 track first, then every head-1 track.
    SideSplit,
}

/// Linear block space over a device whose tracks follow a [`TrackLayout`].
#[derive(Debug)]
pub struct GeometryDevice<D> {
    inner: D,
    geometry: Geometry,
    layout: TrackLayout,
    blocks: u32,
}

impl<D: BlockDevice> GeometryDevice<D> {
    /// Map `inner` through `geometry` and `layout`.
    pub fn new(inner: D, geometry: Geometry, layout: TrackLayout) -> Result<Self> {
        let blocks = match geometry.block_count() {
            Some(blocks) if blocks > 0 => blocks,
            _ => {
                return Err(AdfError::UnsupportedFilesystem(format!(
                    "geometry {}/{}/{} has no usable block count",
                    geometry.cylinders, geometry.heads, geometry.sectors
                )));
            }
        };
        Ok(Self {
            inner,
            geometry,
            layout,
            blocks,
        })
    }

    /// The declared geometry.
    pub const fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// The track layout.
    pub const fn layout(&self) -> TrackLayout {
        self.layout
    }

    /// Physical block on the inner device holding logical block `block`.
    pub const fn physical_block(&self, block: u32) -> u32 {
        let chs = self.geometry.locate(block);
        let track = match self.layout {
            TrackLayout::Interleaved => chs.cylinder * self.geometry.heads + chs.head,
            TrackLayout::SideSplit => chs.head * self.geometry.cylinders + chs.cylinder,
        };
        track * self.geometry.sectors + chs.sector
    }

    /// Unwrap the inner device.
    pub fn into_inner(self) -> D {
        self.inner
    }
}

impl<D: BlockDevice> BlockDevice for GeometryDevice<D> {
    fn block_count(&self) -> u32 {
        self.blocks
    }

    fn read_block(&self, index: u32, buf: &mut [u8; BLOCK_SIZE]) -> Result<()> {
        check_range(index, self.block_count())?;
        let physical = self.physical_block(index);
        // A declared block missing from the image means the image is short.
        self.inner.read_block(physical, buf).map_err(|err| match err {
            AdfError::OutOfRange { limit, .. } => AdfError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("image truncated: block {physical} beyond {limit} blocks"),
            )),
            other => other,
        })
    }
}

/// Window of `count` blocks starting at `start` on another device.
#[derive(Debug)]
pub struct PartitionDevice<D> {
    inner: D,
    start: u32,
    count: u32,
}

impl<D: BlockDevice> PartitionDevice<D> {
    /// Create a window; fails if it does not fit on `inner`.
    pub fn new(inner: D, start: u32, count: u32) -> Result<Self> {
        let end = u64::from(start) + u64::from(count);
        if count == 0 || end > u64::from(inner.block_count()) {
            return Err(AdfError::OutOfRange {
                index: end,
                limit: u64::from(inner.block_count()),
            });
        }
        Ok(Self {
            inner,
            start,
            count,
        })
    }

    /// First block of the window on the inner device.
    pub const fn start(&self) -> u32 {
        self.start
    }
}

impl<D: BlockDevice> BlockDevice for PartitionDevice<D> {
    fn block_count(&self) -> u32 {
        self.count
    }

    fn read_block(&self, index: u32, buf: &mut [u8; BLOCK_SIZE]) -> Result<()> {
        check_range(index, self.count)?;
        self.inner.read_block(self.start + index, buf)
    }
}
