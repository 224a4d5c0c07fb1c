//! Integration tests for adf-fs with images built in memory.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::OnceLock;

use adf_fs::*;
use proptest::prelude::*;

const ROOT: u32 = 880;
const BITMAP: u32 = 881;

/// Helper to write a big-endian u32.
fn write_u32_be(buf: &mut [u8], offset: usize, val: u32) {
    buf[offset..offset + 4].copy_from_slice(&val.to_be_bytes());
}

/// Helper to write a big-endian i32.
fn write_i32_be(buf: &mut [u8], offset: usize, val: i32) {
    buf[offset..offset + 4].copy_from_slice(&val.to_be_bytes());
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

/// Calculate and set the normal checksum for a block.
fn set_checksum(buf: &mut [u8; 512], checksum_offset: usize) {
    let mut sum: u32 = 0;
    for i in 0..(512 / 4) {
        if i != checksum_offset / 4 {
            sum = sum.wrapping_add(read_u32(buf, i * 4));
        }
    }
    write_u32_be(buf, checksum_offset, sum.wrapping_neg());
}

fn write_name(buf: &mut [u8; 512], name: &[u8]) {
    buf[0x1B0] = name.len() as u8;
    buf[0x1B1..0x1B1 + name.len()].copy_from_slice(name);
}

/// Create an entry header with its hash table left empty.
fn create_header(name: &[u8], parent: u32, own: u32, sec_type: i32) -> [u8; 512] {
    let mut buf = [0u8; 512];
    write_i32_be(&mut buf, 0, 2);
    write_u32_be(&mut buf, 4, own);
    write_name(&mut buf, name);
    // 1990-01-01 12:00.
    write_i32_be(&mut buf, 0x1A4, 4383);
    write_i32_be(&mut buf, 0x1A8, 720);
    write_u32_be(&mut buf, 0x1F4, parent);
    write_i32_be(&mut buf, 0x1FC, sec_type);
    buf
}

/// Create a valid OFS data block.
fn create_ofs_data_block(header_key: u32, seq_num: u32, data: &[u8], next: u32) -> [u8; 512] {
    let mut buf = [0u8; 512];
    write_i32_be(&mut buf, 0, 8);
    write_u32_be(&mut buf, 4, header_key);
    write_u32_be(&mut buf, 8, seq_num);
    write_u32_be(&mut buf, 12, data.len() as u32);
    write_u32_be(&mut buf, 16, next);
    buf[24..24 + data.len()].copy_from_slice(data);
    set_checksum(&mut buf, 20);
    buf
}

/// Create a file extension block.
fn create_file_ext_block(own: u32, parent: u32, data_blocks: &[u32], extension: u32) -> [u8; 512] {
    let mut buf = [0u8; 512];
    write_i32_be(&mut buf, 0, 16);
    write_u32_be(&mut buf, 4, own);
    write_i32_be(&mut buf, 8, data_blocks.len() as i32);
    for (i, &block) in data_blocks.iter().enumerate() {
        write_u32_be(&mut buf, 24 + (71 - i) * 4, block);
    }
    write_u32_be(&mut buf, 0x1F4, parent);
    write_u32_be(&mut buf, 0x1F8, extension);
    write_i32_be(&mut buf, 0x1FC, -3);
    set_checksum(&mut buf, 20);
    buf
}

/// Builds a DD floppy image block by block.
///
/// Headers stay unsealed until [`DiskBuilder::build`] so entries can be
/// chained into their parent's hash table in any order.
struct DiskBuilder {
    flags: u8,
    blocks: u32,
    device: MemoryDevice,
    headers: BTreeMap<u32, [u8; 512]>,
    used: BTreeSet<u32>,
    next_free: u32,
}

impl DiskBuilder {
    fn new(flags: u8) -> Self {
        Self::with_blocks(flags, FLOPPY_DD_SECTORS)
    }

    fn with_blocks(flags: u8, blocks: u32) -> Self {
        let mut root = [0u8; 512];
        write_i32_be(&mut root, 0, 2);
        write_i32_be(&mut root, 12, 72);
        write_i32_be(&mut root, 0x138, -1);
        write_u32_be(&mut root, 0x13C, BITMAP);
        write_name(&mut root, b"TestDisk");
        write_i32_be(&mut root, 0x1A4, 4383);
        write_i32_be(&mut root, 0x1D8, 4384);
        write_i32_be(&mut root, 0x1E4, 4000);
        write_i32_be(&mut root, 508, 1);

        let mut headers = BTreeMap::new();
        headers.insert(ROOT, root);
        Self {
            flags,
            blocks,
            device: MemoryDevice::zeroed(blocks),
            headers,
            used: BTreeSet::from([0, 1, ROOT, BITMAP]),
            next_free: 2,
        }
    }

    fn intl(&self) -> bool {
        self.flags & (DOSFS_INTL | DOSFS_DIRCACHE) != 0
    }

    fn capacity(&self) -> usize {
        if self.flags & DOSFS_FFS != 0 { 512 } else { 488 }
    }

    fn alloc(&mut self) -> u32 {
        while self.used.contains(&self.next_free) {
            self.next_free += 1;
        }
        let block = self.next_free;
        self.used.insert(block);
        block
    }

    fn put(&mut self, block: u32, data: &[u8; 512]) {
        self.device.block_mut(block).copy_from_slice(data);
    }

    /// Insert `block` at the head of its hash chain in `parent`.
    fn link(&mut self, parent: u32, name: &[u8], block: u32) {
        let slot = 24 + hash_name(name, self.intl()) * 4;
        let parent_buf = self.headers.get_mut(&parent).expect("parent header");
        let previous = read_u32(parent_buf, slot);
        write_u32_be(parent_buf, slot, block);
        let entry = self.headers.get_mut(&block).expect("entry header");
        write_u32_be(entry, 0x1F0, previous);
    }

    fn add_dir(&mut self, parent: u32, name: &str) -> u32 {
        let name = string_to_latin1(name).unwrap();
        let block = self.alloc();
        self.headers.insert(block, create_header(&name, parent, block, ST_DIR));
        self.link(parent, &name, block);
        block
    }

    fn add_file(&mut self, parent: u32, name: &str, data: &[u8]) -> u32 {
        let name = string_to_latin1(name).unwrap();
        let cap = self.capacity();
        let header = self.alloc();
        let data_blocks: Vec<u32> = (0..data.len().div_ceil(cap)).map(|_| self.alloc()).collect();

        for (i, chunk) in data.chunks(cap).enumerate() {
            let block = data_blocks[i];
            if cap == 488 {
                let next = data_blocks.get(i + 1).copied().unwrap_or(0);
                let buf = create_ofs_data_block(header, i as u32 + 1, chunk, next);
                self.put(block, &buf);
            } else {
                self.device.block_mut(block)[..chunk.len()].copy_from_slice(chunk);
            }
        }

        let tables: Vec<&[u32]> = data_blocks.chunks(72).collect();
        let ext_blocks: Vec<u32> = (1..tables.len()).map(|_| self.alloc()).collect();
        for (k, &ext) in ext_blocks.iter().enumerate() {
            let next = ext_blocks.get(k + 1).copied().unwrap_or(0);
            let buf = create_file_ext_block(ext, header, tables[k + 1], next);
            self.put(ext, &buf);
        }

        let mut buf = create_header(&name, parent, header, ST_FILE);
        if let Some(first) = tables.first() {
            write_i32_be(&mut buf, 8, first.len() as i32);
            for (i, &block) in first.iter().enumerate() {
                write_u32_be(&mut buf, 24 + (71 - i) * 4, block);
            }
            write_u32_be(&mut buf, 16, first[0]);
        }
        write_u32_be(&mut buf, 0x144, data.len() as u32);
        write_u32_be(&mut buf, 0x1F8, ext_blocks.first().copied().unwrap_or(0));
        self.headers.insert(header, buf);
        self.link(parent, &name, header);
        header
    }

    fn add_hard_link(&mut self, parent: u32, name: &str, target: u32, dir: bool) -> u32 {
        let name = string_to_latin1(name).unwrap();
        let block = self.alloc();
        let sec_type = if dir { ST_LDIR } else { ST_LFILE };
        let mut buf = create_header(&name, parent, block, sec_type);
        write_u32_be(&mut buf, 0x1D4, target);
        self.headers.insert(block, buf);
        self.link(parent, &name, block);
        block
    }

    fn add_soft_link(&mut self, parent: u32, name: &str, target: &str) -> u32 {
        let name = string_to_latin1(name).unwrap();
        let block = self.alloc();
        let mut buf = create_header(&name, parent, block, ST_LSOFT);
        let target = string_to_latin1(target).unwrap();
        buf[24..24 + target.len()].copy_from_slice(&target);
        self.headers.insert(block, buf);
        self.link(parent, &name, block);
        block
    }

    fn set_protection(&mut self, block: u32, bits: u32) {
        let buf = self.headers.get_mut(&block).expect("header");
        write_u32_be(buf, 0x140, bits);
    }

    fn set_comment(&mut self, block: u32, comment: &[u8]) {
        let buf = self.headers.get_mut(&block).expect("header");
        buf[0x148] = comment.len() as u8;
        buf[0x149..0x149 + comment.len()].copy_from_slice(comment);
    }

    fn build(mut self) -> MemoryDevice {
        let boot = self.device.block_mut(0);
        boot[..3].copy_from_slice(b"DOS");
        boot[3] = self.flags;
        write_u32_be(boot, 8, ROOT);

        let mut bitmap = [0u8; 512];
        for block in 2..self.blocks {
            if !self.used.contains(&block) {
                let bit = (block - 2) as usize;
                let offset = 4 + (bit / 32) * 4;
                let word = read_u32(&bitmap, offset) | (1 << (bit % 32));
                write_u32_be(&mut bitmap, offset, word);
            }
        }
        let sum = bitmap_sum(&bitmap);
        write_u32_be(&mut bitmap, 0, sum);
        self.put(BITMAP, &bitmap);

        for (block, mut buf) in std::mem::take(&mut self.headers) {
            set_checksum(&mut buf, 20);
            self.put(block, &buf);
        }
        self.device
    }
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add((i / 251) as u8) ^ seed)
        .collect()
}

/// Spans one extension block on FFS.
const BIG_LEN: usize = 100 * 512 + 17;

/// Root holds `subdir` and `bigfile.bin`; `subdir` holds `small.txt`.
fn minimal_image(flags: u8) -> MemoryDevice {
    let mut disk = DiskBuilder::new(flags);
    let subdir = disk.add_dir(ROOT, "subdir");
    disk.add_file(subdir, "small.txt", b"hello, amiga\n");
    disk.add_file(ROOT, "bigfile.bin", &pattern(BIG_LEN, 0));
    disk.build()
}

fn mount(device: MemoryDevice) -> AdfFs {
    AdfFs::from_device(device, &MountOptions::default()).unwrap()
}

fn shared_ffs() -> &'static AdfFs {
    static FS: OnceLock<AdfFs> = OnceLock::new();
    FS.get_or_init(|| mount(minimal_image(DOSFS_FFS)))
}

#[test]
fn minimal_image_round_trip() {
    for flags in [0, DOSFS_FFS] {
        let fs = mount(minimal_image(flags));
        assert_eq!(fs.list_directory("/").unwrap(), ["bigfile.bin", "subdir"]);
        assert_eq!(
            fs.read_file("/bigfile.bin", 0, BIG_LEN + 100).unwrap(),
            pattern(BIG_LEN, 0)
        );
        assert_eq!(
            fs.get_attributes("/subdir").unwrap().kind,
            FileKind::Directory
        );
        assert_eq!(fs.list_directory("/subdir").unwrap(), ["small.txt"]);
        assert_eq!(
            fs.read_file("/subdir/small.txt", 0, 4096).unwrap(),
            b"hello, amiga\n"
        );
    }
}

#[test]
fn volume_metadata() {
    let volume = Volume::open(minimal_image(DOSFS_FFS)).unwrap();
    assert_eq!(volume.fs_type(), FsType::Ffs);
    assert_eq!(volume.name(), b"TestDisk");
    assert_eq!(volume.name_string(), "TestDisk");
    assert_eq!(volume.root_block(), ROOT);
    assert_eq!(volume.total_blocks(), 1760);
    assert!(volume.bitmap_valid());
    assert!(!volume.is_intl());
    assert_eq!(volume.bitmap_blocks(), [BITMAP]);
    assert_eq!(volume.dos_type().to_string(), "DOS\\1 (FFS)");
}

#[test]
fn root_found_through_boot_pointer() {
    let device = DiskBuilder::with_blocks(DOSFS_FFS, 1761).build();
    // Computed root for 1761 blocks is 881, the bitmap; the boot pointer says 880.
    let volume = Volume::open(&device).unwrap();
    assert_eq!(volume.root_block(), ROOT);
    assert_eq!(volume.total_blocks(), 1761);
}

#[test]
fn corrupt_root_is_corrupt_volume() {
    let mut device = minimal_image(DOSFS_FFS);
    device.block_mut(ROOT)[0x1B1] ^= 0x20;
    let err = AdfFs::from_device(device, &MountOptions::default()).unwrap_err();
    assert!(matches!(err, AdfError::CorruptVolume(_)));
    assert_eq!(err.errno(), libc::EIO);
}

#[test]
fn unsupported_signatures() {
    for signature in [b"KICK", b"NDOS", b"DOS\x06", b"DOS\x07"] {
        let mut device = minimal_image(DOSFS_FFS);
        device.block_mut(0)[..4].copy_from_slice(signature);
        let err = AdfFs::from_device(device, &MountOptions::default()).unwrap_err();
        assert!(matches!(err, AdfError::UnsupportedFilesystem(_)), "{err}");
    }
}

#[test]
fn every_listed_name_looks_up() {
    let mut disk = DiskBuilder::new(DOSFS_FFS);
    let dirs: Vec<u32> = (0..5).map(|i| disk.add_dir(ROOT, &format!("dir{i}"))).collect();
    for i in 0..200 {
        let parent = dirs[i % dirs.len()];
        disk.add_file(parent, &format!("File_{i:03}"), &[i as u8; 3]);
    }
    let volume = Volume::open(disk.build()).unwrap();

    for dir in volume.list_entries(ROOT).unwrap() {
        assert!(dir.is_dir());
        let children = volume.list_entries(dir.block).unwrap();
        assert_eq!(children.len(), 40);
        for child in children {
            let found = volume.lookup(dir.block, child.name()).unwrap();
            assert_eq!(found.block, child.block);
            assert_eq!(found.entry_type, child.entry_type);
            assert_eq!(found.parent, dir.block);
        }
    }
}

#[test]
fn listing_keeps_hash_order_when_unsorted() {
    let mut disk = DiskBuilder::new(DOSFS_FFS);
    for name in ["zeta", "Alpha", "mid", "beta"] {
        disk.add_file(ROOT, name, b"x");
    }
    let device = disk.build();
    let volume = Volume::open(device.clone()).unwrap();
    let raw: Vec<String> = volume
        .list_entries(ROOT)
        .unwrap()
        .iter()
        .map(DirEntry::name_string)
        .collect();

    let options = MountOptions {
        sort_listings: false,
        ..MountOptions::default()
    };
    let fs = AdfFs::from_device(device.clone(), &options).unwrap();
    assert_eq!(fs.list_directory("/").unwrap(), raw);

    let sorted = mount(device).list_directory("/").unwrap();
    assert_eq!(sorted, ["Alpha", "beta", "mid", "zeta"]);
}

#[test]
fn lookup_is_case_insensitive() {
    let mut disk = DiskBuilder::new(DOSFS_FFS);
    disk.add_file(ROOT, "Foo", b"foo data");
    let fs = mount(disk.build());
    for path in ["/Foo", "/FOO", "/foo", "foo", "//./foo"] {
        assert_eq!(fs.read_file(path, 0, 100).unwrap(), b"foo data", "{path}");
    }
}

#[test]
fn intl_lookup_folds_latin1() {
    let mut disk = DiskBuilder::new(DOSFS_FFS | DOSFS_INTL);
    disk.add_file(ROOT, "café", b"latte");
    let fs = mount(disk.build());
    assert_eq!(fs.read_file("/CAFÉ", 0, 10).unwrap(), b"latte");
    assert_eq!(fs.list_directory("/").unwrap(), ["café"]);
    assert!(matches!(
        fs.get_attributes("/日本"),
        Err(AdfError::NotFound(_))
    ));
}

#[test]
fn dircache_uses_intl_rules() {
    let mut disk = DiskBuilder::new(DOSFS_FFS | DOSFS_DIRCACHE);
    disk.add_file(ROOT, "über", b"x");
    let fs = mount(disk.build());
    assert!(fs.volume().unwrap().is_intl());
    assert_eq!(fs.read_file("/ÜBER", 0, 1).unwrap(), b"x");
}

#[test]
fn path_errors_map_to_errno() {
    let fs = shared_ffs();
    let cases = [
        (fs.get_attributes("/missing").unwrap_err(), libc::ENOENT),
        (
            fs.list_directory("/bigfile.bin").unwrap_err(),
            libc::ENOTDIR,
        ),
        (
            fs.get_attributes("/bigfile.bin/inner").unwrap_err(),
            libc::ENOTDIR,
        ),
        (fs.read_file("/subdir", 0, 1).unwrap_err(), libc::EISDIR),
        (
            fs.read_file("/bigfile.bin", BIG_LEN as u64 + 1, 1)
                .unwrap_err(),
            libc::EINVAL,
        ),
        (fs.read_link("/bigfile.bin").unwrap_err(), libc::EINVAL),
        (
            fs.get_attributes(&format!("/{}", "n".repeat(31)))
                .unwrap_err(),
            libc::ENOENT,
        ),
    ];
    for (err, errno) in cases {
        assert_eq!(err.errno(), errno, "{err}");
    }
}

#[test]
fn reads_clamp_at_end_of_file() {
    let fs = shared_ffs();
    let size = BIG_LEN as u64;
    assert!(fs.read_file("/bigfile.bin", size, 10).unwrap().is_empty());
    assert_eq!(fs.read_file("/bigfile.bin", size - 3, 10).unwrap().len(), 3);
    assert!(fs.read_file("/bigfile.bin", 5, 0).unwrap().is_empty());
}

fn extension_boundary_sizes(flags: u8, cap: usize) {
    let sizes = [72 * cap - 1, 72 * cap, 72 * cap + 1];
    let mut disk = DiskBuilder::new(flags);
    for (i, &len) in sizes.iter().enumerate() {
        disk.add_file(ROOT, &format!("f{i}"), &pattern(len, i as u8));
    }
    let volume = Volume::open(disk.build()).unwrap();

    for (i, &len) in sizes.iter().enumerate() {
        let entry = volume.resolve_path(&format!("/f{i}")).unwrap();
        let handle = volume.open_file(&entry).unwrap();
        assert_eq!(handle.size() as usize, len);
        let blocks = volume.data_blocks(&handle).unwrap();
        assert_eq!(blocks.len(), len.div_ceil(cap));
        assert_eq!(volume.read(&handle, 0, len).unwrap(), pattern(len, i as u8));
        let tail = volume.read(&handle, len as u64 - 1, 10).unwrap();
        assert_eq!(tail, [pattern(len, i as u8)[len - 1]]);
    }
}

#[test]
fn ffs_extension_block_boundaries() {
    extension_boundary_sizes(DOSFS_FFS, 512);
}

#[test]
fn ofs_extension_block_boundaries() {
    extension_boundary_sizes(0, 488);
}

#[test]
fn ofs_corruption_reports_file_offset() {
    let mut disk = DiskBuilder::new(0);
    let header = disk.add_file(ROOT, "data", &pattern(3 * 488, 1));
    let mut device = disk.build();
    // Second data block follows the header.
    device.block_mut(header + 2)[100] ^= 0xFF;

    let fs = mount(device);
    assert_eq!(fs.read_file("/data", 0, 488).unwrap(), pattern(488, 1));
    let err = fs.read_file("/data", 0, 3 * 488).unwrap_err();
    assert!(matches!(err, AdfError::CorruptFile { offset: 488, .. }), "{err}");
    assert_eq!(err.errno(), libc::EIO);
}

#[test]
fn ofs_sequence_mismatch_is_corrupt() {
    let mut disk = DiskBuilder::new(0);
    let header = disk.add_file(ROOT, "data", &pattern(2 * 488, 2));
    let mut device = disk.build();
    let mut block: [u8; 512] = device.block_mut(header + 2).try_into().unwrap();
    write_u32_be(&mut block, 8, 7);
    set_checksum(&mut block, 20);
    device.block_mut(header + 2).copy_from_slice(&block);

    let fs = mount(device);
    assert!(matches!(
        fs.read_file("/data", 500, 10),
        Err(AdfError::CorruptFile { offset: 488, .. })
    ));
}

#[test]
fn bad_extension_pointer_is_corrupt_file() {
    let mut disk = DiskBuilder::new(DOSFS_FFS);
    let header = disk.add_file(ROOT, "big", &pattern(80 * 512, 3));
    let mut device = disk.build();
    let mut buf: [u8; 512] = device.block_mut(header).try_into().unwrap();
    write_u32_be(&mut buf, 0x1F8, 5000);
    set_checksum(&mut buf, 20);
    device.block_mut(header).copy_from_slice(&buf);

    let fs = mount(device);
    assert!(fs.read_file("/big", 0, 72 * 512).is_ok());
    assert!(matches!(
        fs.read_file("/big", 72 * 512, 10),
        Err(AdfError::CorruptFile { offset, .. }) if offset == 72 * 512
    ));
}

#[test]
fn hash_chain_loop_is_detected() {
    let mut disk = DiskBuilder::new(DOSFS_FFS);
    let file = disk.add_file(ROOT, "loop", b"x");
    let mut device = disk.build();
    let mut buf: [u8; 512] = device.block_mut(file).try_into().unwrap();
    write_u32_be(&mut buf, 0x1F0, file);
    set_checksum(&mut buf, 20);
    device.block_mut(file).copy_from_slice(&buf);

    let volume = Volume::open(device).unwrap();
    assert!(matches!(
        volume.list_entries(ROOT),
        Err(AdfError::CorruptBlock { .. })
    ));
    assert!(matches!(
        volume.lookup(ROOT, b"other"),
        Err(AdfError::NotFound(_) | AdfError::CorruptBlock { .. })
    ));
}

#[test]
fn hard_and_soft_links() {
    let mut disk = DiskBuilder::new(DOSFS_FFS);
    let dir = disk.add_dir(ROOT, "Devs");
    let file = disk.add_file(dir, "keymap", b"usa1");
    disk.add_hard_link(ROOT, "keymap.lnk", file, false);
    disk.add_hard_link(ROOT, "devs.lnk", dir, true);
    disk.add_soft_link(ROOT, "startup", ":s/startup-sequence");
    disk.add_soft_link(ROOT, "rel", "Devs/keymap");
    let fs = mount(disk.build());

    assert_eq!(fs.read_file("/keymap.lnk", 0, 10).unwrap(), b"usa1");
    let attrs = fs.get_attributes("/keymap.lnk").unwrap();
    assert_eq!(attrs.kind, FileKind::File);
    assert_eq!(attrs.size, 4);
    assert_eq!(attrs.block, file);

    assert_eq!(fs.list_directory("/devs.lnk").unwrap(), ["keymap"]);
    assert_eq!(fs.read_file("/devs.lnk/keymap", 0, 10).unwrap(), b"usa1");
    assert_eq!(
        fs.get_attributes("/devs.lnk").unwrap().kind,
        FileKind::Directory
    );

    assert_eq!(fs.read_link("/startup").unwrap(), "/s/startup-sequence");
    assert_eq!(fs.read_link("/rel").unwrap(), "Devs/keymap");
    let link = fs.get_attributes("/startup").unwrap();
    assert_eq!(link.kind, FileKind::Symlink);
    assert_eq!(link.size, ":s/startup-sequence".len() as u64);
    assert!(matches!(
        fs.read_file("/startup", 0, 1),
        Err(AdfError::NotFound(_))
    ));
}

#[test]
fn soft_link_size_matches_host_target() {
    let mut disk = DiskBuilder::new(DOSFS_FFS);
    disk.add_soft_link(ROOT, "accent", "é");
    let fs = mount(disk.build());

    let target = fs.read_link("/accent").unwrap();
    assert_eq!(target, "é");
    assert_eq!(fs.get_attributes("/accent").unwrap().size, target.len() as u64);
}

#[test]
fn pointers_past_the_volume_are_corruption() {
    let mut disk = DiskBuilder::new(DOSFS_FFS);
    disk.add_hard_link(ROOT, "lnk", 9999, false);
    let root = disk.headers.get_mut(&ROOT).unwrap();
    write_u32_be(root, 24 + 5 * 4, 5000);
    let fs = mount(disk.build());

    let err = fs.list_directory("/").unwrap_err();
    assert!(
        matches!(err, AdfError::CorruptBlock { block: ROOT, .. }),
        "{err}"
    );
    assert_eq!(err.errno(), libc::EIO);

    let err = fs.get_attributes("/lnk").unwrap_err();
    assert!(err.is_corruption(), "{err}");
    assert_eq!(err.errno(), libc::EIO);
}

#[test]
fn attributes_follow_protection_bits() {
    let mut disk = DiskBuilder::new(DOSFS_FFS);
    let plain = disk.add_file(ROOT, "plain", b"a");
    let locked = disk.add_file(ROOT, "locked", b"b");
    let shared = disk.add_file(ROOT, "shared", b"c");
    disk.set_protection(locked, ACC_READ | ACC_EXECUTE | ACC_WRITE | ACC_DELETE);
    disk.set_protection(shared, ACC_GRP_READ | ACC_OTR_READ | ACC_EXECUTE);
    disk.set_comment(plain, b"a comment");
    let fs = mount(disk.build());

    let attrs = fs.get_attributes("/plain").unwrap();
    assert_eq!(attrs.permissions, 0o500);
    assert_eq!(attrs.comment, "a comment");
    assert_eq!(attrs.size, 1);
    assert_eq!(
        attrs.mtime,
        std::time::UNIX_EPOCH + std::time::Duration::from_secs((2922 + 4383) * 86_400 + 720 * 60)
    );
    assert_eq!(fs.get_attributes("/locked").unwrap().permissions, 0);
    assert_eq!(fs.get_attributes("/shared").unwrap().permissions, 0o444);

    let root = fs.get_attributes("/").unwrap();
    assert_eq!(root.kind, FileKind::Directory);
    assert_eq!(root.permissions, 0o500);
    assert_eq!(root.block, ROOT);
}

#[test]
fn free_blocks_from_bitmap() {
    let fs = shared_ffs();
    let stats = fs.stat_volume().unwrap();
    assert_eq!(stats.name, "TestDisk");
    assert_eq!(stats.block_size, 512);
    assert_eq!(stats.total_blocks, 1760);
    // root, bitmap, subdir, small.txt (header + data), bigfile (header + 101 + ext).
    let used = 2 + 1 + 2 + 1 + 101 + 1;
    assert_eq!(stats.free_blocks, Some(1758 - used));
}

#[test]
fn invalid_bitmap_gives_unknown_free_space() {
    let mut device = minimal_image(DOSFS_FFS);
    let mut root: [u8; 512] = device.block_mut(ROOT).try_into().unwrap();
    write_i32_be(&mut root, 0x138, 0);
    set_checksum(&mut root, 20);
    device.block_mut(ROOT).copy_from_slice(&root);
    assert_eq!(mount(device).stat_volume().unwrap().free_blocks, None);
}

#[test]
fn corrupt_bitmap_is_reported() {
    let mut device = minimal_image(DOSFS_FFS);
    device.block_mut(BITMAP)[40] ^= 0x01;
    assert!(matches!(
        mount(device).stat_volume(),
        Err(AdfError::CorruptBlock { block: BITMAP, .. })
    ));
}

#[test]
fn side_split_images_mount() {
    let logical = minimal_image(DOSFS_FFS);
    let blocks = Geometry::DD.block_count().unwrap();
    let mut xdf = MemoryDevice::zeroed(blocks);
    for block in 0..blocks {
        let cylinder = block / 22;
        let head = (block / 11) % 2;
        let sector = block % 11;
        let physical = (head * 80 + cylinder) * 11 + sector;
        xdf.block_mut(physical)
            .copy_from_slice(&logical.as_bytes()[block as usize * 512..][..512]);
    }

    assert!(AdfFs::from_device(xdf.clone(), &MountOptions::default()).is_err());
    let fs = AdfFs::from_device(xdf, &MountOptions::side_split()).unwrap();
    assert_eq!(fs.list_directory("/").unwrap(), ["bigfile.bin", "subdir"]);
    assert_eq!(
        fs.read_file("/bigfile.bin", 0, BIG_LEN).unwrap(),
        pattern(BIG_LEN, 0)
    );
}

#[test]
fn explicit_geometry_on_short_image_is_io() {
    let device = MemoryDevice::new(minimal_image(DOSFS_FFS).as_bytes()[..800 * 512].to_vec());
    let options = MountOptions {
        geometry: Some(Geometry::DD),
        ..MountOptions::default()
    };
    let err = AdfFs::from_device(device, &options).unwrap_err();
    assert!(matches!(err, AdfError::Io(_)), "{err}");
}

fn put_rdb(buf: &mut [u8], offset: usize, val: u32) {
    write_u32_be(buf, offset, val);
}

fn seal_rdb(buf: &mut [u8]) {
    let summed = read_u32(buf, 4) as usize;
    let mut sum = 0u32;
    for i in 0..summed {
        if i != 2 {
            sum = sum.wrapping_add(read_u32(buf, i * 4));
        }
    }
    put_rdb(buf, 8, sum.wrapping_neg());
}

#[test]
fn rdb_partition_mounts() {
    let floppy = minimal_image(DOSFS_FFS);
    // 2 surfaces, 11 blocks per track: 22 blocks per cylinder.
    let start = 2 * 22;
    let mut hdf = MemoryDevice::zeroed(start + 1760 + 22);
    hdf.as_bytes_mut()[start as usize * 512..][..1760 * 512].copy_from_slice(floppy.as_bytes());
    {
        let rdsk = hdf.block_mut(0);
        rdsk[..4].copy_from_slice(b"RDSK");
        put_rdb(rdsk, 4, 64);
        put_rdb(rdsk, 16, 512);
        put_rdb(rdsk, 28, 1);
        seal_rdb(rdsk);
    }
    {
        let part = hdf.block_mut(1);
        part[..4].copy_from_slice(b"PART");
        put_rdb(part, 4, 64);
        put_rdb(part, 16, 0xFFFF_FFFF);
        part[36] = 3;
        part[37..40].copy_from_slice(b"DH0");
        put_rdb(part, 128 + 4, 128);
        put_rdb(part, 128 + 12, 2);
        put_rdb(part, 128 + 20, 11);
        put_rdb(part, 128 + 36, 2);
        put_rdb(part, 128 + 40, 81);
        put_rdb(part, 128 + 64, u32::from_be_bytes(*b"DOS\x01"));
        seal_rdb(part);
    }

    let partition = find_first_partition(&hdf).unwrap().unwrap();
    assert_eq!(partition.start_block, start);
    assert_eq!(partition.block_count, 1760);

    let fs = mount(hdf.clone());
    assert_eq!(fs.list_directory("/").unwrap(), ["bigfile.bin", "subdir"]);
    assert_eq!(fs.stat_volume().unwrap().total_blocks, 1760);

    let raw = MountOptions {
        probe_rdb: false,
        ..MountOptions::default()
    };
    assert!(matches!(
        AdfFs::from_device(hdf, &raw),
        Err(AdfError::UnsupportedFilesystem(_))
    ));
}

#[test]
fn unmount_is_idempotent() {
    let mut fs = mount(minimal_image(DOSFS_FFS));
    assert!(fs.is_mounted());
    fs.unmount();
    fs.unmount();
    assert!(!fs.is_mounted());
    for err in [
        fs.list_directory("/").unwrap_err(),
        fs.get_attributes("/").unwrap_err(),
        fs.read_file("/bigfile.bin", 0, 1).unwrap_err(),
        fs.stat_volume().unwrap_err(),
    ] {
        assert!(matches!(err, AdfError::NotMounted));
        assert_eq!(err.errno(), libc::ENXIO);
    }
}

#[test]
fn mount_image_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(minimal_image(0).as_bytes()).unwrap();
    file.flush().unwrap();

    let fs = AdfFs::mount(file.path(), &MountOptions::default()).unwrap();
    assert_eq!(fs.stat_volume().unwrap().dos_type.fs_type, FsType::Ofs);
    assert_eq!(
        fs.read_file("/subdir/small.txt", 7, 100).unwrap(),
        b"amiga\n"
    );
}

#[test]
fn truncated_image_file_is_io() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let image = minimal_image(DOSFS_FFS);
    // The last block is partial; the root stays reachable through the boot pointer.
    file.write_all(&image.as_bytes()[..1000 * 512 + 100]).unwrap();
    file.flush().unwrap();

    let fs = AdfFs::mount(file.path(), &MountOptions::default()).unwrap();
    let volume = fs.volume().unwrap();
    assert!(matches!(volume.raw_block(1000), Err(AdfError::Io(_))));
    assert!(matches!(
        volume.raw_block(1001),
        Err(AdfError::OutOfRange { .. })
    ));
}

#[test]
fn cursor_streams_and_seeks() {
    let volume = shared_ffs().volume().unwrap();
    let entry = volume.resolve_path("/bigfile.bin").unwrap();
    let handle = volume.open_file(&entry).unwrap();
    let mut cursor = volume.cursor(handle);

    let mut all = Vec::new();
    cursor.read_to_end(&mut all).unwrap();
    assert_eq!(all, pattern(BIG_LEN, 0));

    cursor.seek(SeekFrom::End(-10)).unwrap();
    let mut tail = Vec::new();
    cursor.read_to_end(&mut tail).unwrap();
    assert_eq!(tail, all[BIG_LEN - 10..]);

    cursor.seek(SeekFrom::Start(1000)).unwrap();
    let mut buf = [0u8; 24];
    cursor.read_exact(&mut buf).unwrap();
    assert_eq!(buf, all[1000..1024]);
    assert_eq!(cursor.position(), 1024);
    assert!(cursor.seek(SeekFrom::Current(-2000)).is_err());
}

#[test]
fn concurrent_reads_agree() {
    let fs = shared_ffs();
    let expected = pattern(BIG_LEN, 0);
    std::thread::scope(|scope| {
        for t in 0..4 {
            let expected = &expected;
            scope.spawn(move || {
                for i in 0..20 {
                    let offset = (t * 7919 + i * 1237) % BIG_LEN;
                    let data = fs.read_file("/bigfile.bin", offset as u64, 700).unwrap();
                    let end = (offset + 700).min(BIG_LEN);
                    assert_eq!(data, expected[offset..end]);
                }
            });
        }
    });
}

#[test]
fn blocks_reread_identically() {
    let volume = shared_ffs().volume().unwrap();
    for block in [0, ROOT, BITMAP, 882, 1000] {
        assert_eq!(
            volume.raw_block(block).unwrap(),
            volume.raw_block(block).unwrap()
        );
    }
}

proptest! {
    #[test]
    fn chunked_reads_concatenate(start in 0usize..BIG_LEN, chunk in 1usize..1500) {
        let fs = shared_ffs();
        let whole = fs.read_file("/bigfile.bin", start as u64, BIG_LEN).unwrap();
        let mut pieces = Vec::new();
        let mut offset = start;
        loop {
            let piece = fs.read_file("/bigfile.bin", offset as u64, chunk).unwrap();
            if piece.is_empty() {
                break;
            }
            offset += piece.len();
            pieces.extend(piece);
        }
        prop_assert_eq!(pieces, whole);
    }

    #[test]
    fn lookup_matches_any_case(name in "[a-zA-Z0-9_]{1,30}") {
        let mut disk = DiskBuilder::new(DOSFS_FFS);
        disk.add_file(ROOT, &name, b"p");
        let volume = Volume::open(disk.build()).unwrap();
        let upper = volume.resolve_path(&name.to_uppercase()).unwrap();
        let lower = volume.resolve_path(&name.to_lowercase()).unwrap();
        prop_assert_eq!(upper.block, lower.block);
        prop_assert_eq!(upper.name_string(), name);
    }
}
