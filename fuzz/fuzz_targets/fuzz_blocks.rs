#![no_main]

use adf_fs::{decode, Block, BlockKind, BootBlock, FsType};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() >= 1024 {
        let boot_buf: &[u8; 1024] = data[..1024].try_into().unwrap();
        let _ = BootBlock::parse(boot_buf);
    }

    if data.len() >= 512 {
        let block_buf: &[u8; 512] = data[..512].try_into().unwrap();
        for kind in [
            BlockKind::Root,
            BlockKind::Header,
            BlockKind::FileExtension,
            BlockKind::Data(FsType::Ofs),
            BlockKind::Data(FsType::Ffs),
        ] {
            // Decoded payloads must stay inside the block.
            if let Ok(Block::Data(block)) = decode(block_buf, 0, kind) {
                assert!(block.payload().len() <= 512);
            }
        }
    }
});
