#![no_main]

use adf_fs::{bitmap_sum, boot_sum, normal_sum, rdb_sum, read_u32_be};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() >= 512 {
        let mut block_buf: [u8; 512] = data[..512].try_into().unwrap();

        // Storing the computed sum must make the block verify.
        let sum = normal_sum(&block_buf, 20);
        block_buf[20..24].copy_from_slice(&sum.to_be_bytes());
        assert_eq!(normal_sum(&block_buf, 20), read_u32_be(&block_buf, 20));

        let _ = bitmap_sum(&block_buf);
        let _ = rdb_sum(&block_buf, usize::from(data[0]));
    }

    if data.len() >= 1024 {
        let boot_buf: &[u8; 1024] = data[..1024].try_into().unwrap();
        let _ = boot_sum(boot_buf);
    }
});
