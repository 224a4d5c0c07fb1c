#![no_main]

use adf_fs::{AdfFs, FileKind, MemoryDevice, MountOptions};
use libfuzzer_sys::fuzz_target;

/// Walk at most this many entries so looping images stay cheap.
const MAX_VISITS: usize = 256;

fn walk(fs: &AdfFs, path: &str, visits: &mut usize) {
    let Ok(names) = fs.list_directory(path) else {
        return;
    };
    for name in names {
        *visits += 1;
        if *visits > MAX_VISITS {
            return;
        }
        let child = format!("{}/{name}", path.trim_end_matches('/'));
        let Ok(attrs) = fs.get_attributes(&child) else {
            continue;
        };
        match attrs.kind {
            FileKind::Directory => walk(fs, &child, visits),
            FileKind::File => {
                if let Ok(data) = fs.read_file(&child, 0, 4096) {
                    assert!(data.len() as u64 <= attrs.size);
                }
            }
            FileKind::Symlink => {
                let _ = fs.read_link(&child);
            }
        }
    }
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 1536 {
        return;
    }
    let device = MemoryDevice::new(data.to_vec());
    let Ok(fs) = AdfFs::from_device(device, &MountOptions::default()) else {
        return;
    };
    let _ = fs.stat_volume();
    let mut visits = 0;
    walk(&fs, "/", &mut visits);
});
