#![no_main]

use adf_fs::{hash_name, latin1_to_string, names_equal, string_to_latin1, HASH_TABLE_SIZE};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mid = data.len() / 2;
    let (name1, name2) = data.split_at(mid);

    for intl in [false, true] {
        let h1 = hash_name(name1, intl);
        assert!(h1 < HASH_TABLE_SIZE);
        // Equal names must land in the same bucket.
        if names_equal(name1, name2, intl) {
            assert_eq!(h1, hash_name(name2, intl));
        }
        assert!(names_equal(name1, name1, intl));
    }

    let decoded = latin1_to_string(data);
    assert_eq!(string_to_latin1(&decoded).as_deref(), Some(data));
});
