//! Amiga name hashing, case folding and Latin-1 conversion.
//!
//! Names on disk are Latin-1 byte strings compared case-insensitively. The
//! hash is the AmigaDOS directory hash: every implementation that must find
//! entries written by real Amigas uses exactly this function.

use crate::constants::HASH_TABLE_SIZE;

/// Compute the hash table slot for a name.
#[inline]
pub fn hash_name(name: &[u8], intl: bool) -> usize {
    let hash = name.iter().fold(name.len() as u32, |hash, &c| {
        let upper = if intl {
            intl_to_upper(c)
        } else {
            ascii_to_upper(c)
        };
        hash.wrapping_mul(13).wrapping_add(u32::from(upper)) & 0x7FF
    });
    (hash % HASH_TABLE_SIZE as u32) as usize
}

/// Uppercase for the non-international rules: only `a`-`z` fold.
#[inline]
pub const fn ascii_to_upper(c: u8) -> u8 {
    c.to_ascii_uppercase()
}

/// Uppercase with international support.
///
/// Latin-1 `à`-`þ` (224-254) fold to `À`-`Þ` by subtracting 32, except the
/// division sign (247).
#[inline]
pub const fn intl_to_upper(c: u8) -> u8 {
    const LATIN1_LOWER_START: u8 = 224;
    const LATIN1_LOWER_END: u8 = 254;
    const DIVISION_SIGN: u8 = 247;

    if c.is_ascii_lowercase()
        || (c >= LATIN1_LOWER_START && c <= LATIN1_LOWER_END && c != DIVISION_SIGN)
    {
        c - 32
    } else {
        c
    }
}

/// Compare two names for equality under the volume's case folding.
#[inline]
pub fn names_equal(a: &[u8], b: &[u8], intl: bool) -> bool {
    if a.len() != b.len() {
        return false;
    }
    if intl {
        a.iter()
            .zip(b)
            .all(|(&ca, &cb)| intl_to_upper(ca) == intl_to_upper(cb))
    } else {
        a.eq_ignore_ascii_case(b)
    }
}

/// Decode a Latin-1 byte string.
pub fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Encode to Latin-1; `None` if any character is outside U+0000..=U+00FF.
pub fn string_to_latin1(s: &str) -> Option<Vec<u8>> {
    s.chars().map(|c| u8::try_from(u32::from(c)).ok()).collect()
}
