// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 memchan contributors
//
// POSIX shm object names must start with '/' and, on some platforms, fit a
// tight length limit. Channel names (and the GlobalMutex_/GlobalEvt_ names
// derived from them) are normalised here; over-long names are shortened to
// a prefix plus an FNV-1a hash so they stay unique and debuggable.

/// FNV-1a 64-bit hash.
pub fn fnv1a_64(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in data {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Convert a 64-bit value to a fixed-width 16-char lowercase hex string.
fn to_hex(val: u64) -> [u8; 16] {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut buf = [0u8; 16];
    let mut v = val;
    for i in (0..16).rev() {
        buf[i] = DIGITS[(v & 0xf) as usize];
        v >>= 4;
    }
    buf
}

/// Maximum length for POSIX shm names. 0 disables truncation.
///
/// macOS caps shm names at PSHMNAMLEN (31); Linux allows up to NAME_MAX.
#[cfg(target_os = "macos")]
pub const SHM_NAME_MAX: usize = 31;

#[cfg(not(target_os = "macos"))]
pub const SHM_NAME_MAX: usize = 0;

/// Produce a POSIX shm-safe name (with leading '/').
///
/// When `SHM_NAME_MAX > 0`, names whose POSIX form would exceed the limit
/// are shortened to `/<prefix>_<16-hex-FNV-1a-hash>`, keeping a truncated
/// portion of the original name for debuggability.
pub fn make_shm_name(name: &str) -> String {
    let result = if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{name}")
    };

    if SHM_NAME_MAX == 0 || result.len() <= SHM_NAME_MAX {
        return result;
    }

    // 1 (underscore) + 16 (hex hash)
    const HASH_SUFFIX_LEN: usize = 1 + 16;
    let prefix_len = if SHM_NAME_MAX > HASH_SUFFIX_LEN + 1 {
        SHM_NAME_MAX - HASH_SUFFIX_LEN - 1 // -1 for leading '/'
    } else {
        0
    };

    let hash = fnv1a_64(result.as_bytes());
    let hex = to_hex(hash);

    let mut shortened = String::with_capacity(SHM_NAME_MAX);
    shortened.push('/');
    if prefix_len > 0 {
        let original_body = &result[1..];
        let take = prefix_len.min(original_body.len());
        shortened.push_str(&original_body[..take]);
    }
    shortened.push('_');
    shortened.push_str(std::str::from_utf8(&hex).unwrap_or("0000000000000000"));
    shortened
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_empty_input_is_offset_basis() {
        assert_eq!(fnv1a_64(b""), 0xcbf29ce484222325);
    }

    #[test]
    fn make_shm_name_prepends_slash() {
        let name = make_shm_name("slot_chan");
        assert!(name.starts_with('/'));
        assert!(name.contains("slot_chan"));
    }

    #[test]
    fn make_shm_name_keeps_existing_slash() {
        let name = make_shm_name("/slot");
        assert_eq!(&name[..5], "/slot");
    }

    #[test]
    fn derived_names_stay_distinct() {
        let a = make_shm_name("GlobalMutex_chan_with_a_fairly_long_name");
        let b = make_shm_name("GlobalEvt_chan_with_a_fairly_long_name");
        assert_ne!(a, b);
    }
}
