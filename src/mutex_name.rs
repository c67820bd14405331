// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Mutex name validation and mapping to the platform's object namespace.
//
// POSIX: the mutex lives in a shared memory object called `/<name>`. The
//        namespace is system-wide; interior '/' is rejected.
// Windows: the name goes to CreateMutexW unchanged. Without a prefix it is
//          session-local; `Global\` or `Local\` select a namespace explicitly.

/// FNV-1a 64-bit hash, used to shorten names past `SHM_NAME_MAX`.
pub fn fnv1a_64(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in data {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn to_hex(val: u64) -> String {
    format!("{val:016x}")
}

/// Maximum length for POSIX shm names. 0 disables truncation.
///
/// On macOS `PSHMNAMLEN` is 31. On Linux the limit is 255 and the OS
/// reports overlong names itself.
#[cfg(target_os = "macos")]
pub const SHM_NAME_MAX: usize = 31;

#[cfg(not(target_os = "macos"))]
pub const SHM_NAME_MAX: usize = 0;

/// Namespace prefixes Windows accepts in front of a kernel object name.
pub const WINDOWS_NAMESPACES: &[&str] = &["Global\\", "Local\\"];

/// Reject names no backend can represent. Returns the reason on failure.
pub fn validate(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("name is empty");
    }
    if name.contains('\0') {
        return Err("name contains a NUL byte");
    }
    #[cfg(unix)]
    {
        let body = name.strip_prefix('/').unwrap_or(name);
        if body.is_empty() {
            return Err("name is empty");
        }
        if body.contains('/') {
            return Err("name contains '/' after the leading position");
        }
    }
    #[cfg(windows)]
    {
        let body = WINDOWS_NAMESPACES
            .iter()
            .find_map(|ns| name.strip_prefix(ns))
            .unwrap_or(name);
        if body.is_empty() {
            return Err("name is empty");
        }
        if body.contains('\\') {
            return Err("name contains '\\' outside a namespace prefix");
        }
    }
    Ok(())
}

/// Produce the POSIX shm object name (with leading '/').
///
/// When `SHM_NAME_MAX > 0`, names whose POSIX form would exceed it become
/// `/<prefix>_<16-hex-FNV-1a-hash>`, keeping part of the original for
/// debuggability.
pub fn posix_name(name: &str) -> String {
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
    let prefix_len = SHM_NAME_MAX.saturating_sub(HASH_SUFFIX_LEN + 1);

    let hex = to_hex(fnv1a_64(result.as_bytes()));

    let mut shortened = String::with_capacity(SHM_NAME_MAX);
    shortened.push('/');
    // Take whole chars so a multi-byte name is never split.
    let body: String = result[1..]
        .chars()
        .scan(0usize, |len, c| {
            *len += c.len_utf8();
            (*len <= prefix_len).then_some(c)
        })
        .collect();
    shortened.push_str(&body);
    shortened.push('_');
    shortened.push_str(&hex);
    shortened
}
