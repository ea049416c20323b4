//! Hash-validated cache artifacts.
//!
//! Layout, little-endian:
//!
//! | bytes  | content                                       |
//! |--------|-----------------------------------------------|
//! | 0..4   | host format magic                             |
//! | 4..8   | flags: bit 0 hash-based, bit 1 check source   |
//! | 8..16  | validity hash                                 |
//! | 16..   | payload produced by the host compiler         |

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use sha2::{Digest, Sha256};

pub const HEADER_LEN: usize = 16;
pub const FLAG_HASH_BASED: u32 = 0b01;
pub const FLAG_CHECK_SOURCE: u32 = 0b10;

/// Validity hash of `input` for a host with format magic `host_magic`.
///
/// The host path hashes the raw source; the interceptor hashes its tool
/// magic followed by the raw source, so neither accepts the other's artifacts.
#[must_use]
pub fn source_hash(host_magic: &[u8; 4], input: &[u8]) -> [u8; 8] {
    let digest = Sha256::new().chain_update(host_magic).chain_update(input).finalize();
    let mut hash = [0; 8];
    hash.copy_from_slice(&digest[..8]);
    hash
}

/// Artifact location for `unit`: `<unit dir>/<cache_dir>/<stem>.<tag>.pyc`.
#[must_use]
pub fn cache_path(unit: &Path, cache_dir: &str, tag: &str) -> PathBuf {
    let stem = unit.file_stem().map(|stem| stem.to_string_lossy().into_owned()).unwrap_or_default();
    unit.parent()
        .unwrap_or_else(|| Path::new(""))
        .join(cache_dir)
        .join(format!("{stem}.{tag}.pyc"))
}

/// Why an artifact was not used. Every variant is a cache miss.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub(crate) enum CacheInvalidationFailure {
    #[error("no artifact")]
    Missing,
    #[error("artifact unreadable: {0}")]
    Unreadable(String),
    #[error("artifact shorter than its header")]
    Truncated,
    #[error("artifact written for another host format")]
    BadMagic,
    #[error("artifact is not hash-based")]
    NotHashBased,
    #[error("validity hash mismatch")]
    HashMismatch,
}

#[must_use]
pub fn encode(host_magic: &[u8; 4], flags: u32, hash: &[u8; 8], payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(host_magic);
    bytes.extend_from_slice(&flags.to_le_bytes());
    bytes.extend_from_slice(hash);
    bytes.extend_from_slice(payload);
    bytes
}

/// Returns the payload of `bytes` if it is a hash-based artifact for
/// `host_magic` carrying `expected`.
pub(crate) fn validate(bytes: &[u8], host_magic: &[u8; 4], expected: &[u8; 8]) -> Result<Vec<u8>, CacheInvalidationFailure> {
    if bytes.len() < HEADER_LEN {
        return Err(CacheInvalidationFailure::Truncated);
    }
    let (header, payload) = bytes.split_at(HEADER_LEN);
    if header[..4] != host_magic[..] {
        return Err(CacheInvalidationFailure::BadMagic);
    }
    let mut flags = [0; 4];
    flags.copy_from_slice(&header[4..8]);
    if u32::from_le_bytes(flags) & FLAG_HASH_BASED == 0 {
        return Err(CacheInvalidationFailure::NotHashBased);
    }
    if header[8..16] != expected[..] {
        return Err(CacheInvalidationFailure::HashMismatch);
    }
    Ok(payload.to_vec())
}

/// Reads and validates the artifact at `path`.
pub(crate) fn read(path: &Path, host_magic: &[u8; 4], expected: &[u8; 8]) -> Result<Vec<u8>, CacheInvalidationFailure> {
    let bytes = fs::read(path).map_err(|error| match error.kind() {
        io::ErrorKind::NotFound => CacheInvalidationFailure::Missing,
        _ => CacheInvalidationFailure::Unreadable(error.to_string()),
    })?;
    validate(&bytes, host_magic, expected)
}

/// Writes `bytes` to `path` through a sibling temp file and a rename, so a
/// reader never sees a partial artifact.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let mut temp = path.as_os_str().to_owned();
    temp.push(format!(".{}.tmp", std::process::id()));
    let temp = PathBuf::from(temp);
    fs::write(&temp, bytes)?;
    fs::rename(&temp, path).inspect_err(|_| {
        let _ = fs::remove_file(&temp);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAGIC: [u8; 4] = *b"TST\n";

    #[test]
    fn hash_depends_on_host_magic() {
        assert_ne!(source_hash(&MAGIC, b"x = 1"), source_hash(b"OTH\n", b"x = 1"));
        assert_eq!(source_hash(&MAGIC, b"x = 1"), source_hash(&MAGIC, b"x = 1"));
    }

    #[test]
    fn validation_failures() {
        let hash = source_hash(&MAGIC, b"src");
        let artifact = encode(&MAGIC, FLAG_HASH_BASED | FLAG_CHECK_SOURCE, &hash, b"payload");
        assert_eq!(validate(&artifact, &MAGIC, &hash).unwrap(), b"payload");
        assert_eq!(validate(&artifact[..10], &MAGIC, &hash), Err(CacheInvalidationFailure::Truncated));
        assert_eq!(validate(&artifact, b"OTH\n", &hash), Err(CacheInvalidationFailure::BadMagic));
        assert_eq!(validate(&artifact, &MAGIC, &[0; 8]), Err(CacheInvalidationFailure::HashMismatch));
        let timestamped = encode(&MAGIC, 0, &hash, b"payload");
        assert_eq!(validate(&timestamped, &MAGIC, &hash), Err(CacheInvalidationFailure::NotHashBased));
    }

    #[test]
    fn cache_path_layout() {
        assert_eq!(
            cache_path(Path::new("pkg/mod.py"), "__pycache__", "prefabs-0"),
            Path::new("pkg/__pycache__/mod.prefabs-0.pyc")
        );
    }
}
