//! Checksum utilities for data package resources
//!
//! Resource descriptors carry their hash as `sha256:<hex digest>`.

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Prefix used for hashes embedded in resource descriptors
pub const HASH_PREFIX: &str = "sha256:";

const BLOCK_SIZE: usize = 64 * 1024;

/// Compute the hex SHA-256 digest of any readable source
pub fn compute_checksum<R: Read>(reader: &mut R) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BLOCK_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Hash a file on disk, returning `sha256:<hex>`
///
/// The file is streamed, never cached, so the result always reflects the
/// current content.
pub fn hash_file(path: impl AsRef<Path>) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    Ok(format!("{}{}", HASH_PREFIX, compute_checksum(&mut file)?))
}

/// Hash an in-memory buffer, returning `sha256:<hex>`
pub fn hash_bytes(data: &[u8]) -> String {
    format!("{}{}", HASH_PREFIX, hex::encode(Sha256::digest(data)))
}

/// Whether a string looks like a hash produced by [`hash_file`]
pub fn is_valid_hash(hash: &str) -> bool {
    hash.strip_prefix(HASH_PREFIX)
        .map(|hex| hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()))
        .unwrap_or(false)
}
