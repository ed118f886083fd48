//! Content checksums for deduplication.
//!
//! The checksum is taken over the untouched original bytes, never over a
//! normalized or re-encoded form, so the same file dropped twice under
//! different names is still recognized.

use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const CHUNK_SIZE: usize = 64 * 1024;

/// SHA-256 content hasher.
///
/// # Example
///
/// ```rust
/// use papertray::services::ContentHasher;
///
/// let checksum = ContentHasher::checksum(b"hello");
/// assert_eq!(checksum.len(), 64);
/// assert_eq!(
///     checksum,
///     "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
/// );
/// ```
pub struct ContentHasher;

impl ContentHasher {
    /// Lowercase hex SHA-256 of `bytes`.
    #[must_use]
    pub fn checksum(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    /// Lowercase hex SHA-256 of a file, streamed in chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn checksum_file(path: &Path) -> Result<String> {
        let file = File::open(path).map_err(|e| Error::io("open_for_checksum", path, &e))?;
        let mut reader = BufReader::new(file);
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let read = reader
                .read(&mut buf)
                .map_err(|e| Error::io("read_for_checksum", path, &e))?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
        }
        Ok(hex::encode(hasher.finalize()))
    }
}
