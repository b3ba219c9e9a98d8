//! Checksum utilities for sealing and verifying persisted artifacts

use crate::error::{LakebootError, Result};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Compute the SHA-256 of a file
pub fn sha256_file(path: impl AsRef<Path>) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    sha256_reader(&mut file)
}

/// Compute the SHA-256 of any readable source
pub fn sha256_reader<R: Read>(reader: &mut R) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Compute the SHA-256 of an in-memory buffer
pub fn sha256_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Incremental hasher for content that is produced line by line.
///
/// Writers feed every persisted line through [`RunningChecksum::update`] and
/// seal the artifact with [`RunningChecksum::finish`].
#[derive(Default, Clone)]
pub struct RunningChecksum {
    hasher: Sha256,
}

impl RunningChecksum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

/// Compare a computed digest with the expected one
pub fn verify_checksum(expected: &str, actual: &str) -> Result<()> {
    if expected.eq_ignore_ascii_case(actual) {
        Ok(())
    } else {
        Err(LakebootError::ChecksumMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;

    const HELLO_WORLD_SHA256: &str =
        "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_sha256_reader() {
        let mut cursor = Cursor::new(b"hello world");
        assert_eq!(sha256_reader(&mut cursor).unwrap(), HELLO_WORLD_SHA256);
    }

    #[test]
    fn test_running_checksum_matches_one_shot() {
        let mut running = RunningChecksum::new();
        running.update(b"hello ");
        running.update(b"world");
        assert_eq!(running.finish(), sha256_bytes(b"hello world"));
    }

    #[test]
    fn test_sha256_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();
        file.flush().unwrap();
        assert_eq!(sha256_file(file.path()).unwrap(), HELLO_WORLD_SHA256);
    }

    #[test]
    fn test_verify_checksum_mismatch() {
        assert!(verify_checksum(HELLO_WORLD_SHA256, HELLO_WORLD_SHA256).is_ok());
        let err = verify_checksum(HELLO_WORLD_SHA256, "00").unwrap_err();
        assert!(matches!(err, LakebootError::ChecksumMismatch { .. }));
    }
}
