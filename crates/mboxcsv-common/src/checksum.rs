//! Checksum utilities for chunk and file verification
//!
//! The upload protocol pins sha256 for both per-chunk digests and the
//! optional whole-file digest, so only sha256 is provided here.

use crate::error::{CoreError, Result};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Compute the hex-encoded sha256 digest of a byte slice
pub fn compute_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute the hex-encoded sha256 digest of any readable source
pub fn compute_reader_sha256<R: Read>(reader: &mut R) -> Result<String> {
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

/// Compute the hex-encoded sha256 digest of a file
pub fn compute_file_sha256(path: impl AsRef<Path>) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    compute_reader_sha256(&mut file)
}

/// Verify a file against an expected hex sha256 digest
///
/// Digest comparison is case-insensitive on the hex encoding.
pub fn verify_file_sha256(path: impl AsRef<Path>, expected: &str) -> Result<()> {
    let actual = compute_file_sha256(path)?;
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(CoreError::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::io::Write;

    #[test]
    fn test_compute_sha256() {
        let digest = compute_sha256(b"hello world");
        assert_eq!(digest, "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9");
    }

    #[test]
    fn test_compute_reader_sha256() {
        let mut cursor = Cursor::new(b"hello world");
        let digest = compute_reader_sha256(&mut cursor).unwrap();
        assert_eq!(digest, "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9");
    }

    #[test]
    fn test_verify_file_sha256_mismatch() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"content").unwrap();
        let err = verify_file_sha256(file.path(), "deadbeef").unwrap_err();
        assert!(matches!(err, CoreError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_verify_file_sha256_case_insensitive() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();
        let upper = "B94D27B9934D3E08A52E52D7DA7DABFAC484EFE37A5380EE9088F7ACE2EFCDE9";
        assert!(verify_file_sha256(file.path(), upper).is_ok());
    }
}
