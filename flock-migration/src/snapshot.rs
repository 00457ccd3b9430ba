//! Snapshot archive builder (spec §4.6 SNAPSHOTTING/VERIFYING): tars the
//! home's portable subtree, compresses it, and digests the result.

use std::path::Path;

use sha2::{Digest, Sha256};

use flock_types::{FlockError, FlockResult};

/// An in-memory archive: zstd-compressed tar bytes plus their SHA-256
/// digest. The digest is computed over exactly these bytes, so the
/// receiving side can verify without ever writing to disk first.
pub struct Archive {
    pub bytes: Vec<u8>,
    pub digest_hex: String,
}

impl Archive {
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

fn digest_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Builds a tar+zstd archive of `source_dir`'s contents. `source_dir` must
/// exist; an empty directory yields a valid (empty) archive.
pub fn build_archive(source_dir: &Path) -> FlockResult<Archive> {
    let mut tar_bytes = Vec::new();
    {
        let mut builder = tar::Builder::new(&mut tar_bytes);
        builder
            .append_dir_all(".", source_dir)
            .map_err(|e| FlockError::Storage(format!("failed to tar {}: {e}", source_dir.display())))?;
        builder
            .finish()
            .map_err(|e| FlockError::Storage(format!("failed to finalize tar archive: {e}")))?;
    }
    let compressed = zstd::encode_all(tar_bytes.as_slice(), 0)
        .map_err(|e| FlockError::Storage(format!("failed to compress archive: {e}")))?;
    let digest_hex = digest_hex(&compressed);
    Ok(Archive {
        bytes: compressed,
        digest_hex,
    })
}

/// Recomputes the digest of `bytes` and compares against `expected_hex`,
/// rejecting oversized archives before spending time on the hash.
pub fn verify_archive(bytes: &[u8], expected_hex: &str, max_size_bytes: u64) -> FlockResult<()> {
    if bytes.len() as u64 > max_size_bytes {
        return Err(FlockError::VerificationFailed(format!(
            "archive is {} bytes, exceeds the {max_size_bytes} byte limit",
            bytes.len()
        )));
    }
    let actual = digest_hex(bytes);
    if actual != expected_hex {
        return Err(FlockError::VerificationFailed(format!(
            "digest mismatch: expected {expected_hex}, got {actual}"
        )));
    }
    Ok(())
}

/// Extracts a verified tar+zstd archive into `target_dir`, creating it if
/// necessary.
pub fn extract_archive(bytes: &[u8], target_dir: &Path) -> FlockResult<()> {
    std::fs::create_dir_all(target_dir)
        .map_err(|e| FlockError::Storage(format!("failed to create {}: {e}", target_dir.display())))?;
    let tar_bytes = zstd::decode_all(bytes)
        .map_err(|e| FlockError::Storage(format!("failed to decompress archive: {e}")))?;
    let mut archive = tar::Archive::new(tar_bytes.as_slice());
    archive
        .unpack(target_dir)
        .map_err(|e| FlockError::Storage(format!("failed to unpack archive into {}: {e}", target_dir.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn round_trips_a_directory_tree() {
        let source = tempfile::tempdir().unwrap();
        std::fs::create_dir(source.path().join("work")).unwrap();
        let mut f = std::fs::File::create(source.path().join("work").join("note.txt")).unwrap();
        f.write_all(b"hello flock").unwrap();

        let archive = build_archive(source.path()).unwrap();
        verify_archive(&archive.bytes, &archive.digest_hex, crate::phases::MAX_PORTABLE_SIZE_BYTES).unwrap();

        let target = tempfile::tempdir().unwrap();
        extract_archive(&archive.bytes, target.path()).unwrap();
        let restored = std::fs::read_to_string(target.path().join("work").join("note.txt")).unwrap();
        assert_eq!(restored, "hello flock");
    }

    #[test]
    fn tampered_bytes_fail_verification() {
        let source = tempfile::tempdir().unwrap();
        let archive = build_archive(source.path()).unwrap();
        let mut tampered = archive.bytes.clone();
        if let Some(b) = tampered.first_mut() {
            *b ^= 0xff;
        } else {
            tampered.push(1);
        }
        let err = verify_archive(&tampered, &archive.digest_hex, crate::phases::MAX_PORTABLE_SIZE_BYTES).unwrap_err();
        assert_eq!(err.kind(), flock_types::ErrorKind::Transient);
    }

    #[test]
    fn oversized_archive_is_rejected_before_hashing() {
        let bytes = vec![0u8; 10];
        let err = verify_archive(&bytes, "anything", 5).unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }
}
