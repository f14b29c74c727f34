//! Durable storage of unique content bodies, keyed by digest.
//!
//! The blob store is storage-only: it never consults reference counts.
//! The orchestrator guarantees `delete` is only invoked once the ledger
//! has confirmed a count of zero, under the same per-digest critical
//! section.

use crate::digest::{Algorithm, Digest};
use crate::error::{Error, Result};
use crate::object::{BlobHeader, CompressionType, HEADER_SIZE};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Compression threshold: bodies >= 4KB are compressed.
const COMPRESSION_THRESHOLD: usize = 4096;

/// File-backed store of blob bodies, one file per digest.
#[derive(Debug)]
pub struct BlobStore {
    objects_dir: PathBuf,
    algorithm: Algorithm,
}

impl BlobStore {
    /// Create a blob store rooted at the given objects directory.
    ///
    /// Creates the `objects/{algorithm}` layout if missing.
    pub fn open<P: AsRef<Path>>(objects_dir: P, algorithm: Algorithm) -> Result<Self> {
        let objects_dir = objects_dir.as_ref().join(algorithm.as_str());
        fs::create_dir_all(&objects_dir)?;

        Ok(Self {
            objects_dir,
            algorithm,
        })
    }

    /// Get the path to a blob file given its digest.
    ///
    /// Returns: `{objects_dir}/{prefix}/{suffix}`
    pub fn blob_path(&self, digest: &Digest) -> PathBuf {
        self.objects_dir.join(digest.prefix()).join(digest.suffix())
    }

    /// True if a blob exists for the digest.
    pub fn contains(&self, digest: &Digest) -> bool {
        self.blob_path(digest).exists()
    }

    /// Persist a body only if no blob exists for its digest.
    ///
    /// Returns true if a physical write occurred, false if the blob was
    /// already present. Safe under concurrent calls with the same digest:
    /// the write goes through a temp file and an atomic rename, so a
    /// second caller either sees the finished blob or persists an
    /// identical one over it.
    pub fn put_if_absent(&self, digest: &Digest, body: &[u8]) -> Result<bool> {
        let blob_path = self.blob_path(digest);
        if blob_path.exists() {
            return Ok(false);
        }

        let (payload, compression) = if body.len() >= COMPRESSION_THRESHOLD {
            (compress_zstd(body)?, CompressionType::Zstd)
        } else {
            (body.to_vec(), CompressionType::None)
        };

        let header = BlobHeader::new(self.algorithm, compression, payload.len() as u64);

        // Create shard directory if needed
        let shard_dir = blob_path
            .parent()
            .ok_or_else(|| Error::invalid_digest("blob path has no parent"))?;
        fs::create_dir_all(shard_dir)?;

        // Write atomically using tempfile
        let mut temp_file = tempfile::NamedTempFile::new_in(shard_dir)?;
        temp_file.write_all(&header.encode())?;
        temp_file.write_all(&payload)?;
        temp_file.flush()?;
        temp_file.persist(&blob_path)?;

        Ok(true)
    }

    /// Retrieve a blob body by digest.
    ///
    /// Fails with BlobNotFound if no blob exists. The recovered bytes are
    /// re-digested for corruption detection.
    pub fn read(&self, digest: &Digest) -> Result<Vec<u8>> {
        let blob_path = self.blob_path(digest);
        if !blob_path.exists() {
            return Err(Error::blob_not_found(digest.to_hex()));
        }

        let mut file = fs::File::open(&blob_path)?;

        let mut header_buf = [0u8; HEADER_SIZE];
        file.read_exact(&mut header_buf)?;
        let header = BlobHeader::decode(&header_buf)?;

        let mut payload = Vec::new();
        file.read_to_end(&mut payload)?;

        if payload.len() != header.payload_len as usize {
            return Err(Error::corrupted_blob(
                &blob_path,
                format!(
                    "Payload length mismatch: expected {}, got {}",
                    header.payload_len,
                    payload.len()
                ),
            ));
        }

        let body = match header.compression {
            CompressionType::None => payload,
            CompressionType::Zstd => decompress_zstd(&payload)?,
        };

        // Verify digest matches uncompressed data (corruption detection)
        let computed = Digest::of(&body);
        if computed != *digest {
            return Err(Error::corrupted_blob(
                &blob_path,
                format!(
                    "Digest mismatch: expected {}, got {}",
                    digest.to_hex(),
                    computed.to_hex()
                ),
            ));
        }

        Ok(body)
    }

    /// Stream a blob body to a writer.
    pub fn read_to_writer<W: Write>(&self, digest: &Digest, mut writer: W) -> Result<()> {
        let body = self.read(digest)?;
        writer.write_all(&body)?;
        Ok(())
    }

    /// Size of the blob file on disk (header + stored payload).
    pub fn stored_size(&self, digest: &Digest) -> Result<u64> {
        let blob_path = self.blob_path(digest);
        if !blob_path.exists() {
            return Err(Error::blob_not_found(digest.to_hex()));
        }
        Ok(fs::metadata(&blob_path)?.len())
    }

    /// Physically remove the stored body for a digest.
    ///
    /// Fails with BlobNotFound if no blob exists.
    pub fn delete(&self, digest: &Digest) -> Result<()> {
        let blob_path = self.blob_path(digest);
        if !blob_path.exists() {
            return Err(Error::blob_not_found(digest.to_hex()));
        }

        fs::remove_file(&blob_path)?;

        // Drop the shard directory if this was its last blob
        if let Some(shard_dir) = blob_path.parent() {
            if let Ok(mut entries) = fs::read_dir(shard_dir) {
                if entries.next().is_none() {
                    let _ = fs::remove_dir(shard_dir);
                }
            }
        }

        Ok(())
    }
}

/// Compress data using zstd.
fn compress_zstd(data: &[u8]) -> Result<Vec<u8>> {
    zstd::encode_all(data, 3) // Level 3 = fast compression
        .map_err(|e| Error::compression_error(format!("zstd compression failed: {}", e)))
}

/// Decompress data using zstd.
fn decompress_zstd(data: &[u8]) -> Result<Vec<u8>> {
    zstd::decode_all(data)
        .map_err(|e| Error::compression_error(format!("zstd decompression failed: {}", e)))
}
