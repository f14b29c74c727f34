//! Binary blob file format and encoding.
//!
//! Blobs are stored with a 16-byte header followed by the payload:
//!
//! ```text
//! 0x00  4   "DVBF" magic
//! 0x04  1   version (u8) = 1
//! 0x05  1   algo: 1=blake3-256
//! 0x06  1   compression: 0=none, 1=zstd
//! 0x07  1   reserved (must be 0)
//! 0x08  8   payload_len (u64 LE) - compressed size
//! 0x10  ... payload
//! ```
//!
//! The digest that names the file always covers the uncompressed payload.

use crate::digest::Algorithm;
use crate::error::{Error, Result};

/// Magic bytes at the start of every blob file.
pub const MAGIC: &[u8; 4] = b"DVBF";

/// Current blob format version.
pub const VERSION: u8 = 1;

/// Size of the blob header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Compression types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    /// No compression.
    None = 0,
    /// Zstandard compression.
    Zstd = 1,
}

impl CompressionType {
    /// Convert to byte representation.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse from byte representation.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Zstd),
            _ => Err(Error::invalid_header(format!(
                "Invalid compression type: {}",
                value
            ))),
        }
    }

    /// Get the string name of this compression type.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionType::None => "none",
            CompressionType::Zstd => "zstd",
        }
    }
}

/// A 16-byte blob header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHeader {
    /// Blob format version.
    pub version: u8,
    /// Hash algorithm used.
    pub algorithm: Algorithm,
    /// Compression type.
    pub compression: CompressionType,
    /// Length of the payload in bytes (compressed size if compressed).
    pub payload_len: u64,
}

impl BlobHeader {
    /// Create a new blob header.
    pub fn new(algorithm: Algorithm, compression: CompressionType, payload_len: u64) -> Self {
        Self {
            version: VERSION,
            algorithm,
            compression,
            payload_len,
        }
    }

    /// Encode the header to a 16-byte array.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];

        // Magic (4 bytes)
        buf[0..4].copy_from_slice(MAGIC);

        // Version (1 byte)
        buf[4] = self.version;

        // Algorithm (1 byte)
        buf[5] = self.algorithm.id();

        // Compression (1 byte)
        buf[6] = self.compression.to_u8();

        // Reserved (1 byte, must be 0)
        buf[7] = 0;

        // Payload length (8 bytes, little-endian)
        buf[8..16].copy_from_slice(&self.payload_len.to_le_bytes());

        buf
    }

    /// Decode a header from a 16-byte array.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::invalid_header(format!(
                "Header too short: {} bytes (expected {})",
                buf.len(),
                HEADER_SIZE
            )));
        }

        // Check magic
        if &buf[0..4] != MAGIC {
            return Err(Error::invalid_header(format!(
                "Invalid magic: expected {:?}, got {:?}",
                MAGIC,
                &buf[0..4]
            )));
        }

        // Parse version
        let version = buf[4];
        if version != VERSION {
            return Err(Error::invalid_header(format!(
                "Unsupported blob version: {} (expected {})",
                version, VERSION
            )));
        }

        // Parse algorithm
        let algorithm = Algorithm::from_id(buf[5])?;

        // Parse compression
        let compression = CompressionType::from_u8(buf[6])?;

        // Check reserved byte
        if buf[7] != 0 {
            return Err(Error::invalid_header(format!(
                "Reserved byte must be 0, got {}",
                buf[7]
            )));
        }

        // Parse payload length
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&buf[8..16]);
        let payload_len = u64::from_le_bytes(len_bytes);

        Ok(Self {
            version,
            algorithm,
            compression,
            payload_len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode_roundtrip() {
        let header = BlobHeader::new(Algorithm::Blake3, CompressionType::Zstd, 12345);
        let encoded = header.encode();
        let decoded = BlobHeader::decode(&encoded).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn test_header_uncompressed() {
        let header = BlobHeader::new(Algorithm::Blake3, CompressionType::None, 0);
        let decoded = BlobHeader::decode(&header.encode()).unwrap();
        assert_eq!(decoded.compression, CompressionType::None);
        assert_eq!(decoded.payload_len, 0);
    }

    #[test]
    fn test_header_bad_magic() {
        let header = BlobHeader::new(Algorithm::Blake3, CompressionType::None, 5);
        let mut encoded = header.encode();
        encoded[0] = b'X';
        assert!(BlobHeader::decode(&encoded).is_err());
    }

    #[test]
    fn test_header_bad_version() {
        let header = BlobHeader::new(Algorithm::Blake3, CompressionType::None, 5);
        let mut encoded = header.encode();
        encoded[4] = 99;
        assert!(BlobHeader::decode(&encoded).is_err());
    }

    #[test]
    fn test_header_bad_reserved() {
        let header = BlobHeader::new(Algorithm::Blake3, CompressionType::None, 5);
        let mut encoded = header.encode();
        encoded[7] = 1;
        assert!(BlobHeader::decode(&encoded).is_err());
    }

    #[test]
    fn test_header_too_short() {
        assert!(BlobHeader::decode(&[0u8; 4]).is_err());
    }

    #[test]
    fn test_compression_type_conversions() {
        assert_eq!(CompressionType::from_u8(0).unwrap(), CompressionType::None);
        assert_eq!(CompressionType::from_u8(1).unwrap(), CompressionType::Zstd);
        assert!(CompressionType::from_u8(7).is_err());
        assert_eq!(CompressionType::Zstd.as_str(), "zstd");
    }

    // Property-based tests
    use proptest::prelude::*;

    proptest! {
        /// Header round-trip preserves every field.
        #[test]
        fn prop_header_roundtrip(payload_len in any::<u64>(), zstd in any::<bool>()) {
            let compression = if zstd { CompressionType::Zstd } else { CompressionType::None };
            let header = BlobHeader::new(Algorithm::Blake3, compression, payload_len);
            let decoded = BlobHeader::decode(&header.encode())?;
            prop_assert_eq!(header, decoded);
        }
    }
}
