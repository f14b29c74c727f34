//! Content addressing using BLAKE3.
//!
//! The digest is the identity function for deduplication: two bodies with
//! the same digest are treated as identical content, and bodies are never
//! compared once digests match.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::io::Read;

/// Digest size in bytes (BLAKE3 produces 256-bit digests).
pub const DIGEST_SIZE: usize = 32;

/// Digest algorithms a store can be initialized with. Recorded in the
/// store config and in every blob header, so the on-disk format stays
/// self-describing if more algorithms are ever added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// BLAKE3 with 256-bit output.
    Blake3,
}

impl Algorithm {
    /// Name used in config files and the objects directory.
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Blake3 => "blake3-256",
        }
    }

    /// Parse an algorithm name.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "blake3-256" => Ok(Algorithm::Blake3),
            _ => Err(Error::unsupported_algorithm(s)),
        }
    }

    /// Single-byte id used in blob headers.
    pub fn id(&self) -> u8 {
        match self {
            Algorithm::Blake3 => 1,
        }
    }

    /// Inverse of [`Algorithm::id`].
    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            1 => Ok(Algorithm::Blake3),
            _ => Err(Error::unsupported_algorithm(format!("ID {}", id))),
        }
    }
}

/// A 32-byte BLAKE3 content digest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest([u8; DIGEST_SIZE]);

impl Digest {
    /// Digest a body held in memory.
    ///
    /// Pure and deterministic; the empty body is valid and has a
    /// well-defined digest.
    pub fn of(data: &[u8]) -> Self {
        Digest(*blake3::hash(data).as_bytes())
    }

    /// Digest a body streamed from a reader.
    pub fn of_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut hasher = blake3::Hasher::new();
        std::io::copy(&mut reader, &mut hasher)?;
        Ok(Digest(*hasher.finalize().as_bytes()))
    }

    /// Wrap raw digest bytes.
    pub fn from_bytes(bytes: [u8; DIGEST_SIZE]) -> Self {
        Digest(bytes)
    }

    /// Parse the 64-character lowercase hex form.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| Error::invalid_digest(format!("bad hex: {}", e)))?;

        let raw: [u8; DIGEST_SIZE] = bytes.try_into().map_err(|v: Vec<u8>| {
            Error::invalid_digest(format!("expected {} bytes, got {}", DIGEST_SIZE, v.len()))
        })?;

        Ok(Digest(raw))
    }

    /// The 64-character hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First hex byte, used as the shard directory name.
    pub fn prefix(&self) -> String {
        format!("{:02x}", self.0[0])
    }

    /// Remaining 62 hex characters, used as the blob filename.
    pub fn suffix(&self) -> String {
        hex::encode(&self.0[1..])
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

// Digests travel through the journal and JSON output as hex strings.

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Digest::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
