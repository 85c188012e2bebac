//! 256-bit hash values: ledger root hashes and message digests.

use crate::{CoreError, HASH_SIZE};
use serde::{Deserialize, Serialize};
use sovra_io::{BinaryWriter, IoResult, MemoryReader, Serializable};
use std::fmt;
use std::str::FromStr;

/// A 32-byte hash value.
///
/// Used for Merkle roots in ledger summaries and for canonical message
/// digests. Ordering is lexicographic over the raw bytes, which gives
/// deterministic iteration when hashes key ordered maps.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash256([u8; HASH_SIZE]);

impl Hash256 {
    /// The all-zero hash, used as a placeholder for empty ledgers.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Checks whether every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Copies a slice into a hash, requiring exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        let array: [u8; HASH_SIZE] = bytes.try_into().map_err(|_| {
            CoreError::invalid_format(format!("expected {HASH_SIZE} bytes, got {}", bytes.len()))
        })?;
        Ok(Self(array))
    }

    /// Borrows the raw bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// Lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self.to_hex())
    }
}

impl FromStr for Hash256 {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)
            .map_err(|e| CoreError::invalid_format(format!("invalid hex: {e}")))?;
        Self::from_bytes(&bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; HASH_SIZE]> for Hash256 {
    fn from(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }
}

impl Serializable for Hash256 {
    fn size(&self) -> usize {
        HASH_SIZE
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_bytes(&self.0)?;
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader) -> IoResult<Self> {
        let bytes = reader.read_bytes(HASH_SIZE)?;
        Ok(Self(bytes.try_into().expect("read_bytes returned 32 bytes")))
    }
}
