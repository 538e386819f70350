//! Content addresses.
//!
//! An object is addressed by the first half of the SHA-512 digest of its
//! content, rendered as lowercase hex. Identical content always yields the
//! same address.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

use crate::error::BlobError;
use crate::{HASH_HEX_LEN, HASH_SIZE};

/// Content address of a stored object.
///
/// Ordering matches the lexicographic order of the hex form, so sorted
/// listings are stable across peers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct BlobHash([u8; HASH_SIZE]);

impl BlobHash {
    /// Computes the address of an in-memory buffer.
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = BlobHasher::new();
        hasher.update(data);
        hasher.finalize()
    }

    /// Parses a lowercase or uppercase hex string.
    pub fn from_hex(s: &str) -> Result<Self, BlobError> {
        if s.len() != HASH_HEX_LEN {
            return Err(BlobError::InvalidHash(s.to_string()));
        }
        let mut bytes = [0u8; HASH_SIZE];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| BlobError::InvalidHash(s.to_string()))?;
        Ok(Self(bytes))
    }

    /// Returns the lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for BlobHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for BlobHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for BlobHash {
    type Err = BlobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for BlobHash {
    type Error = BlobError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl From<BlobHash> for String {
    fn from(hash: BlobHash) -> Self {
        hash.to_hex()
    }
}

/// Incremental digest used while streaming content to disk.
pub struct BlobHasher {
    inner: Sha512,
}

impl BlobHasher {
    /// Creates a new hasher.
    pub fn new() -> Self {
        Self {
            inner: Sha512::new(),
        }
    }

    /// Feeds more content into the digest.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finishes the digest and truncates it to a content address.
    pub fn finalize(self) -> BlobHash {
        let digest = self.inner.finalize();
        let mut bytes = [0u8; HASH_SIZE];
        bytes.copy_from_slice(&digest[..HASH_SIZE]);
        BlobHash(bytes)
    }
}

impl Default for BlobHasher {
    fn default() -> Self {
        Self::new()
    }
}
