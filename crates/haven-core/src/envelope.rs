//! Object metadata.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::hash::BlobHash;
use crate::time::Timestamp;

/// Metadata describing one locally stored object.
///
/// Rewriting identical content yields the same `hash` and `size_bytes`
/// with a possibly later `modified`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Length of the content in bytes
    pub size_bytes: u64,
    /// Content address
    pub hash: BlobHash,
    /// When the object was stored locally
    pub modified: Timestamp,
}

impl Envelope {
    /// Returns how long ago the object was stored, or `None` when the
    /// modification time is unset.
    ///
    /// A modification time ahead of `now` yields an age of zero.
    pub fn age(&self, now: Timestamp) -> Option<Duration> {
        if self.modified.is_zero() {
            return None;
        }
        Some(now.duration_since(&self.modified).unwrap_or(Duration::ZERO))
    }
}
