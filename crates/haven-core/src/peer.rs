//! Cluster peer descriptors.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// Stable identifier of a cluster member.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Creates a peer identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the identifier is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.0)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A cluster member as recorded in the peer directory.
///
/// Liveness is derived from `last_heartbeat`, which only the peer itself
/// updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    /// Peer identifier
    pub id: PeerId,
    /// Address other peers use to reach this one
    pub advertise_addr: String,
    /// Time of the peer's most recent heartbeat
    pub last_heartbeat: Timestamp,
}

impl Peer {
    /// Creates a peer descriptor.
    pub fn new(id: PeerId, advertise_addr: impl Into<String>, last_heartbeat: Timestamp) -> Self {
        Self {
            id,
            advertise_addr: advertise_addr.into(),
            last_heartbeat,
        }
    }

    /// Returns true if the peer heartbeated no more than `window` before `now`.
    ///
    /// A heartbeat from the future (clock skew between peers) counts as live.
    pub fn is_live(&self, now: Timestamp, window: Duration) -> bool {
        match now.duration_since(&self.last_heartbeat) {
            Some(age) => age <= window,
            None => true,
        }
    }
}
