//! Peer directory: cluster-wide bookkeeping of peers and object holders.
//!
//! The directory is an external key-value service in production. The
//! engine only depends on the [`PeerDirectory`] trait; [`MemoryDirectory`]
//! is an in-process implementation for single-process clusters and tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use haven_core::{BlobError, BlobHash, Clock, Peer, PeerId, SystemClock, Timestamp};
use parking_lot::RwLock;
use tracing::debug;

/// Result of looking up which peers hold an object.
///
/// A registered object with no known holders is still known to the
/// cluster; only `Unregistered` means deleted or never confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// The object is known to the cluster and these peers hold replicas
    Registered(Vec<PeerId>),
    /// The object was deleted or its write never completed
    Unregistered,
}

impl Registration {
    /// Returns true if the object is known to the cluster.
    pub fn is_registered(&self) -> bool {
        matches!(self, Registration::Registered(_))
    }

    /// Returns the holders, empty when unregistered.
    pub fn peers(&self) -> &[PeerId] {
        match self {
            Registration::Registered(peers) => peers,
            Registration::Unregistered => &[],
        }
    }
}

/// Durable record of peers and object registrations.
#[async_trait]
pub trait PeerDirectory: Send + Sync {
    /// Inserts or replaces a peer record.
    async fn upsert_peer(&self, peer: Peer) -> Result<(), BlobError>;

    /// Returns every known peer, live or not.
    async fn get_peers(&self) -> Result<Vec<Peer>, BlobError>;

    /// Returns every registered object hash in ascending order.
    async fn get_objects(&self) -> Result<Vec<BlobHash>, BlobError>;

    /// Returns the registration of `hash`.
    async fn get_object_peers(&self, hash: &BlobHash) -> Result<Registration, BlobError>;

    /// Adds `peers` to the holders of `hash`, registering it if needed.
    ///
    /// Holders already recorded are kept, so concurrent writers never need
    /// to read the set first. `ttl` of `None` keeps the registration until
    /// it is deleted.
    async fn upsert_object_peers(
        &self,
        hash: &BlobHash,
        peers: Vec<PeerId>,
        ttl: Option<Duration>,
    ) -> Result<(), BlobError>;

    /// Removes the registration of `hash`.
    async fn delete_object(&self, hash: &BlobHash) -> Result<(), BlobError>;
}

/// Registration entry with optional expiry.
#[derive(Debug, Clone)]
struct ObjectRecord {
    peers: BTreeSet<PeerId>,
    expires_at: Option<Timestamp>,
}

impl ObjectRecord {
    fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.map_or(false, |at| !at.is_after(&now))
    }
}

/// Statistics for the in-memory directory.
#[derive(Debug, Clone, Default)]
pub struct DirectoryStats {
    /// Number of peer records
    pub peer_count: usize,
    /// Number of live (unexpired) registrations
    pub object_count: usize,
}

/// In-process peer directory.
#[derive(Debug)]
pub struct MemoryDirectory {
    peers: RwLock<BTreeMap<PeerId, Peer>>,
    objects: RwLock<BTreeMap<BlobHash, ObjectRecord>>,
    clock: Arc<dyn Clock>,
}

impl MemoryDirectory {
    /// Creates an empty directory that expires registrations by wall-clock time.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty directory that expires registrations by `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            peers: RwLock::new(BTreeMap::new()),
            objects: RwLock::new(BTreeMap::new()),
            clock,
        }
    }

    /// Drops expired registrations.
    pub fn expire(&self) {
        let now = self.clock.now();
        let mut objects = self.objects.write();
        let before = objects.len();
        objects.retain(|_, record| !record.is_expired(now));

        let expired = before - objects.len();
        if expired > 0 {
            debug!(count = expired, "Expired object registrations");
        }
    }

    /// Returns directory statistics.
    pub fn stats(&self) -> DirectoryStats {
        let now = self.clock.now();
        DirectoryStats {
            peer_count: self.peers.read().len(),
            object_count: self
                .objects
                .read()
                .values()
                .filter(|record| !record.is_expired(now))
                .count(),
        }
    }
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeerDirectory for MemoryDirectory {
    async fn upsert_peer(&self, peer: Peer) -> Result<(), BlobError> {
        self.peers.write().insert(peer.id.clone(), peer);
        Ok(())
    }

    async fn get_peers(&self) -> Result<Vec<Peer>, BlobError> {
        Ok(self.peers.read().values().cloned().collect())
    }

    async fn get_objects(&self) -> Result<Vec<BlobHash>, BlobError> {
        let now = self.clock.now();
        Ok(self
            .objects
            .read()
            .iter()
            .filter(|(_, record)| !record.is_expired(now))
            .map(|(hash, _)| *hash)
            .collect())
    }

    async fn get_object_peers(&self, hash: &BlobHash) -> Result<Registration, BlobError> {
        let now = self.clock.now();
        Ok(match self.objects.read().get(hash) {
            Some(record) if !record.is_expired(now) => {
                Registration::Registered(record.peers.iter().cloned().collect())
            }
            _ => Registration::Unregistered,
        })
    }

    async fn upsert_object_peers(
        &self,
        hash: &BlobHash,
        peers: Vec<PeerId>,
        ttl: Option<Duration>,
    ) -> Result<(), BlobError> {
        let now = self.clock.now();
        let expires_at = ttl.map(|ttl| now.add(ttl));

        let mut objects = self.objects.write();
        let record = objects.entry(*hash).or_insert_with(|| ObjectRecord {
            peers: BTreeSet::new(),
            expires_at,
        });
        if record.is_expired(now) {
            record.peers.clear();
        }
        record.peers.extend(peers);
        record.expires_at = expires_at;
        Ok(())
    }

    async fn delete_object(&self, hash: &BlobHash) -> Result<(), BlobError> {
        let now = self.clock.now();
        match self.objects.write().remove(hash) {
            Some(record) if !record.is_expired(now) => Ok(()),
            _ => Err(BlobError::NotFound(format!("registration of object {}", hash))),
        }
    }
}
