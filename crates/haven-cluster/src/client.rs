//! Peer client factory.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use haven_core::{BlobError, BlobStore, Peer, PeerId};
use parking_lot::RwLock;

/// Resolves a peer descriptor to a handle on that peer's object store.
///
/// Network-backed factories must apply their own connection timeouts; the
/// engine additionally bounds every call with `ClusterConfig::peer_timeout`.
pub type PeerClientFactory =
    Arc<dyn Fn(&Peer) -> Result<Arc<dyn BlobStore>, BlobError> + Send + Sync>;

/// Fixed registry of peer handles, for clusters running in one process.
///
/// Peers without a registered handle are refused, which is how a peer is
/// taken off the network in tests.
#[derive(Clone, Default)]
pub struct StaticClients {
    clients: Arc<RwLock<HashMap<PeerId, Arc<dyn BlobStore>>>>,
}

impl StaticClients {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handle used to reach `id`.
    pub fn insert(&self, id: PeerId, store: Arc<dyn BlobStore>) {
        self.clients.write().insert(id, store);
    }

    /// Unregisters `id`, returning its handle.
    pub fn remove(&self, id: &PeerId) -> Option<Arc<dyn BlobStore>> {
        self.clients.write().remove(id)
    }

    /// Returns true if `id` has a handle.
    pub fn contains(&self, id: &PeerId) -> bool {
        self.clients.read().contains_key(id)
    }

    /// Returns a factory that resolves peers through this registry.
    pub fn factory(&self) -> PeerClientFactory {
        let clients = Arc::clone(&self.clients);
        Arc::new(move |peer: &Peer| {
            clients
                .read()
                .get(&peer.id)
                .cloned()
                .ok_or_else(|| BlobError::Peer {
                    peer: peer.id.clone(),
                    message: format!("unreachable at {}", peer.advertise_addr),
                })
        })
    }
}

impl fmt::Debug for StaticClients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<PeerId> = self.clients.read().keys().cloned().collect();
        ids.sort();
        f.debug_struct("StaticClients").field("peers", &ids).finish()
    }
}
