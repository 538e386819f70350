//! Test node: a cluster engine over a filesystem store in a temp directory.

use std::sync::Arc;
use std::time::Duration;

use haven_cluster::{Cluster, ClusterConfig, MemoryDirectory, StaticClients};
use haven_core::{read_all, BlobError, BlobHash, BlobStore, Envelope, ManualClock, PeerId};
use haven_store::{LocalStore, StoreConfig};
use tempfile::TempDir;
use tracing::info;

/// Per-node engine settings.
#[derive(Debug, Clone)]
pub struct TestNodeConfig {
    /// Minimum replicas per write
    pub write_factor: usize,
    /// Minimum age before an unregistered local object is purged
    pub grace_period: Duration,
    /// Expiry attached to object registrations
    pub registration_ttl: Option<Duration>,
}

impl Default for TestNodeConfig {
    fn default() -> Self {
        Self {
            write_factor: 1,
            grace_period: Duration::from_secs(3600),
            registration_ttl: None,
        }
    }
}

/// A test node for integration testing.
pub struct TestNode {
    /// Peer ID
    pub id: PeerId,
    /// Filesystem store backing this node
    pub store: Arc<LocalStore>,
    /// Cluster engine
    pub cluster: Arc<Cluster>,
    /// Temporary directory for storage
    _temp_dir: TempDir,
}

impl TestNode {
    /// Creates a node and registers its store with `clients`.
    pub fn new(
        id: impl Into<PeerId>,
        config: &TestNodeConfig,
        directory: Arc<MemoryDirectory>,
        clients: &StaticClients,
        clock: &ManualClock,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let id = id.into();
        let temp_dir = TempDir::new()?;
        let store = Arc::new(LocalStore::open(StoreConfig::new(temp_dir.path()))?);
        clients.insert(id.clone(), store.clone());

        let mut cluster_config = ClusterConfig::new(
            id.clone(),
            format!("{}.test:7000", id),
            store.clone(),
            directory,
            clients.factory(),
        );
        cluster_config.write_factor = config.write_factor;
        cluster_config.grace_period = config.grace_period;
        cluster_config.registration_ttl = config.registration_ttl;
        cluster_config.clock = Arc::new(clock.clone());
        let cluster = Cluster::new(cluster_config)?;

        info!(peer = %id, path = %temp_dir.path().display(), "Created test node");

        Ok(Self {
            id,
            store,
            cluster,
            _temp_dir: temp_dir,
        })
    }

    /// Writes `data` through the cluster engine.
    pub async fn write(&self, data: &[u8]) -> Result<Envelope, BlobError> {
        let mut reader = data;
        self.cluster.write_blob(&mut reader).await
    }

    /// Reads `hash` through the cluster engine.
    pub async fn read(&self, hash: &BlobHash) -> Result<Vec<u8>, BlobError> {
        read_all(&*self.cluster, hash).await
    }

    /// Returns true if this node's filesystem store holds `hash`.
    pub async fn holds(&self, hash: &BlobHash) -> bool {
        self.store.contains(hash).await.unwrap_or(false)
    }
}

impl std::fmt::Debug for TestNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestNode").field("id", &self.id).finish_non_exhaustive()
    }
}
