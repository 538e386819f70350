//! Test cluster harness for multi-node integration testing.
//!
//! All nodes share one [`MemoryDirectory`] and one [`ManualClock`], so
//! liveness and object age are driven by advancing the clock rather than
//! by sleeping.

use std::sync::Arc;
use std::time::Duration;

use haven_cluster::{MemoryDirectory, PeerDirectory, Registration, StaticClients};
use haven_core::{BlobError, BlobHash, ManualClock};
use tracing::info;

use crate::node::{TestNode, TestNodeConfig};

/// A test cluster containing multiple nodes.
pub struct TestCluster {
    /// Directory shared by all nodes
    pub directory: Arc<MemoryDirectory>,
    /// Handles through which nodes reach each other
    pub clients: StaticClients,
    /// Clock shared by all nodes and the directory
    pub clock: ManualClock,
    nodes: Vec<Arc<TestNode>>,
}

impl TestCluster {
    /// Creates an empty cluster.
    pub fn new() -> Self {
        let clock = ManualClock::starting_now();
        Self {
            directory: Arc::new(MemoryDirectory::with_clock(Arc::new(clock.clone()))),
            clients: StaticClients::new(),
            clock,
            nodes: Vec::new(),
        }
    }

    /// Creates a cluster of `count` nodes named `node-0..node-N`.
    pub fn with_nodes(
        count: usize,
        write_factor: usize,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let config = TestNodeConfig {
            write_factor,
            ..Default::default()
        };
        Self::with_config(count, &config)
    }

    /// Creates a cluster of `count` nodes sharing `config`.
    pub fn with_config(
        count: usize,
        config: &TestNodeConfig,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let mut cluster = Self::new();
        for _ in 0..count {
            cluster.add_node(config)?;
        }
        Ok(cluster)
    }

    /// Adds a node.
    pub fn add_node(
        &mut self,
        config: &TestNodeConfig,
    ) -> Result<Arc<TestNode>, Box<dyn std::error::Error + Send + Sync>> {
        let id = format!("node-{}", self.nodes.len());
        let node = Arc::new(TestNode::new(
            id,
            config,
            self.directory.clone(),
            &self.clients,
            &self.clock,
        )?);
        self.nodes.push(node.clone());

        info!(peer = %node.id, total = self.nodes.len(), "Added node to test cluster");
        Ok(node)
    }

    /// Returns the number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns all nodes.
    pub fn nodes(&self) -> &[Arc<TestNode>] {
        &self.nodes
    }

    /// Returns a node by index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn node(&self, index: usize) -> &Arc<TestNode> {
        &self.nodes[index]
    }

    /// Publishes a heartbeat from every node.
    pub async fn heartbeat_all(&self) -> Result<(), BlobError> {
        for node in &self.nodes {
            node.cluster.heartbeat().await?;
        }
        Ok(())
    }

    /// Publishes a heartbeat from the nodes at `indices`.
    pub async fn heartbeat(&self, indices: &[usize]) -> Result<(), BlobError> {
        for &index in indices {
            self.nodes[index].cluster.heartbeat().await?;
        }
        Ok(())
    }

    /// Makes a node unreachable to its peers. It still appears live until
    /// its heartbeat goes stale.
    pub fn take_offline(&self, index: usize) {
        let node = &self.nodes[index];
        self.clients.remove(&node.id);
        info!(peer = %node.id, "Took node offline");
    }

    /// Makes a node reachable again.
    pub fn bring_online(&self, index: usize) {
        let node = &self.nodes[index];
        self.clients.insert(node.id.clone(), node.store.clone());
        info!(peer = %node.id, "Brought node online");
    }

    /// Moves the shared clock forward.
    pub fn advance(&self, duration: Duration) {
        self.clock.advance(duration);
    }

    /// Returns the directory's view of `hash`.
    pub async fn registration(&self, hash: &BlobHash) -> Registration {
        self.directory
            .get_object_peers(hash)
            .await
            .unwrap_or(Registration::Unregistered)
    }

    /// Returns the indices of nodes whose local store holds `hash`.
    pub async fn holders(&self, hash: &BlobHash) -> Vec<usize> {
        let mut holders = Vec::new();
        for (index, node) in self.nodes.iter().enumerate() {
            if node.holds(hash).await {
                holders.push(index);
            }
        }
        holders
    }
}

impl Default for TestCluster {
    fn default() -> Self {
        Self::new()
    }
}
