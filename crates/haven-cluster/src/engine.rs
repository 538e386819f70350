//! Cluster replication engine.
//!
//! Implements the object-store contract at cluster scope:
//! 1. Writes go to the local store, then to live peers one at a time until
//!    `write_factor` replicas exist, then the holder set is registered
//! 2. Reads resolve the registered holders and try them in fan-out order
//! 3. Deletes only drop the registration; local copies are purged later by
//!    each peer's garbage collection

use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use async_trait::async_trait;
use haven_core::{BlobError, BlobHash, BlobReader, BlobStore, Envelope, Peer, PeerId};
use parking_lot::{Mutex, RwLock};
use tokio::io::AsyncRead;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ClusterConfig;
use crate::directory::Registration;
use crate::peers::{matches_peer, select_live};
use crate::stats::ClusterStats;

/// Replicated object store spanning every peer in the cluster.
pub struct Cluster {
    pub(crate) config: ClusterConfig,
    pub(crate) stats: RwLock<ClusterStats>,
    pub(crate) shutdown_tx: watch::Sender<bool>,
    pub(crate) handles: Mutex<Vec<JoinHandle<()>>>,
    pub(crate) started: AtomicBool,
}

impl Cluster {
    /// Validates `config` and creates the engine. Background tasks are not
    /// running until [`Cluster::start`] is called.
    pub fn new(mut config: ClusterConfig) -> Result<Arc<Self>, BlobError> {
        config.validate()?;
        info!(peer = %config.peer_id, write_factor = config.write_factor, "Created cluster engine");

        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        Ok(Arc::new(Self {
            config,
            stats: RwLock::new(ClusterStats::default()),
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }))
    }

    /// Returns the validated configuration.
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Returns this peer's identifier.
    pub fn peer_id(&self) -> &PeerId {
        &self.config.peer_id
    }

    /// Returns engine statistics.
    pub fn stats(&self) -> ClusterStats {
        self.stats.read().clone()
    }

    /// Returns the live peers selected by `filter`, local peer first and
    /// the rest by ID.
    ///
    /// The local peer counts as live even before its first heartbeat has
    /// reached the directory. An empty filter selects every peer.
    pub async fn live_peers(&self, filter: &[PeerId]) -> Result<Vec<Peer>, BlobError> {
        let now = self.config.clock.now();
        let peers = self.config.directory.get_peers().await?;
        let mut live = select_live(
            peers,
            &self.config.peer_id,
            now,
            self.config.liveness_window(),
            filter,
        );

        let local_listed = live.first().map_or(false, |p| p.id == self.config.peer_id);
        if !local_listed && matches_peer(&self.config.peer_id, filter) {
            live.insert(0, self.local_peer());
        }
        Ok(live)
    }

    pub(crate) fn local_peer(&self) -> Peer {
        Peer::new(
            self.config.peer_id.clone(),
            self.config.advertise_addr.clone(),
            self.config.clock.now(),
        )
    }

    pub(crate) fn is_local(&self, peer: &Peer) -> bool {
        peer.id == self.config.peer_id
    }

    /// Bounds a call to a remote peer by the configured timeout.
    pub(crate) async fn with_timeout<T, F>(&self, peer: &PeerId, call: F) -> Result<T, BlobError>
    where
        F: Future<Output = Result<T, BlobError>>,
    {
        match tokio::time::timeout(self.config.peer_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(BlobError::Timeout {
                peer: peer.clone(),
                timeout: self.config.peer_timeout,
            }),
        }
    }

    /// Copies the local object `hash` to `peer`.
    async fn push_to_peer(&self, peer: &Peer, hash: &BlobHash) -> Result<(), BlobError> {
        let client = (self.config.client_factory)(peer)?;
        let mut reader = self.config.local.open_blob(hash).await?;

        let envelope = self
            .with_timeout(&peer.id, client.write_blob(&mut reader))
            .await?;
        if envelope.hash != *hash {
            return Err(BlobError::Peer {
                peer: peer.id.clone(),
                message: format!("stored {} as {}", hash, envelope.hash),
            });
        }
        Ok(())
    }

    async fn open_from_peer(&self, peer: &Peer, hash: &BlobHash) -> Result<BlobReader, BlobError> {
        if self.is_local(peer) {
            return self.config.local.open_blob(hash).await;
        }
        let client = (self.config.client_factory)(peer)?;
        self.with_timeout(&peer.id, client.open_blob(hash)).await
    }

    pub(crate) async fn register(&self, hash: &BlobHash, peers: Vec<PeerId>) -> Result<(), BlobError> {
        self.config
            .directory
            .upsert_object_peers(hash, peers, self.config.registration_ttl)
            .await
    }
}

#[async_trait]
impl BlobStore for Cluster {
    async fn write_blob(
        &self,
        data: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<Envelope, BlobError> {
        let target = self.config.write_factor;
        let peers = self.live_peers(&[]).await?;
        if peers.len() < target {
            self.stats.write().failed_writes += 1;
            return Err(BlobError::NotEnoughPeers {
                target,
                achieved: peers.len(),
            });
        }

        let envelope = self.config.local.write_blob(data).await?;
        let hash = envelope.hash;
        let mut holders = vec![self.config.peer_id.clone()];
        let mut errors = Vec::new();

        for peer in peers.iter().filter(|p| !self.is_local(p)) {
            if holders.len() >= target {
                break;
            }
            match self.push_to_peer(peer, &hash).await {
                Ok(()) => {
                    debug!(hash = %hash, peer = %peer.id, "Replicated object");
                    self.stats.write().replicas_pushed += 1;
                    holders.push(peer.id.clone());
                }
                Err(err) => {
                    warn!(hash = %hash, peer = %peer.id, error = %err, "Failed to replicate object");
                    self.stats.write().push_failures += 1;
                    errors.push(err);
                }
            }
        }

        if holders.len() < target {
            self.stats.write().failed_writes += 1;
            let achieved = holders.len();
            return Err(if errors.is_empty() {
                BlobError::NotEnoughPeers { target, achieved }
            } else {
                BlobError::Replication {
                    target,
                    achieved,
                    errors,
                }
            });
        }

        let replicas = holders.len();
        self.register(&hash, holders).await?;
        self.stats.write().writes += 1;
        info!(hash = %hash, size = envelope.size_bytes, replicas, "Stored object");
        Ok(envelope)
    }

    async fn open_blob(&self, hash: &BlobHash) -> Result<BlobReader, BlobError> {
        let holders = match self.config.directory.get_object_peers(hash).await? {
            Registration::Registered(holders) => holders,
            Registration::Unregistered => {
                return Err(BlobError::NotFound(format!("object {} is not registered", hash)));
            }
        };

        let peers = self.live_peers(&holders).await?;
        let mut attempts = Vec::new();
        for peer in &peers {
            match self.open_from_peer(peer, hash).await {
                Ok(reader) => return Ok(reader),
                Err(err) => {
                    debug!(hash = %hash, peer = %peer.id, error = %err, "Failed to open object on peer");
                    attempts.push(format!("{}: {}", peer.id, err));
                }
            }
        }

        Err(BlobError::NotFound(format!(
            "object {} unavailable on {} live peers [{}]",
            hash,
            peers.len(),
            attempts.join("; ")
        )))
    }

    async fn delete_blob(&self, hash: &BlobHash) -> Result<(), BlobError> {
        self.config.directory.delete_object(hash).await?;
        info!(hash = %hash, "Deleted object registration");
        Ok(())
    }

    async fn get_blobs(&self) -> Result<Vec<BlobHash>, BlobError> {
        let mut hashes = self.config.directory.get_objects().await?;
        hashes.sort();
        Ok(hashes)
    }

    async fn get_blob_envelope(&self, hash: &BlobHash) -> Result<Envelope, BlobError> {
        self.config.local.get_blob_envelope(hash).await
    }

    async fn close(&self) -> Result<(), BlobError> {
        self.shutdown();
        Ok(())
    }
}
