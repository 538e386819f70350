//! Background maintenance: heartbeat, anti-entropy fetch and garbage
//! collection.
//!
//! Each task body is a plain method on [`Cluster`] so it can be driven
//! directly. [`Cluster::start`] runs all three on their own periods until
//! the engine is closed.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use haven_core::{BlobError, BlobHash, Peer, PeerId, Timestamp};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::ClusterConfig;
use crate::directory::Registration;
use crate::engine::Cluster;

#[derive(Debug, Clone, Copy)]
enum Task {
    Heartbeat,
    Fetch,
    Purge,
}

impl Task {
    const ALL: [Task; 3] = [Task::Heartbeat, Task::Fetch, Task::Purge];

    fn period(self, config: &ClusterConfig) -> Duration {
        match self {
            Task::Heartbeat => config.heartbeat_period,
            Task::Fetch => config.fetch_period,
            Task::Purge => config.purge_period,
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Task::Heartbeat => "heartbeat",
            Task::Fetch => "fetch",
            Task::Purge => "purge",
        })
    }
}

impl Cluster {
    /// Starts the background tasks. Each runs once immediately and then on
    /// its configured period. Calling this again, or after close, does
    /// nothing.
    pub fn start(self: &Arc<Self>) {
        if *self.shutdown_tx.borrow() || self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut handles = self.handles.lock();
        for task in Task::ALL {
            handles.push(self.spawn_task(task));
        }
        info!(peer = %self.config.peer_id, "Started background tasks");
    }

    /// Returns true once the engine has been closed.
    pub fn is_closed(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Signals the background tasks to stop. An iteration in progress
    /// finishes on its own; this never waits for it.
    pub(crate) fn shutdown(&self) {
        let already_closed = self.shutdown_tx.send_replace(true);
        let detached = self.handles.lock().drain(..).count();
        if !already_closed {
            info!(peer = %self.config.peer_id, tasks = detached, "Stopping background tasks");
        }
    }

    fn spawn_task(self: &Arc<Self>, task: Task) -> JoinHandle<()> {
        let cluster = Arc::clone(self);
        let period = task.period(&self.config);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown_rx.changed() => break,
                }
                if *shutdown_rx.borrow() {
                    break;
                }

                let result = match task {
                    Task::Heartbeat => cluster.heartbeat().await,
                    Task::Fetch => cluster.fetch_new_objects().await,
                    Task::Purge => cluster.purge_deleted().await,
                };
                if let Err(err) = result {
                    warn!(task = %task, error = %err, "Background task failed");
                }
            }
            debug!(task = %task, "Background task stopped");
        })
    }

    /// Publishes this peer's heartbeat to the directory.
    pub async fn heartbeat(&self) -> Result<(), BlobError> {
        let peer = self.local_peer();
        let at = peer.last_heartbeat;
        self.config.directory.upsert_peer(peer).await?;
        self.stats.write().heartbeats += 1;
        debug!(peer = %self.config.peer_id, at = %at, "Published heartbeat");
        Ok(())
    }

    /// Fetches every registered object this peer does not hold locally.
    ///
    /// Every missing object is attempted; failures are collected and
    /// returned together.
    pub async fn fetch_new_objects(&self) -> Result<(), BlobError> {
        let registered = self.config.directory.get_objects().await?;
        let local: BTreeSet<BlobHash> = self.config.local.get_blobs().await?.into_iter().collect();

        let missing: Vec<BlobHash> = registered
            .into_iter()
            .filter(|hash| !local.contains(hash))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        debug!(peer = %self.config.peer_id, missing = missing.len(), "Fetching missing objects");

        let mut errors = Vec::new();
        for hash in &missing {
            let holders = match self.config.directory.get_object_peers(hash).await {
                Ok(Registration::Registered(holders)) => holders,
                Ok(Registration::Unregistered) => continue,
                Err(err) => {
                    errors.push(err);
                    continue;
                }
            };
            if let Err(err) = self.fetch_object(hash, &holders).await {
                errors.push(err);
            }
        }
        BlobError::aggregate(errors)
    }

    /// Fetches `hashes` from live peers selected by `peer_filter`, skipping
    /// objects already held locally. An empty filter allows every live
    /// peer.
    pub async fn fetch_objects(
        &self,
        hashes: &[BlobHash],
        peer_filter: &[PeerId],
    ) -> Result<(), BlobError> {
        let mut errors = Vec::new();
        for hash in hashes {
            match self.config.local.get_blob_envelope(hash).await {
                Ok(_) => continue,
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    errors.push(err);
                    continue;
                }
            }
            if let Err(err) = self.fetch_object(hash, peer_filter).await {
                errors.push(err);
            }
        }
        BlobError::aggregate(errors)
    }

    /// Copies `hash` from the first live remote peer in `peer_filter` that
    /// serves it, then adds this peer to its holders.
    async fn fetch_object(&self, hash: &BlobHash, peer_filter: &[PeerId]) -> Result<(), BlobError> {
        let candidates: Vec<Peer> = self
            .live_peers(peer_filter)
            .await?
            .into_iter()
            .filter(|peer| !self.is_local(peer))
            .collect();

        let mut errors = Vec::new();
        for peer in &candidates {
            match self.fetch_from_peer(peer, hash).await {
                Ok(()) => return self.register_fetched(hash, &peer.id).await,
                Err(err) => {
                    warn!(hash = %hash, peer = %peer.id, error = %err, "Failed to fetch object");
                    self.stats.write().fetch_failures += 1;
                    errors.push(err);
                }
            }
        }

        if errors.is_empty() {
            return Err(BlobError::NotFound(format!(
                "no live peer to fetch object {} from",
                hash
            )));
        }
        BlobError::aggregate(errors)
    }

    async fn fetch_from_peer(&self, peer: &Peer, hash: &BlobHash) -> Result<(), BlobError> {
        let client = (self.config.client_factory)(peer)?;
        let local = &self.config.local;

        let envelope = self
            .with_timeout(&peer.id, async {
                let mut reader = client.open_blob(hash).await?;
                local.write_blob(&mut reader).await
            })
            .await?;

        // A mismatched copy is left unregistered; garbage collection
        // removes it after the grace period.
        if envelope.hash != *hash {
            return Err(BlobError::Peer {
                peer: peer.id.clone(),
                message: format!("served {} for {}", envelope.hash, hash),
            });
        }
        Ok(())
    }

    async fn register_fetched(&self, hash: &BlobHash, source: &PeerId) -> Result<(), BlobError> {
        // An object deleted while in flight must not be registered again.
        match self.config.directory.get_object_peers(hash).await? {
            Registration::Registered(_) => {
                self.register(hash, vec![self.config.peer_id.clone()]).await?;
                self.stats.write().objects_fetched += 1;
                info!(hash = %hash, from = %source, "Fetched object");
            }
            Registration::Unregistered => {
                debug!(hash = %hash, "Object deleted during fetch, not registering");
            }
        }
        Ok(())
    }

    /// Deletes local copies of unregistered objects older than the grace
    /// period.
    pub async fn purge_deleted(&self) -> Result<(), BlobError> {
        let now = self.config.clock.now();
        let hashes = self.config.local.get_blobs().await?;

        let mut errors = Vec::new();
        let mut purged = 0usize;
        for hash in &hashes {
            match self.purge_object(hash, now).await {
                Ok(true) => purged += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(hash = %hash, error = %err, "Failed to purge object");
                    errors.push(err);
                }
            }
        }

        if purged > 0 {
            info!(peer = %self.config.peer_id, purged, "Purged deleted objects");
        }
        BlobError::aggregate(errors)
    }

    async fn purge_object(&self, hash: &BlobHash, now: Timestamp) -> Result<bool, BlobError> {
        if self.config.directory.get_object_peers(hash).await?.is_registered() {
            return Ok(false);
        }

        let envelope = match self.config.local.get_blob_envelope(hash).await {
            Ok(envelope) => envelope,
            Err(err) if err.is_not_found() => return Ok(false),
            Err(err) => return Err(err),
        };
        let age = match envelope.age(now) {
            Some(age) => age,
            None => {
                warn!(hash = %hash, "Object has no modification time, not purging");
                return Ok(false);
            }
        };
        if age < self.config.grace_period {
            return Ok(false);
        }

        match self.config.local.delete_blob(hash).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => return Ok(false),
            Err(err) => return Err(err),
        }
        self.stats.write().objects_purged += 1;
        debug!(hash = %hash, age_secs = age.as_secs(), "Purged object");
        Ok(true)
    }
}
