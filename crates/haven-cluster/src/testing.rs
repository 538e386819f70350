//! In-memory stores for unit tests.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use haven_core::{
    BlobError, BlobHash, BlobReader, BlobStore, Envelope, ManualClock, PeerId, Timestamp,
};
use parking_lot::RwLock;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::client::StaticClients;
use crate::config::ClusterConfig;
use crate::directory::MemoryDirectory;
use crate::engine::Cluster;

/// Peers `node-0..node-N` backed by [`MemoryBlobs`], sharing one directory
/// and one manual clock.
pub struct Fixture {
    pub directory: Arc<MemoryDirectory>,
    pub clients: StaticClients,
    pub clock: ManualClock,
    pub stores: Vec<Arc<MemoryBlobs>>,
}

impl Fixture {
    pub fn new(count: usize) -> Self {
        let clock = ManualClock::starting_now();
        let clients = StaticClients::new();
        let stores: Vec<Arc<MemoryBlobs>> =
            (0..count).map(|_| Arc::new(MemoryBlobs::new())).collect();
        for (i, store) in stores.iter().enumerate() {
            clients.insert(PeerId::new(format!("node-{}", i)), store.clone());
        }
        Self {
            directory: Arc::new(MemoryDirectory::with_clock(Arc::new(clock.clone()))),
            clients,
            clock,
            stores,
        }
    }

    pub fn config(&self, index: usize, write_factor: usize) -> ClusterConfig {
        let mut config = ClusterConfig::new(
            format!("node-{}", index),
            format!("10.0.0.{}:7000", index),
            self.stores[index].clone(),
            self.directory.clone(),
            self.clients.factory(),
        );
        config.write_factor = write_factor;
        config.clock = Arc::new(self.clock.clone());
        config
    }

    pub fn engine(&self, index: usize, write_factor: usize) -> Arc<Cluster> {
        Cluster::new(self.config(index, write_factor)).unwrap()
    }

    pub async fn heartbeat_all(&self) {
        for i in 0..self.stores.len() {
            self.engine(i, 1).heartbeat().await.unwrap();
        }
    }
}

pub async fn write(engine: &Cluster, data: &[u8]) -> Result<Envelope, BlobError> {
    let mut reader = data;
    engine.write_blob(&mut reader).await
}

/// Object store holding everything in a map.
///
/// New objects are stamped with `Timestamp::now()`; tests that depend on
/// object age set it with [`MemoryBlobs::set_modified`].
#[derive(Debug, Default)]
pub struct MemoryBlobs {
    blobs: RwLock<BTreeMap<BlobHash, (Vec<u8>, Timestamp)>>,
}

impl MemoryBlobs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, data: &[u8], modified: Timestamp) -> BlobHash {
        let hash = BlobHash::of(data);
        self.blobs.write().insert(hash, (data.to_vec(), modified));
        hash
    }

    pub fn set_modified(&self, hash: &BlobHash, modified: Timestamp) {
        if let Some(entry) = self.blobs.write().get_mut(hash) {
            entry.1 = modified;
        }
    }

    pub fn remove(&self, hash: &BlobHash) -> bool {
        self.blobs.write().remove(hash).is_some()
    }

    pub fn contains(&self, hash: &BlobHash) -> bool {
        self.blobs.read().contains_key(hash)
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    fn envelope(hash: &BlobHash, data: &[u8], modified: Timestamp) -> Envelope {
        Envelope {
            size_bytes: data.len() as u64,
            hash: *hash,
            modified,
        }
    }
}

#[async_trait]
impl BlobStore for MemoryBlobs {
    async fn write_blob(
        &self,
        data: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<Envelope, BlobError> {
        let mut buf = Vec::new();
        data.read_to_end(&mut buf).await?;
        let hash = BlobHash::of(&buf);
        let modified = Timestamp::now();
        let envelope = Self::envelope(&hash, &buf, modified);
        self.blobs.write().insert(hash, (buf, modified));
        Ok(envelope)
    }

    async fn open_blob(&self, hash: &BlobHash) -> Result<BlobReader, BlobError> {
        match self.blobs.read().get(hash) {
            Some((data, _)) => Ok(Box::new(Cursor::new(data.clone()))),
            None => Err(BlobError::NotFound(format!("object {}", hash))),
        }
    }

    async fn delete_blob(&self, hash: &BlobHash) -> Result<(), BlobError> {
        if self.remove(hash) {
            Ok(())
        } else {
            Err(BlobError::NotFound(format!("object {}", hash)))
        }
    }

    async fn get_blobs(&self) -> Result<Vec<BlobHash>, BlobError> {
        Ok(self.blobs.read().keys().copied().collect())
    }

    async fn get_blob_envelope(&self, hash: &BlobHash) -> Result<Envelope, BlobError> {
        match self.blobs.read().get(hash) {
            Some((data, modified)) => Ok(Self::envelope(hash, data, *modified)),
            None => Err(BlobError::NotFound(format!("object {}", hash))),
        }
    }

    async fn close(&self) -> Result<(), BlobError> {
        Ok(())
    }
}

/// Store whose every operation fails, standing in for a broken peer.
#[derive(Debug, Default)]
pub struct FailingStore;

impl FailingStore {
    pub fn new() -> Self {
        Self
    }

    fn fail<T>() -> Result<T, BlobError> {
        Err(BlobError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk unavailable",
        )))
    }
}

#[async_trait]
impl BlobStore for FailingStore {
    async fn write_blob(
        &self,
        _data: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<Envelope, BlobError> {
        Self::fail()
    }

    async fn open_blob(&self, _hash: &BlobHash) -> Result<BlobReader, BlobError> {
        Self::fail()
    }

    async fn delete_blob(&self, _hash: &BlobHash) -> Result<(), BlobError> {
        Self::fail()
    }

    async fn get_blobs(&self) -> Result<Vec<BlobHash>, BlobError> {
        Self::fail()
    }

    async fn get_blob_envelope(&self, _hash: &BlobHash) -> Result<Envelope, BlobError> {
        Self::fail()
    }

    async fn close(&self) -> Result<(), BlobError> {
        Ok(())
    }
}

/// Store whose every operation never completes, standing in for a peer
/// that accepted the connection and then stopped responding.
#[derive(Debug, Default)]
pub struct HangingStore;

impl HangingStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BlobStore for HangingStore {
    async fn write_blob(
        &self,
        _data: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<Envelope, BlobError> {
        std::future::pending().await
    }

    async fn open_blob(&self, _hash: &BlobHash) -> Result<BlobReader, BlobError> {
        std::future::pending().await
    }

    async fn delete_blob(&self, _hash: &BlobHash) -> Result<(), BlobError> {
        std::future::pending().await
    }

    async fn get_blobs(&self) -> Result<Vec<BlobHash>, BlobError> {
        std::future::pending().await
    }

    async fn get_blob_envelope(&self, _hash: &BlobHash) -> Result<Envelope, BlobError> {
        std::future::pending().await
    }

    async fn close(&self) -> Result<(), BlobError> {
        Ok(())
    }
}
