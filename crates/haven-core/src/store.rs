//! The object-store contract.
//!
//! Implemented by the local filesystem store, by handles on remote peers
//! and by the cluster engine itself, so callers can use any of them
//! interchangeably.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek};

use crate::envelope::Envelope;
use crate::error::BlobError;
use crate::hash::BlobHash;

/// A readable, seekable object stream.
pub trait BlobRead: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T> BlobRead for T where T: AsyncRead + AsyncSeek + Send + Unpin {}

/// Stream returned by [`BlobStore::open_blob`]. Dropping it closes it.
pub type BlobReader = Box<dyn BlobRead>;

/// Content-addressed object storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores the content of `data` and returns its envelope.
    async fn write_blob(
        &self,
        data: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<Envelope, BlobError>;

    /// Opens the object addressed by `hash`.
    async fn open_blob(&self, hash: &BlobHash) -> Result<BlobReader, BlobError>;

    /// Deletes the object addressed by `hash`.
    async fn delete_blob(&self, hash: &BlobHash) -> Result<(), BlobError>;

    /// Lists stored objects in ascending order.
    async fn get_blobs(&self) -> Result<Vec<BlobHash>, BlobError>;

    /// Returns the envelope of the object addressed by `hash`.
    async fn get_blob_envelope(&self, hash: &BlobHash) -> Result<Envelope, BlobError>;

    /// Releases resources held by the store. Closing twice is harmless.
    async fn close(&self) -> Result<(), BlobError>;
}

/// Reads an object fully into memory.
pub async fn read_all(store: &dyn BlobStore, hash: &BlobHash) -> Result<Vec<u8>, BlobError> {
    let mut reader = store.open_blob(hash).await?;
    let mut data = Vec::new();
    reader.read_to_end(&mut data).await?;
    Ok(data)
}
