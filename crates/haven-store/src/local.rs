//! Filesystem-backed content-addressed store.

use std::path::PathBuf;

use async_trait::async_trait;
use haven_core::{BlobError, BlobHash, BlobHasher, BlobReader, BlobStore, Envelope, Timestamp};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::config::StoreConfig;
use crate::{COPY_BUFFER_SIZE, FANOUT_PREFIX_LEN};

/// Content-addressed object store in a local directory tree.
///
/// Objects are immutable: the path of an object is fully determined by its
/// content, so concurrent or repeated writes of the same content are safe.
#[derive(Debug)]
pub struct LocalStore {
    config: StoreConfig,
}

impl LocalStore {
    /// Opens a store rooted at `config.base_path`, creating its directories.
    pub fn open(config: StoreConfig) -> Result<Self, BlobError> {
        config.create_dirs()?;
        debug!(path = ?config.base_path, "Opened local store");
        Ok(Self { config })
    }

    /// Returns the store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the path at which `hash` is stored.
    pub fn blob_path(&self, hash: &BlobHash) -> PathBuf {
        let hex = hash.to_hex();
        self.config
            .blobs_path()
            .join(&hex[..FANOUT_PREFIX_LEN])
            .join(hex)
    }

    /// Returns true if the object is stored locally.
    pub async fn contains(&self, hash: &BlobHash) -> Result<bool, BlobError> {
        Ok(tokio::fs::try_exists(self.blob_path(hash)).await?)
    }

    async fn stat(&self, hash: &BlobHash) -> Result<Envelope, BlobError> {
        let metadata = tokio::fs::metadata(self.blob_path(hash))
            .await
            .map_err(|e| BlobError::from_io(e, format!("object {}", hash)))?;

        let modified = metadata
            .modified()
            .ok()
            .and_then(Timestamp::from_system_time)
            .unwrap_or_default();

        Ok(Envelope {
            size_bytes: metadata.len(),
            hash: *hash,
            modified,
        })
    }

    async fn list_fanout_dir(&self, dir: PathBuf, prefix: &str) -> Result<Vec<BlobHash>, BlobError> {
        let mut hashes = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };

            match BlobHash::from_hex(name) {
                Ok(hash) if name.starts_with(prefix) && hash.to_hex() == name => hashes.push(hash),
                _ => debug!(path = ?entry.path(), "Skipping unexpected file in content directory"),
            }
        }

        Ok(hashes)
    }
}

/// Runs blocking filesystem work off the async runtime.
async fn run_blocking<T, F>(work: F) -> Result<T, BlobError>
where
    F: FnOnce() -> std::io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let result = tokio::task::spawn_blocking(work).await.map_err(|e| {
        BlobError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("blocking task failed: {}", e),
        ))
    })?;
    Ok(result?)
}

#[async_trait]
impl BlobStore for LocalStore {
    async fn write_blob(
        &self,
        data: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<Envelope, BlobError> {
        // The temp file is removed on drop unless it is persisted below.
        let tmp_dir = self.config.tmp_path();
        let tmp = run_blocking(move || {
            tempfile::Builder::new()
                .prefix("blob-")
                .tempfile_in(tmp_dir)
        })
        .await?;
        let mut file = tokio::fs::File::from_std(tmp.as_file().try_clone()?);

        let mut hasher = BlobHasher::new();
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut size = 0u64;

        loop {
            let n = data.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            file.write_all(&buf[..n]).await?;
            size += n as u64;
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        let hash = hasher.finalize();
        let target = self.blob_path(&hash);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        run_blocking(move || tmp.persist(target).map(drop).map_err(|e| e.error)).await?;
        debug!(hash = %hash, size, "Stored object");

        self.stat(&hash).await
    }

    async fn open_blob(&self, hash: &BlobHash) -> Result<BlobReader, BlobError> {
        let file = tokio::fs::File::open(self.blob_path(hash))
            .await
            .map_err(|e| BlobError::from_io(e, format!("object {}", hash)))?;
        Ok(Box::new(file))
    }

    async fn delete_blob(&self, hash: &BlobHash) -> Result<(), BlobError> {
        tokio::fs::remove_file(self.blob_path(hash))
            .await
            .map_err(|e| BlobError::from_io(e, format!("object {}", hash)))?;

        debug!(hash = %hash, "Deleted object");
        Ok(())
    }

    async fn get_blobs(&self) -> Result<Vec<BlobHash>, BlobError> {
        let mut hashes = Vec::new();
        let mut dirs = tokio::fs::read_dir(self.config.blobs_path()).await?;

        while let Some(entry) = dirs.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(prefix) = name.to_str() else {
                continue;
            };
            if prefix.len() != FANOUT_PREFIX_LEN {
                continue;
            }
            hashes.extend(self.list_fanout_dir(entry.path(), prefix).await?);
        }

        hashes.sort();
        Ok(hashes)
    }

    async fn get_blob_envelope(&self, hash: &BlobHash) -> Result<Envelope, BlobError> {
        self.stat(hash).await
    }

    async fn close(&self) -> Result<(), BlobError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use haven_core::read_all;
    use std::io::SeekFrom;
    use tempfile::TempDir;
    use tokio::io::AsyncSeekExt;

    fn open_store(dir: &TempDir) -> LocalStore {
        LocalStore::open(StoreConfig::new(dir.path())).unwrap()
    }

    async fn write(store: &LocalStore, data: &[u8]) -> Envelope {
        let mut reader = data;
        store.write_blob(&mut reader).await.unwrap()
    }

    #[tokio::test]
    async fn test_local_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let data = b"Hello, Haven! This is a test object.";
        let envelope = write(&store, data).await;

        assert_eq!(envelope.hash, BlobHash::of(data));
        assert_eq!(envelope.size_bytes, data.len() as u64);
        assert!(!envelope.modified.is_zero());

        let retrieved = read_all(&store, &envelope.hash).await.unwrap();
        assert_eq!(retrieved, data);
    }

    #[tokio::test]
    async fn test_local_store_empty_object() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let envelope = write(&store, b"").await;
        assert_eq!(envelope.size_bytes, 0);
        assert!(read_all(&store, &envelope.hash).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fanout_layout() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let envelope = write(&store, b"fan out").await;
        let hex = envelope.hash.to_hex();
        let expected = dir.path().join("blobs").join(&hex[..3]).join(&hex);

        assert_eq!(store.blob_path(&envelope.hash), expected);
        assert!(expected.is_file());
        assert!(store.contains(&envelope.hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_scratch_dir_left_empty() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        write(&store, b"one").await;
        write(&store, b"two").await;

        let leftovers = std::fs::read_dir(dir.path().join("tmp")).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_rewrite_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let first = write(&store, b"same content").await;
        let second = write(&store, b"same content").await;

        assert_eq!(first.hash, second.hash);
        assert_eq!(first.size_bytes, second.size_bytes);
        assert_eq!(store.get_blobs().await.unwrap(), vec![first.hash]);
        assert_eq!(read_all(&store, &first.hash).await.unwrap(), b"same content");
    }

    #[tokio::test]
    async fn test_seek_restart() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let envelope = write(&store, b"read me twice").await;
        let mut reader = store.open_blob(&envelope.hash).await.unwrap();

        let mut first = Vec::new();
        reader.read_to_end(&mut first).await.unwrap();
        reader.seek(SeekFrom::Start(0)).await.unwrap();
        let mut second = Vec::new();
        reader.read_to_end(&mut second).await.unwrap();

        assert_eq!(first, b"read me twice");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_list_sorted_and_reflects_delete() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let mut written = Vec::new();
        for i in 0..16u8 {
            written.push(write(&store, &[i; 8]).await.hash);
        }

        let listed = store.get_blobs().await.unwrap();
        let mut expected = written.clone();
        expected.sort();
        assert_eq!(listed, expected);

        store.delete_blob(&written[3]).await.unwrap();
        let listed = store.get_blobs().await.unwrap();
        assert_eq!(listed.len(), 15);
        assert!(!listed.contains(&written[3]));
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let missing = BlobHash::of(b"never written");

        assert!(store.open_blob(&missing).await.err().unwrap().is_not_found());
        assert!(store.get_blob_envelope(&missing).await.unwrap_err().is_not_found());
        assert!(store.delete_blob(&missing).await.unwrap_err().is_not_found());
        assert!(!store.contains(&missing).await.unwrap());
    }

    #[tokio::test]
    async fn test_double_delete_and_close() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let envelope = write(&store, b"delete twice").await;
        store.delete_blob(&envelope.hash).await.unwrap();
        assert!(store.delete_blob(&envelope.hash).await.unwrap_err().is_not_found());

        store.close().await.unwrap();
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_list_skips_stray_files() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let envelope = write(&store, b"real").await;
        let hex = envelope.hash.to_hex();
        let fanout = dir.path().join("blobs").join(&hex[..3]);
        std::fs::write(fanout.join("not-a-hash"), b"junk").unwrap();
        std::fs::create_dir_all(dir.path().join("blobs").join("lost+found")).unwrap();

        assert_eq!(store.get_blobs().await.unwrap(), vec![envelope.hash]);
    }

    #[tokio::test]
    async fn test_list_skips_uppercase_copies() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let envelope = write(&store, b"case sensitive").await;
        let other = BlobHash::of(b"stored under the wrong case");
        let upper = other.to_hex().to_uppercase();
        let upper_dir = dir.path().join("blobs").join(&upper[..3]);
        std::fs::create_dir_all(&upper_dir).unwrap();
        std::fs::write(upper_dir.join(&upper), b"stored under the wrong case").unwrap();

        assert_eq!(store.get_blobs().await.unwrap(), vec![envelope.hash]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_writes_of_same_content() {
        let dir = TempDir::new().unwrap();
        let store = std::sync::Arc::new(open_store(&dir));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                write(&store, b"written by everyone").await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().hash, BlobHash::of(b"written by everyone"));
        }

        assert_eq!(store.get_blobs().await.unwrap().len(), 1);
        assert_eq!(std::fs::read_dir(dir.path().join("tmp")).unwrap().count(), 0);
    }
}
