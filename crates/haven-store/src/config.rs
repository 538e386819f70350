//! Storage configuration.

use std::path::PathBuf;

/// Local store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Base path for all storage
    pub base_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from(".haven"),
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with the given base path.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Returns the scratch directory for in-flight writes.
    pub fn tmp_path(&self) -> PathBuf {
        self.base_path.join("tmp")
    }

    /// Returns the content directory.
    pub fn blobs_path(&self) -> PathBuf {
        self.base_path.join("blobs")
    }

    /// Creates all necessary directories.
    pub fn create_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.tmp_path())?;
        std::fs::create_dir_all(self.blobs_path())?;
        Ok(())
    }
}
